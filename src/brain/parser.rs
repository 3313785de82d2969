//! Strict decoding of raw decision-service output into an [`AgentAction`].
//!
//! The raw text is never trusted: every variant has a closed set of allowed
//! fields, required fields are checked per variant, and element-bound kinds
//! must carry a usable target.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{
    ActionKind, AgentAction, Assertion, AssertionKind, ScrollDirection, Target,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionParseError {
    #[error("no JSON object found in response")]
    NoJson,

    #[error("malformed JSON: {0}")]
    InvalidJson(String),

    #[error("action type '{0}' is not supported")]
    UnknownType(String),

    #[error("'{kind}' action is missing required field '{field}'")]
    MissingField { kind: String, field: String },

    #[error("'{kind}' action does not accept field '{field}'")]
    UnknownField { kind: String, field: String },

    #[error("field '{field}' is invalid: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("'{0}' action needs a target that locates an element")]
    MissingTarget(String),

    #[error("'done' must not carry a target")]
    DoneWithTarget,
}

const COMMON_FIELDS: &[&str] = &[
    "type",
    "reasoning",
    "progress",
    "blocker",
    "expectedSignal",
    "expected_signal",
    "confidence",
    "target",
];

fn variant_fields(kind: &str) -> Option<&'static [&'static str]> {
    let fields: &'static [&'static str] = match kind {
        "click" | "hover" | "done" => &[],
        "type" | "select" => &["value"],
        "navigate" => &["url"],
        "scroll" => &["direction", "amount"],
        "upload" => &["files", "value"],
        "wait" => &["ms", "waitFor", "wait_for"],
        "verify" => &["assertion"],
        "api_call" => &["method", "url", "endpoint", "body"],
        "screenshot" => &["label"],
        "key" => &["key"],
        "drag" => &["dragTo", "drag_to"],
        _ => return None,
    };
    Some(fields)
}

/// Pulls the first balanced `{...}` block out of free text (code fences,
/// leading prose and trailing commentary are all tolerated).
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn parse_action(raw: &str) -> Result<AgentAction, ActionParseError> {
    let json = extract_json_object(raw).ok_or(ActionParseError::NoJson)?;
    let value: Value =
        serde_json::from_str(json).map_err(|e| ActionParseError::InvalidJson(e.to_string()))?;
    let obj = value.as_object().ok_or(ActionParseError::NoJson)?;
    parse_action_object(obj)
}

pub fn parse_action_object(obj: &Map<String, Value>) -> Result<AgentAction, ActionParseError> {
    let kind_name = obj
        .get("type")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .ok_or_else(|| missing("unknown", "type"))?;

    let allowed = variant_fields(&kind_name)
        .ok_or_else(|| ActionParseError::UnknownType(kind_name.clone()))?;
    if let Some(field) = obj
        .keys()
        .find(|k| !COMMON_FIELDS.contains(&k.as_str()) && !allowed.contains(&k.as_str()))
    {
        return Err(ActionParseError::UnknownField {
            kind: kind_name,
            field: field.clone(),
        });
    }

    let reasoning = opt_str(obj, "reasoning")
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| missing(&kind_name, "reasoning"))?;

    let target = match obj.get("target") {
        None | Some(Value::Null) => None,
        Some(value) => Some(parse_target(value)?),
    };

    let kind = parse_kind(&kind_name, obj)?;

    if kind == ActionKind::Done && target.is_some() {
        return Err(ActionParseError::DoneWithTarget);
    }
    if kind.requires_target() && !target.as_ref().map(Target::is_usable).unwrap_or(false) {
        return Err(ActionParseError::MissingTarget(kind_name));
    }

    let confidence = match obj.get("confidence") {
        None | Some(Value::Null) => 0.5,
        Some(value) => value.as_f64().ok_or_else(|| invalid("confidence", "not a number"))? as f32,
    };

    Ok(AgentAction {
        kind,
        reasoning,
        progress: opt_str(obj, "progress"),
        blocker: opt_str(obj, "blocker").filter(|s| !s.trim().is_empty()),
        expected_signal: opt_str(obj, "expectedSignal")
            .or_else(|| opt_str(obj, "expected_signal"))
            .unwrap_or_default(),
        confidence: confidence.clamp(0.0, 1.0),
        target,
    })
}

fn parse_kind(kind: &str, obj: &Map<String, Value>) -> Result<ActionKind, ActionParseError> {
    Ok(match kind {
        "click" => ActionKind::Click,
        "hover" => ActionKind::Hover,
        "done" => ActionKind::Done,
        "type" => ActionKind::Type {
            value: required_str(obj, kind, "value")?,
        },
        "select" => ActionKind::Select {
            value: required_str(obj, kind, "value")?,
        },
        "navigate" => ActionKind::Navigate {
            url: required_str(obj, kind, "url")?,
        },
        "key" => ActionKind::Key {
            key: required_str(obj, kind, "key")?,
        },
        "scroll" => {
            let direction = match opt_str(obj, "direction").as_deref() {
                None | Some("down") => ScrollDirection::Down,
                Some("up") => ScrollDirection::Up,
                Some("left") => ScrollDirection::Left,
                Some("right") => ScrollDirection::Right,
                Some(other) => {
                    return Err(invalid("direction", &format!("unknown direction '{}'", other)))
                }
            };
            let amount = match obj.get("amount") {
                None | Some(Value::Null) => None,
                Some(value) => Some(
                    value
                        .as_u64()
                        .ok_or_else(|| invalid("amount", "expected a positive integer"))?
                        as u32,
                ),
            };
            ActionKind::Scroll { direction, amount }
        }
        "upload" => {
            let files = match obj.get("files").or_else(|| obj.get("value")) {
                Some(Value::String(path)) => vec![path.clone()],
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .map(String::from)
                            .ok_or_else(|| invalid("files", "expected file paths"))
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                _ => return Err(missing(kind, "files")),
            };
            if files.is_empty() {
                return Err(missing(kind, "files"));
            }
            ActionKind::Upload { files }
        }
        "wait" => {
            let ms = match obj.get("ms") {
                None | Some(Value::Null) => None,
                Some(value) => Some(
                    value
                        .as_u64()
                        .ok_or_else(|| invalid("ms", "expected milliseconds"))?,
                ),
            };
            let wait_for = opt_str(obj, "waitFor").or_else(|| opt_str(obj, "wait_for"));
            ActionKind::Wait {
                ms: ms.or(if wait_for.is_none() { Some(1000) } else { None }),
                wait_for,
            }
        }
        "verify" => ActionKind::Verify {
            assertion: parse_assertion(obj.get("assertion").ok_or_else(|| missing(kind, "assertion"))?)?,
        },
        "api_call" => ActionKind::ApiCall {
            method: opt_str(obj, "method")
                .map(|m| m.to_uppercase())
                .unwrap_or_else(|| "GET".to_string()),
            url: opt_str(obj, "url")
                .or_else(|| opt_str(obj, "endpoint"))
                .ok_or_else(|| missing(kind, "url"))?,
            body: obj.get("body").filter(|b| !b.is_null()).cloned(),
        },
        "screenshot" => ActionKind::Screenshot {
            label: opt_str(obj, "label"),
        },
        "drag" => {
            let to = obj
                .get("dragTo")
                .or_else(|| obj.get("drag_to"))
                .ok_or_else(|| missing(kind, "dragTo"))?;
            let drag_to = parse_target(to)?;
            if !drag_to.is_usable() {
                return Err(invalid("dragTo", "does not locate an element"));
            }
            ActionKind::Drag { drag_to }
        }
        other => return Err(ActionParseError::UnknownType(other.to_string())),
    })
}

fn parse_target(value: &Value) -> Result<Target, ActionParseError> {
    let obj = match value {
        // A bare string is treated as visible text.
        Value::String(text) => return Ok(Target::by_text(text.clone())),
        Value::Object(obj) => obj,
        _ => return Err(invalid("target", "expected an object")),
    };

    let mut target = Target::default();
    for (key, field) in obj {
        match key.as_str() {
            "role" => target.role = field.as_str().map(String::from),
            "name" => target.name = field.as_str().map(String::from),
            "testId" | "test_id" => target.test_id = field.as_str().map(String::from),
            "css" | "selector" => target.css = field.as_str().map(String::from),
            "text" => target.text = field.as_str().map(String::from),
            "label" => target.label = field.as_str().map(String::from),
            "placeholder" => target.placeholder = field.as_str().map(String::from),
            "nth" => target.nth = field.as_u64().map(|n| n as u32),
            "coordinates" => target.coordinates = parse_coordinates(field)?,
            other => {
                return Err(ActionParseError::UnknownField {
                    kind: "target".to_string(),
                    field: other.to_string(),
                })
            }
        }
    }
    Ok(target)
}

fn parse_coordinates(value: &Value) -> Result<Option<(f64, f64)>, ActionParseError> {
    let pair = match value {
        Value::Null => return Ok(None),
        Value::Array(items) if items.len() == 2 => (items[0].as_f64(), items[1].as_f64()),
        Value::Object(obj) => (
            obj.get("x").and_then(Value::as_f64),
            obj.get("y").and_then(Value::as_f64),
        ),
        _ => (None, None),
    };
    match pair {
        (Some(x), Some(y)) => Ok(Some((x, y))),
        _ => Err(invalid("coordinates", "expected [x, y] or {x, y}")),
    }
}

fn parse_assertion(value: &Value) -> Result<Assertion, ActionParseError> {
    match value {
        Value::String(text) => Ok(Assertion::text_visible(text.clone())),
        Value::Object(_) => serde_json::from_value::<Assertion>(value.clone())
            .map_err(|e| invalid("assertion", &e.to_string())),
        _ => Err(invalid("assertion", "expected text or an object")),
    }
    .and_then(|assertion| {
        let needs_expected = matches!(
            assertion.kind,
            AssertionKind::TextVisible | AssertionKind::UrlContains | AssertionKind::TitleContains
        );
        if needs_expected && assertion.expected.is_none() {
            Err(missing("verify", "assertion.expected"))
        } else {
            Ok(assertion)
        }
    })
}

fn opt_str(obj: &Map<String, Value>, field: &str) -> Option<String> {
    obj.get(field).and_then(Value::as_str).map(String::from)
}

fn required_str(
    obj: &Map<String, Value>,
    kind: &str,
    field: &str,
) -> Result<String, ActionParseError> {
    match obj.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        _ => Err(missing(kind, field)),
    }
}

fn missing(kind: &str, field: &str) -> ActionParseError {
    ActionParseError::MissingField {
        kind: kind.to_string(),
        field: field.to_string(),
    }
}

fn invalid(field: &str, reason: &str) -> ActionParseError {
    ActionParseError::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
