use serde::{Deserialize, Serialize};

/// Snapshot of the application's visible state at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageObservation {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub heading: Option<String>,
    #[serde(default)]
    pub elements: Vec<InteractiveElement>,
    #[serde(default)]
    pub toasts: Vec<String>,
    #[serde(default)]
    pub error_texts: Vec<String>,
    #[serde(default)]
    pub api_calls: Vec<ApiCallRecord>,
    #[serde(default)]
    pub console_errors: Vec<String>,
    #[serde(default)]
    pub viewport: Viewport,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveElement {
    pub role: String,
    pub name: String,
    #[serde(default, rename = "type")]
    pub element_type: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub checked: Option<bool>,
    #[serde(default)]
    pub selected: Option<bool>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub bounds: Option<BoundingBox>,
    #[serde(default)]
    pub test_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCallRecord {
    pub method: String,
    pub url: String,
    pub status: u16,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub request_body: Option<String>,
    #[serde(default)]
    pub response_body: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub scroll_y: f64,
    #[serde(default)]
    pub scroll_height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            scroll_y: 0.0,
            scroll_height: 720.0,
        }
    }
}

impl InteractiveElement {
    pub fn new(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Ranking used when the element list has to be cut down. Lower is kept first.
    pub fn elision_rank(&self) -> u8 {
        if self.disabled {
            return 4;
        }
        match self.role.as_str() {
            "button" | "textbox" | "combobox" | "searchbox" | "checkbox" | "radio" => 0,
            "link" | "tab" | "menuitem" | "option" | "switch" => 1,
            "heading" | "dialog" | "alert" => 2,
            _ => 3,
        }
    }

    pub fn compact(&self) -> String {
        let mut line = format!("{} \"{}\"", self.role, self.name);
        if let Some(test_id) = &self.test_id {
            line.push_str(&format!(" [testid={}]", test_id));
        }
        if self.disabled {
            line.push_str(" (disabled)");
        }
        if self.required {
            line.push_str(" (required)");
        }
        if self.checked == Some(true) {
            line.push_str(" (checked)");
        }
        if self.selected == Some(true) {
            line.push_str(" (selected)");
        }
        line
    }
}

impl PageObservation {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = Some(heading.into());
        self
    }

    pub fn with_elements(mut self, elements: Vec<InteractiveElement>) -> Self {
        self.elements = elements;
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.error_texts.is_empty()
            || !self.console_errors.is_empty()
            || self.api_calls.iter().any(|c| c.status >= 500)
    }

    /// Path of the url without query string or fragment. A redirect target
    /// carried in `?next=` is not something the page shows.
    pub fn url_path(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(parsed) => parsed.path().to_string(),
            Err(_) => self
                .url
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_string(),
        }
    }

    /// All human-visible text of the snapshot, lowercased, used for keyword matching.
    pub fn searchable_text(&self) -> String {
        let path = self.url_path();
        let mut parts: Vec<&str> = vec![path.as_str(), self.title.as_str()];
        if let Some(heading) = &self.heading {
            parts.push(heading);
        }
        for element in &self.elements {
            parts.push(&element.name);
            if let Some(test_id) = &element.test_id {
                parts.push(test_id);
            }
        }
        parts.extend(self.toasts.iter().map(String::as_str));
        parts.join(" ").to_lowercase()
    }

    /// Element list for the prompt, capped at `max_elements`. Lower-priority
    /// elements are dropped first, the survivors keep their page order.
    pub fn compact_elements(&self, max_elements: usize) -> (Vec<String>, usize) {
        if self.elements.len() <= max_elements {
            return (self.elements.iter().map(|e| e.compact()).collect(), 0);
        }
        let mut ranked: Vec<(usize, u8)> = self
            .elements
            .iter()
            .enumerate()
            .map(|(i, e)| (i, e.elision_rank()))
            .collect();
        ranked.sort_by_key(|(i, rank)| (*rank, *i));
        let mut keep: Vec<usize> = ranked.into_iter().take(max_elements).map(|(i, _)| i).collect();
        keep.sort_unstable();
        let lines = keep.iter().map(|&i| self.elements[i].compact()).collect();
        (lines, self.elements.len() - max_elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_elements_keeps_interactive_first() {
        let obs = PageObservation::new("https://app.test/", "Home").with_elements(vec![
            InteractiveElement::new("img", "logo"),
            InteractiveElement::new("button", "Save"),
            InteractiveElement::new("link", "Help"),
            InteractiveElement::new("button", "Old").disabled(),
        ]);

        let (lines, elided) = obs.compact_elements(2);
        assert_eq!(elided, 2);
        assert_eq!(lines, vec!["button \"Save\"", "link \"Help\""]);
    }

    #[test]
    fn test_has_errors() {
        let mut obs = PageObservation::new("/", "t");
        assert!(!obs.has_errors());
        obs.api_calls.push(ApiCallRecord {
            method: "GET".to_string(),
            url: "/api/x".to_string(),
            status: 503,
            ..Default::default()
        });
        assert!(obs.has_errors());
    }

    #[test]
    fn test_searchable_text_is_lowercase() {
        let obs = PageObservation::new("/dash", "Dashboard")
            .with_heading("Sales Widgets")
            .with_elements(vec![InteractiveElement::new("region", "Revenue Widget")]);
        let text = obs.searchable_text();
        assert!(text.contains("sales widgets"));
        assert!(text.contains("revenue widget"));
    }

    #[test]
    fn test_searchable_text_skips_query_and_fragment() {
        let obs = PageObservation::new("https://app.test/login?next=/dashboard#top", "Sign in");
        assert_eq!(obs.url_path(), "/login");
        assert!(!obs.searchable_text().contains("dashboard"));

        let relative = PageObservation::new("/cart?coupon=SAVE", "Cart");
        assert_eq!(relative.url_path(), "/cart");
    }
}
