use std::collections::HashMap;

/// What the critic needs to know about one finished step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub step: usize,
    pub signature: String,
    pub success: bool,
    pub progressed: bool,
}

/// Reviews the last `window` steps and returns a reason to replan, if any.
///
/// The critic never changes an action that already ran; its verdict only
/// shapes the next decision.
pub fn critique(records: &[StepRecord], window: usize) -> Option<String> {
    if window == 0 || records.len() < window {
        return None;
    }
    let recent = &records[records.len() - window..];

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in recent {
        *counts.entry(record.signature.as_str()).or_default() += 1;
    }
    let repeated = recent
        .iter()
        .map(|r| (r.signature.as_str(), counts[r.signature.as_str()]))
        .find(|(_, count)| *count >= 2);
    if let Some((signature, count)) = repeated {
        return Some(format!(
            "'{}' was attempted {} times in the last {} steps; try a different element or approach",
            signature, count, window
        ));
    }

    let failures = recent.iter().filter(|r| !r.success).count();
    if failures * 2 >= window {
        return Some(format!(
            "{} of the last {} actions failed; re-read the screen before acting",
            failures, window
        ));
    }

    if recent.iter().all(|r| !r.progressed) {
        return Some(format!(
            "No goal outcome was completed in the last {} steps; reconsider which outcome is still pending",
            window
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(step: usize, signature: &str, success: bool, progressed: bool) -> StepRecord {
        StepRecord {
            step,
            signature: signature.to_string(),
            success,
            progressed,
        }
    }

    #[test]
    fn test_flags_repeats_first() {
        let records = vec![
            record(1, "click 'A'", true, true),
            record(2, "click 'B'", false, false),
            record(3, "click 'B'", false, false),
        ];
        let verdict = critique(&records, 3).unwrap();
        assert!(verdict.contains("'click 'B'' was attempted 2 times"));
    }

    #[test]
    fn test_flags_failures_and_stalls() {
        let failing = vec![
            record(1, "a", false, true),
            record(2, "b", true, false),
            record(3, "c", false, false),
            record(4, "d", true, false),
        ];
        assert!(critique(&failing, 4).unwrap().contains("2 of the last 4 actions failed"));

        let stalled = vec![record(1, "a", true, false), record(2, "b", true, false)];
        assert!(critique(&stalled, 2).unwrap().starts_with("No goal outcome"));
    }

    #[test]
    fn test_quiet_when_healthy_or_short() {
        let healthy = vec![record(1, "a", true, true), record(2, "b", true, false)];
        assert_eq!(critique(&healthy, 2), None);
        assert_eq!(critique(&healthy, 5), None);
    }
}
