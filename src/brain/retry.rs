use std::time::Duration;
use thiserror::Error;

use super::parser::ActionParseError;

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("decision service error: {0}")]
    Service(String),

    #[error("decision service timed out after {0:?}")]
    Timeout(Duration),

    #[error("no decision within the {0:?} deadline")]
    Deadline(Duration),

    #[error("unparseable action: {0}")]
    Parse(#[from] ActionParseError),

    #[error("no usable action after {attempts} attempt(s); last error: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<DecisionError>,
    },
}

impl DecisionError {
    /// Parse failures are answered with corrective feedback instead of a pause.
    pub fn needs_backoff(&self) -> bool {
        matches!(self, DecisionError::Service(_) | DecisionError::Timeout(_))
    }
}

/// Bounded exponential backoff for calls to the decision service.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.initial_backoff.saturating_mul(1u32 << exponent);
        delay.min(self.max_backoff)
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(350));
        assert_eq!(policy.delay_after(40), Duration::from_millis(350));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(policy.attempts(), 1);
    }

    #[test]
    fn test_parse_errors_skip_backoff() {
        let parse = DecisionError::from(ActionParseError::NoJson);
        assert!(!parse.needs_backoff());
        assert!(DecisionError::Service("503".to_string()).needs_backoff());
    }
}
