use crate::types::PageObservation;

/// Coarse identity of a screen: enough to notice that nothing changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenSignature {
    pub url: String,
    pub element_count: usize,
    pub heading: String,
}

impl ScreenSignature {
    pub fn of(observation: &PageObservation) -> Self {
        Self {
            url: observation.url.clone(),
            element_count: observation.elements.len(),
            heading: observation
                .heading
                .clone()
                .unwrap_or_else(|| observation.title.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StuckVerdict {
    /// The screen differs from the previous one.
    Fresh,
    /// Same screen again, below the threshold.
    Repeated(u32),
    /// Threshold reached; the model should be told to change approach.
    Replan(u32),
    /// Replanning did not help; choose locally instead of asking the model.
    Fallback(u32),
}

impl StuckVerdict {
    pub fn is_repeat(&self) -> bool {
        !matches!(self, StuckVerdict::Fresh)
    }
}

#[derive(Debug, Clone)]
pub struct StuckDetector {
    threshold: u32,
    max_replans: u32,
    previous: Option<ScreenSignature>,
    same_screen_count: u32,
    replans_issued: u32,
}

impl StuckDetector {
    pub fn new(threshold: u32, max_replans: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            max_replans,
            previous: None,
            same_screen_count: 0,
            replans_issued: 0,
        }
    }

    pub fn same_screen_count(&self) -> u32 {
        self.same_screen_count
    }

    pub fn observe(&mut self, signature: ScreenSignature) -> StuckVerdict {
        let repeated = self.previous.as_ref() == Some(&signature);
        self.previous = Some(signature);

        if !repeated {
            self.same_screen_count = 0;
            self.replans_issued = 0;
            return StuckVerdict::Fresh;
        }

        self.same_screen_count += 1;
        let count = self.same_screen_count;
        if count < self.threshold {
            return StuckVerdict::Repeated(count);
        }
        if self.replans_issued < self.max_replans {
            self.replans_issued += 1;
            StuckVerdict::Replan(count)
        } else {
            // One local fallback, then the model gets another round of replans.
            self.replans_issued = 0;
            StuckVerdict::Fallback(count)
        }
    }
}
