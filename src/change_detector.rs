//! Change detection for extracted subtitle text.
//!
//! Only transitions are reported: repeating the same caption, or going from
//! empty to empty, is not a change.

use crate::types::SubtitleSnapshot;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Outcome of comparing new text with the last observed text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub changed: bool,
    pub text: String,
}

/// What an extraction error does to the remembered text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Keep the stale text; the same caption reappearing is not re-read
    #[default]
    KeepPrevious,
    /// Forget the text; the next caption is read even if identical
    Reannounce,
}

/// Compare `current` against `previous`, replacing `previous` on change.
pub fn detect(current: &str, previous: &mut String) -> Detection {
    if current.is_empty() && previous.is_empty() {
        return Detection {
            changed: false,
            text: String::new(),
        };
    }

    if current != previous.as_str() {
        previous.clear();
        previous.push_str(current);
        return Detection {
            changed: true,
            text: current.to_string(),
        };
    }

    Detection {
        changed: false,
        text: current.to_string(),
    }
}

/// Holds the last observed subtitle text between ticks
#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    previous_text: String,
    gap_policy: GapPolicy,
}

impl ChangeDetector {
    pub fn new(gap_policy: GapPolicy) -> Self {
        Self {
            previous_text: String::new(),
            gap_policy,
        }
    }

    /// Check raw text for a change
    pub fn detect(&mut self, current: &str) -> Detection {
        let detection = detect(current, &mut self.previous_text);
        if detection.changed {
            trace!("Subtitle changed: {:?}", detection.text);
        }
        detection
    }

    /// Check an extraction snapshot for a change.
    ///
    /// A failed snapshot never counts as a change; whether it clears the
    /// remembered text depends on the gap policy.
    pub fn observe(&mut self, snapshot: &SubtitleSnapshot) -> Detection {
        if let Some(error) = &snapshot.error {
            if self.gap_policy == GapPolicy::Reannounce && !self.previous_text.is_empty() {
                debug!("Extraction gap ({}), forgetting previous text", error.kind());
                self.previous_text.clear();
            }
            return Detection {
                changed: false,
                text: String::new(),
            };
        }
        self.detect(&snapshot.text)
    }

    /// Last text reported as changed
    pub fn previous_text(&self) -> &str {
        &self.previous_text
    }

    /// Forget the remembered text (new video, manual re-parse)
    pub fn reset(&mut self) {
        self.previous_text.clear();
    }

    pub fn set_gap_policy(&mut self, gap_policy: GapPolicy) {
        self.gap_policy = gap_policy;
    }

    pub fn gap_policy(&self) -> GapPolicy {
        self.gap_policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExtractionError;

    #[test]
    fn test_empty_to_empty_is_not_a_change() {
        let mut previous = String::new();
        assert!(!detect("", &mut previous).changed);
    }

    #[test]
    fn test_new_text_updates_previous() {
        let mut previous = String::new();
        let detection = detect("x", &mut previous);
        assert!(detection.changed);
        assert_eq!(detection.text, "x");
        assert_eq!(previous, "x");
    }

    #[test]
    fn test_repeat_is_not_a_change() {
        let mut previous = "x".to_string();
        assert!(!detect("x", &mut previous).changed);
    }

    #[test]
    fn test_change_then_same_text() {
        let mut detector = ChangeDetector::default();
        assert!(detector.detect("Hello World").changed);
        assert!(!detector.detect("Hello World").changed);
        assert!(detector.detect("Goodbye").changed);
        assert_eq!(detector.previous_text(), "Goodbye");
    }

    #[test]
    fn test_non_empty_to_empty_is_a_change() {
        let mut detector = ChangeDetector::default();
        detector.detect("line");
        let detection = detector.detect("");
        assert!(detection.changed);
        assert_eq!(detector.previous_text(), "");
    }

    #[test]
    fn test_error_keeps_previous_by_default() {
        let mut detector = ChangeDetector::default();
        detector.observe(&SubtitleSnapshot::success("line".into(), 1));

        let gap = SubtitleSnapshot::failure(ExtractionError::NoMatch {
            selector: ".x".into(),
        });
        assert!(!detector.observe(&gap).changed);
        assert_eq!(detector.previous_text(), "line");

        // Same caption after the gap is not re-read
        assert!(!detector.observe(&SubtitleSnapshot::success("line".into(), 1)).changed);
    }

    #[test]
    fn test_error_with_reannounce_policy() {
        let mut detector = ChangeDetector::new(GapPolicy::Reannounce);
        detector.observe(&SubtitleSnapshot::success("line".into(), 1));

        let gap = SubtitleSnapshot::failure(ExtractionError::EmptyText { count: 1 });
        assert!(!detector.observe(&gap).changed);
        assert_eq!(detector.previous_text(), "");

        assert!(detector.observe(&SubtitleSnapshot::success("line".into(), 1)).changed);
    }

    #[test]
    fn test_reset() {
        let mut detector = ChangeDetector::default();
        detector.detect("line");
        detector.reset();
        assert!(detector.detect("line").changed);
    }
}
