//! Hygiene checks for stored and user-entered values.
//!
//! Persisted configuration can end up polluted with script source (a paste
//! into the expression field, or a corrupted store). Values containing any of
//! the disallowed markers are replaced with safe defaults instead of being
//! rejected.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

/// Substrings that never belong in a tracking expression
pub const DISALLOWED_MARKERS: &[&str] = &["UserScript", "function", "GM_"];

lazy_static! {
    static ref DISALLOWED: Regex = Regex::new(
        &DISALLOWED_MARKERS
            .iter()
            .map(|marker| regex::escape(marker))
            .collect::<Vec<_>>()
            .join("|")
    ).unwrap();
}

/// Check whether a value contains a disallowed marker
pub fn contains_disallowed(value: &str) -> bool {
    DISALLOWED.is_match(value)
}

/// Return the expression unchanged, or an empty one if it is polluted
pub fn clean_expression(value: &str) -> String {
    if let Some(found) = DISALLOWED.find(value) {
        warn!(
            "Tracking expression contains disallowed content '{}', resetting",
            found.as_str()
        );
        return String::new();
    }
    value.to_string()
}

/// Clamp a float into `[min, max]`, replacing non-finite values with `default`
pub fn clamp_f32(value: f32, min: f32, max: f32, default: f32) -> f32 {
    if !value.is_finite() {
        warn!("Non-finite value {} replaced with {}", value, default);
        return default;
    }
    value.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disallowed_markers() {
        assert!(contains_disallowed("// ==UserScript=="));
        assert!(contains_disallowed("function() {}"));
        assert!(contains_disallowed("GM_setValue"));
        assert!(!contains_disallowed("ytp-caption-segment"));
    }

    #[test]
    fn test_clean_expression() {
        assert_eq!(clean_expression("caption-line"), "caption-line");
        assert_eq!(clean_expression("x UserScript y"), "");
    }

    #[test]
    fn test_clamp_f32() {
        assert_eq!(clamp_f32(1.5, 0.0, 1.0, 1.0), 1.0);
        assert_eq!(clamp_f32(-0.2, 0.0, 1.0, 1.0), 0.0);
        assert_eq!(clamp_f32(0.3, 0.5, 2.0, 1.0), 0.5);
        assert_eq!(clamp_f32(f32::NAN, 0.5, 2.0, 1.0), 1.0);
        assert_eq!(clamp_f32(f32::INFINITY, 0.0, 1.0, 0.7), 0.7);
    }
}
