//! Core types used throughout the subtitle reader.
//!
//! This module defines the extraction result record, the error taxonomy for a
//! single extraction attempt, speech requests, and the events delivered to
//! subscribers of a tracking engine.

use serde::{Deserialize, Serialize};

/// Errors that end a single extraction attempt.
///
/// None of these are fatal: the worst outcome is that nothing is read aloud
/// this cycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("Subtitle tracking is disabled")]
    TrackingDisabled,

    #[error("No tracking expression configured")]
    NoExpression,

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("No elements matched selector {selector}")]
    NoMatch { selector: String },

    #[error("Matched {count} element(s) but found no text")]
    EmptyText { count: usize },
}

impl ExtractionError {
    /// Short machine-friendly name for the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionError::TrackingDisabled => "tracking_disabled",
            ExtractionError::NoExpression => "no_expression",
            ExtractionError::InvalidSelector(_) => "invalid_selector",
            ExtractionError::NoMatch { .. } => "no_match",
            ExtractionError::EmptyText { .. } => "empty_text",
        }
    }
}

/// Result of one extraction attempt
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleSnapshot {
    /// Joined subtitle text (empty on error)
    pub text: String,
    /// Why extraction failed, if it did
    pub error: Option<ExtractionError>,
    /// Number of elements the selector matched
    pub matched_element_count: usize,
}

impl SubtitleSnapshot {
    pub fn success(text: String, matched_element_count: usize) -> Self {
        Self {
            text,
            error: None,
            matched_element_count,
        }
    }

    pub fn failure(error: ExtractionError) -> Self {
        let matched_element_count = match &error {
            ExtractionError::EmptyText { count } => *count,
            _ => 0,
        };
        Self {
            text: String::new(),
            error: Some(error),
            matched_element_count,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// One utterance submitted to a speech engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    /// Volume in [0, 1]
    pub volume: f32,
    /// Rate in [0.5, 2]
    pub rate: f32,
    /// Voice name, or `None` for the engine default
    pub voice: Option<String>,
}

/// A voice reported by a speech engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    /// BCP 47 language tag, e.g. "zh-CN"
    pub lang: String,
    #[serde(default)]
    pub is_default: bool,
}

impl Voice {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
            is_default: false,
        }
    }
}

/// Events delivered to engine subscribers (UI feedback)
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderEvent {
    /// A tick detected new subtitle text
    TextChanged(String),
    /// Text was handed to the speech engine
    Spoken(String),
    /// A user-facing warning (e.g. auto-read could not start)
    Alert(String),
    /// Auto-read was switched on or off
    AutoReadChanged(bool),
}
