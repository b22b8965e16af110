//! Playback gating and host media control.
//!
//! When "pause while playing" is configured, extraction and speech are
//! suppressed entirely while the host media element is playing. The video
//! volume setting is written to the same element.

use serde::{Deserialize, Serialize};

/// Host media element (the page's `<video>`)
pub trait MediaElement {
    fn paused(&self) -> bool;

    /// Current volume (0-1)
    fn volume(&self) -> f32;

    fn set_volume(&mut self, volume: f32);
}

/// Plain media state, as captured in a page snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaState {
    #[serde(default = "default_paused")]
    pub paused: bool,

    #[serde(default = "default_volume")]
    pub volume: f32,
}

fn default_paused() -> bool {
    true
}

fn default_volume() -> f32 {
    1.0
}

impl MediaState {
    pub fn new(paused: bool) -> Self {
        Self {
            paused,
            volume: default_volume(),
        }
    }

    pub fn playing() -> Self {
        Self::new(false)
    }
}

impl MediaElement for MediaState {
    fn paused(&self) -> bool {
        self.paused
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }
}

/// Derived playback gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackGate {
    Open,
    Blocked,
}

impl PlaybackGate {
    /// Compute the gate from the policy flag and the current media element.
    /// A page without a media element never blocks.
    pub fn evaluate(pause_on_playback: bool, media: Option<&dyn MediaElement>) -> Self {
        match media {
            Some(media) if pause_on_playback && !media.paused() => PlaybackGate::Blocked,
            _ => PlaybackGate::Open,
        }
    }

    pub fn is_blocked(self) -> bool {
        self == PlaybackGate::Blocked
    }
}
