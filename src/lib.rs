//! Subtitle Reader - Subtitle tracking and auto-read engine
//!
//! Finds the subtitle text on a page using a user-supplied class expression,
//! watches it for changes, and reads each new caption aloud through a
//! text-to-speech engine.
//!
//! # Architecture
//!
//! - **Locator**: resolves the expression to a selector and collects the
//!   matching elements, falling back to a search inside shadow roots
//! - **Change detection**: remembers the last caption so each line is
//!   spoken once
//! - **Speech**: one utterance in flight at a time, newest caption wins
//! - **Scheduler**: ticks the engine on a timer while auto-read is on,
//!   optionally pausing while the page's media is playing

pub mod change_detector;
pub mod config;
pub mod dom;
pub mod engine;
pub mod host;
pub mod locator;
pub mod playback;
pub mod sanitize;
pub mod scheduler;
pub mod selector;
pub mod speech;
pub mod types;

// Re-export commonly used types
pub use change_detector::{ChangeDetector, Detection, GapPolicy};
pub use config::{Config, ConfigStore, FileConfigStore, MediaConfig, MemoryConfigStore};
pub use dom::{Document, DocumentTree, NodeId, NodeSpec};
pub use engine::{
    step, Effect, SkipReason, Tick, TickOutcome, TrackingEngine, EVENT_CHANNEL_CAPACITY,
};
pub use host::{PageHost, PageSnapshot, SnapshotFilePage, StaticPage};
pub use playback::{MediaElement, MediaState, PlaybackGate};
pub use scheduler::{AutoReadScheduler, SchedulerError, SharedEngine};
pub use speech::{
    CommandSpeechEngine, LogSpeechEngine, RecordingSpeechEngine, SpeechDispatcher, SpeechEngine,
    SpeechError, SpeechParams,
};
pub use types::{ExtractionError, ReaderEvent, SpeechRequest, SubtitleSnapshot, Voice};
