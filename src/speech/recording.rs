//! Recording speech engine.
//!
//! Keeps a shared log of every call so a harness can assert on what would
//! have been spoken. Clones share the same log and state.

use super::{SpeechEngine, SpeechError};
use crate::types::{SpeechRequest, Voice};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// One call made against the engine
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechCall {
    Speak(SpeechRequest),
    Cancel,
}

#[derive(Debug, Default)]
struct RecordingState {
    calls: Vec<SpeechCall>,
    speaking: bool,
    voices: Vec<Voice>,
}

/// Engine that records calls instead of producing audio.
///
/// An utterance counts as "speaking" from submission until it is cancelled
/// or [`finish`](RecordingSpeechEngine::finish) is called.
#[derive(Debug, Clone, Default)]
pub struct RecordingSpeechEngine {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingSpeechEngine {
    pub fn new(voices: Vec<Voice>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RecordingState {
                voices,
                ..Default::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecordingState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// All calls so far, in order
    pub fn calls(&self) -> Vec<SpeechCall> {
        self.lock().calls.clone()
    }

    /// Texts submitted so far, in order
    pub fn spoken_texts(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                SpeechCall::Speak(request) => Some(request.text.clone()),
                SpeechCall::Cancel => None,
            })
            .collect()
    }

    pub fn cancel_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| **call == SpeechCall::Cancel)
            .count()
    }

    /// Mark the current utterance as finished
    pub fn finish(&self) {
        self.lock().speaking = false;
    }

    pub fn set_speaking(&self, speaking: bool) {
        self.lock().speaking = speaking;
    }

    pub fn set_voices(&self, voices: Vec<Voice>) {
        self.lock().voices = voices;
    }

    pub fn clear(&self) {
        self.lock().calls.clear();
    }
}

impl SpeechEngine for RecordingSpeechEngine {
    fn speak(&mut self, request: SpeechRequest) -> Result<(), SpeechError> {
        debug!("Recording utterance: {:?}", request.text);
        let mut state = self.lock();
        state.calls.push(SpeechCall::Speak(request));
        state.speaking = true;
        Ok(())
    }

    fn cancel(&mut self) {
        let mut state = self.lock();
        state.calls.push(SpeechCall::Cancel);
        state.speaking = false;
    }

    fn speaking(&mut self) -> bool {
        self.lock().speaking
    }

    fn voices(&self) -> Vec<Voice> {
        self.lock().voices.clone()
    }
}
