//! Speech dispatch.
//!
//! The dispatcher enforces at most one utterance in flight: if the engine is
//! still speaking when new text arrives, the old utterance is cancelled before
//! the new one is submitted, so the newest subtitle always wins.
//!
//! Engines:
//! - [`CommandSpeechEngine`]: runs an external TTS program per utterance
//! - [`LogSpeechEngine`]: only logs utterances
//! - [`RecordingSpeechEngine`]: records calls for inspection (test harnesses)

pub mod command;
pub mod recording;

pub use command::CommandSpeechEngine;
pub use recording::{RecordingSpeechEngine, SpeechCall};

use crate::config::SpeechConfig;
use crate::playback::PlaybackGate;
use crate::types::{SpeechRequest, Voice};
use tracing::{debug, info, trace, warn};

/// Errors raised by a speech engine
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("Speech engine unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to start speech: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Host text-to-speech engine
pub trait SpeechEngine: Send {
    /// Submit an utterance
    fn speak(&mut self, request: SpeechRequest) -> Result<(), SpeechError>;

    /// Stop the current utterance, if any
    fn cancel(&mut self);

    /// Whether an utterance is still playing
    fn speaking(&mut self) -> bool;

    /// Voices currently available. May be empty until the engine has
    /// finished populating its list.
    fn voices(&self) -> Vec<Voice>;
}

impl<S: SpeechEngine + ?Sized> SpeechEngine for Box<S> {
    fn speak(&mut self, request: SpeechRequest) -> Result<(), SpeechError> {
        (**self).speak(request)
    }

    fn cancel(&mut self) {
        (**self).cancel()
    }

    fn speaking(&mut self) -> bool {
        (**self).speaking()
    }

    fn voices(&self) -> Vec<Voice> {
        (**self).voices()
    }
}

/// Per-utterance parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechParams {
    pub volume: f32,
    pub rate: f32,
    pub voice: Option<String>,
}

impl SpeechParams {
    pub fn from_config(config: &SpeechConfig) -> Self {
        Self {
            volume: config.volume,
            rate: config.rate,
            voice: config.voice.clone(),
        }
    }
}

/// Submits utterances to an engine with cancellation and voice selection
pub struct SpeechDispatcher<S: SpeechEngine> {
    engine: S,
    /// Cached, filtered voice list
    voices: Vec<Voice>,
    /// Language filter applied to the voice list
    voice_language: Option<String>,
    /// Utterances submitted so far
    submitted: u64,
}

impl<S: SpeechEngine> SpeechDispatcher<S> {
    pub fn new(engine: S, voice_language: Option<String>) -> Self {
        Self {
            engine,
            voices: Vec::new(),
            voice_language,
            submitted: 0,
        }
    }

    /// Speak `text` unless the playback gate is blocked.
    ///
    /// Returns whether an utterance was submitted.
    pub fn speak(
        &mut self,
        text: &str,
        params: &SpeechParams,
        gate: PlaybackGate,
    ) -> Result<bool, SpeechError> {
        if gate.is_blocked() {
            debug!("Media is playing, not speaking");
            return Ok(false);
        }
        if text.trim().is_empty() {
            trace!("Nothing to speak");
            return Ok(false);
        }

        if self.engine.speaking() {
            debug!("Cancelling in-flight utterance");
            self.engine.cancel();
        }

        let request = self.build_request(text, params);
        info!(
            "🔊 Speaking {} chars (voice: {}, rate: {:.2}, volume: {:.2})",
            request.text.chars().count(),
            request.voice.as_deref().unwrap_or("default"),
            request.rate,
            request.volume
        );
        self.engine.speak(request)?;
        self.submitted += 1;
        Ok(true)
    }

    /// Build the request for `text`, resolving the voice
    pub fn build_request(&mut self, text: &str, params: &SpeechParams) -> SpeechRequest {
        SpeechRequest {
            text: text.to_string(),
            volume: params.volume,
            rate: params.rate,
            voice: self.select_voice(params.voice.as_deref()),
        }
    }

    /// Preferred voice if available, else the first available voice, else
    /// none (engine default)
    pub fn select_voice(&mut self, preferred: Option<&str>) -> Option<String> {
        let voices = self.voices();
        if let Some(name) = preferred {
            if let Some(voice) = voices.iter().find(|v| v.name == name) {
                return Some(voice.name.clone());
            }
            if !voices.is_empty() {
                warn!("Voice '{}' not available, using '{}'", name, voices[0].name);
            }
        }
        voices.first().map(|v| v.name.clone())
    }

    /// Cached voices, reloaded from the engine while the cache is empty
    pub fn voices(&mut self) -> &[Voice] {
        if self.voices.is_empty() {
            self.refresh_voices();
        }
        &self.voices
    }

    /// Reload and filter the voice list from the engine
    pub fn refresh_voices(&mut self) {
        let all = self.engine.voices();
        let total = all.len();
        self.voices = match &self.voice_language {
            Some(language) => all
                .into_iter()
                .filter(|voice| voice_matches(voice, language))
                .collect(),
            None => all,
        };
        trace!("Loaded {} of {} voice(s)", self.voices.len(), total);
    }

    /// Change the language filter and reload voices
    pub fn set_voice_language(&mut self, voice_language: Option<String>) {
        self.voice_language = voice_language;
        self.refresh_voices();
    }

    /// Stop any in-flight utterance
    pub fn cancel(&mut self) {
        if self.engine.speaking() {
            debug!("Cancelling speech");
            self.engine.cancel();
        }
    }

    pub fn is_speaking(&mut self) -> bool {
        self.engine.speaking()
    }

    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    pub fn engine(&self) -> &S {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut S {
        &mut self.engine
    }
}

fn voice_matches(voice: &Voice, language: &str) -> bool {
    let language = language.to_lowercase();
    voice.lang.to_lowercase().starts_with(&language) || voice.name.to_lowercase().contains(&language)
}

/// Engine that only logs what it would say
#[derive(Debug, Default)]
pub struct LogSpeechEngine {
    voices: Vec<Voice>,
}

impl LogSpeechEngine {
    pub fn new(voices: Vec<Voice>) -> Self {
        Self { voices }
    }
}

impl SpeechEngine for LogSpeechEngine {
    fn speak(&mut self, request: SpeechRequest) -> Result<(), SpeechError> {
        info!(
            "[{}] 🗣  {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            request.text
        );
        Ok(())
    }

    fn cancel(&mut self) {}

    fn speaking(&mut self) -> bool {
        false
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SpeechParams {
        SpeechParams {
            volume: 0.8,
            rate: 1.2,
            voice: Some("Mei-Jia".to_string()),
        }
    }

    fn voices() -> Vec<Voice> {
        vec![
            Voice::new("Samantha", "en-US"),
            Voice::new("Mei-Jia", "zh-TW"),
            Voice::new("Chinese Male", "cmn"),
        ]
    }

    #[test]
    fn test_cancels_exactly_once_before_speaking() {
        let engine = RecordingSpeechEngine::new(voices());
        let mut dispatcher = SpeechDispatcher::new(engine.clone(), None);

        engine.set_speaking(true);
        assert!(dispatcher.speak("next", &params(), PlaybackGate::Open).unwrap());

        let calls = engine.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], SpeechCall::Cancel);
        match &calls[1] {
            SpeechCall::Speak(request) => {
                assert_eq!(request.text, "next");
                assert_eq!(request.volume, 0.8);
                assert_eq!(request.rate, 1.2);
                assert_eq!(request.voice.as_deref(), Some("Mei-Jia"));
            }
            other => panic!("expected speak, got {:?}", other),
        }
    }

    #[test]
    fn test_no_cancel_when_idle() {
        let engine = RecordingSpeechEngine::new(voices());
        let mut dispatcher = SpeechDispatcher::new(engine.clone(), None);

        dispatcher.speak("hello", &params(), PlaybackGate::Open).unwrap();
        assert_eq!(engine.cancel_count(), 0);
        assert_eq!(engine.spoken_texts(), vec!["hello".to_string()]);
        assert_eq!(dispatcher.submitted(), 1);
    }

    #[test]
    fn test_blocked_gate_is_a_no_op() {
        let engine = RecordingSpeechEngine::new(voices());
        let mut dispatcher = SpeechDispatcher::new(engine.clone(), None);
        engine.set_speaking(true);

        assert!(!dispatcher.speak("hello", &params(), PlaybackGate::Blocked).unwrap());
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn test_voice_fallbacks() {
        let engine = RecordingSpeechEngine::new(voices());
        let mut dispatcher = SpeechDispatcher::new(engine, None);
        assert_eq!(dispatcher.select_voice(Some("Unknown")).as_deref(), Some("Samantha"));
        assert_eq!(dispatcher.select_voice(None).as_deref(), Some("Samantha"));

        let mut empty = SpeechDispatcher::new(RecordingSpeechEngine::new(vec![]), None);
        assert_eq!(empty.select_voice(Some("Mei-Jia")), None);
        let request = empty.build_request("hi", &params());
        assert_eq!(request.voice, None);
    }

    #[test]
    fn test_voice_language_filter() {
        let engine = RecordingSpeechEngine::new(voices());
        let mut dispatcher = SpeechDispatcher::new(engine, Some("zh".to_string()));
        let names: Vec<_> = dispatcher.voices().iter().map(|v| v.name.clone()).collect();
        assert_eq!(names, vec!["Mei-Jia"]);

        dispatcher.set_voice_language(Some("chinese".to_string()));
        assert_eq!(dispatcher.voices()[0].name, "Chinese Male");
    }

    #[test]
    fn test_voices_reload_while_empty() {
        let engine = RecordingSpeechEngine::new(vec![]);
        let mut dispatcher = SpeechDispatcher::new(engine.clone(), None);
        assert!(dispatcher.voices().is_empty());

        // Engine finishes populating its list later
        engine.set_voices(voices());
        assert_eq!(dispatcher.voices().len(), 3);
    }

    #[test]
    fn test_empty_text_is_skipped() {
        let engine = RecordingSpeechEngine::new(voices());
        let mut dispatcher = SpeechDispatcher::new(engine.clone(), None);
        assert!(!dispatcher.speak("   ", &params(), PlaybackGate::Open).unwrap());
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn test_cancel_only_when_speaking() {
        let engine = RecordingSpeechEngine::new(voices());
        let mut dispatcher = SpeechDispatcher::new(engine.clone(), None);
        dispatcher.cancel();
        assert_eq!(engine.cancel_count(), 0);

        engine.set_speaking(true);
        dispatcher.cancel();
        assert_eq!(engine.cancel_count(), 1);
        assert!(!dispatcher.is_speaking());
    }
}
