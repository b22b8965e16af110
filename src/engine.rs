//! The tracking engine.
//!
//! [`TrackingEngine`] owns everything one tracked page needs: the config, the
//! page host, the remembered caption, the speech dispatcher and the event
//! subscribers. Several engines can coexist (one per page, or per test).
//!
//! The tick itself is [`step`], a pure function of the previous detector
//! state, the config and the playback gate. It returns the next state plus a
//! list of effects, which [`TrackingEngine::tick`] then applies.

use crate::change_detector::{ChangeDetector, Detection};
use crate::config::{Config, ConfigStore};
use crate::host::PageHost;
use crate::locator;
use crate::playback::PlaybackGate;
use crate::sanitize;
use crate::selector;
use crate::speech::{SpeechDispatcher, SpeechEngine, SpeechError, SpeechParams};
use crate::types::{ExtractionError, ReaderEvent, SubtitleSnapshot};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, trace, warn};

/// Events buffered per subscriber; further events are dropped until it drains
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Why a tick did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Auto-read was switched off
    AutoReadDisabled,
    /// Pause-on-playback is set and the media is playing
    MediaPlaying,
}

/// What a tick observed
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Failed(ExtractionError),
    Unchanged,
    Changed(String),
}

/// Side effects requested by a tick
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Speak(String),
    Notify(ReaderEvent),
}

/// Result of [`step`]
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub outcome: TickOutcome,
    pub effects: Vec<Effect>,
}

impl Tick {
    fn quiet(outcome: TickOutcome) -> Self {
        Self {
            outcome,
            effects: Vec::new(),
        }
    }
}

/// One auto-read tick.
///
/// Extraction only runs when auto-read is on and the playback gate is open;
/// `extract` is not called otherwise.
pub fn step<F>(
    state: &ChangeDetector,
    config: &Config,
    gate: PlaybackGate,
    extract: F,
) -> (ChangeDetector, Tick)
where
    F: FnOnce() -> SubtitleSnapshot,
{
    if !config.auto_read.enabled {
        return (state.clone(), Tick::quiet(TickOutcome::Skipped(SkipReason::AutoReadDisabled)));
    }
    if gate.is_blocked() {
        return (state.clone(), Tick::quiet(TickOutcome::Skipped(SkipReason::MediaPlaying)));
    }

    let snapshot = extract();
    let mut next = state.clone();
    let Detection { changed, text } = next.observe(&snapshot);

    let tick = match snapshot.error {
        Some(error) => Tick::quiet(TickOutcome::Failed(error)),
        None if changed => Tick {
            outcome: TickOutcome::Changed(text.clone()),
            effects: vec![
                Effect::Notify(ReaderEvent::TextChanged(text.clone())),
                Effect::Speak(text),
            ],
        },
        None => Tick::quiet(TickOutcome::Unchanged),
    };
    (next, tick)
}

/// Subtitle tracking engine for one page
pub struct TrackingEngine<H: PageHost, S: SpeechEngine> {
    config: Config,
    store: Option<Box<dyn ConfigStore>>,
    host: H,
    detector: ChangeDetector,
    dispatcher: SpeechDispatcher<S>,
    subscribers: Vec<mpsc::Sender<ReaderEvent>>,
    last_location: Option<String>,
    ticks: u64,
}

impl<H: PageHost, S: SpeechEngine> TrackingEngine<H, S> {
    /// Create an engine; the config is sanitized first
    pub fn new(config: Config, host: H, speech: S) -> Self {
        let config = config.sanitized();
        let detector = ChangeDetector::new(config.auto_read.gap_policy);
        let dispatcher = SpeechDispatcher::new(speech, config.speech.voice_language.clone());
        let last_location = host.location().map(str::to_string);

        Self {
            config,
            store: None,
            host,
            detector,
            dispatcher,
            subscribers: Vec::new(),
            last_location,
            ticks: 0,
        }
    }

    /// Create an engine from a store's config, persisting updates back to it
    pub fn with_store(store: Box<dyn ConfigStore>, host: H, speech: S) -> Self {
        let config = store.load();
        let mut engine = Self::new(config, host, speech);
        engine.store = Some(store);
        engine
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn dispatcher(&self) -> &SpeechDispatcher<S> {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut SpeechDispatcher<S> {
        &mut self.dispatcher
    }

    /// Last caption reported as changed
    pub fn previous_text(&self) -> &str {
        self.detector.previous_text()
    }

    /// Number of ticks run
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Receive engine events (text changes, alerts, spoken text)
    pub fn subscribe(&mut self) -> mpsc::Receiver<ReaderEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.subscribers.push(tx);
        rx
    }

    pub(crate) fn emit(&mut self, event: ReaderEvent) {
        trace!("Event: {:?}", event);
        self.subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                debug!("Subscriber not draining, dropped {:?}", dropped);
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }

    /// The resolved selector for the configured expression
    pub fn selector(&self) -> String {
        selector::resolve(&self.config.tracking.expression)
    }

    /// Check that auto-read can run, with a user-facing reason if not
    pub fn check_ready(&self) -> Result<(), String> {
        if !self.config.tracking.enabled {
            return Err("Enable custom tracking and enter an expression first".to_string());
        }
        if self.selector().is_empty() {
            return Err("Enter the subtitle element class names first".to_string());
        }
        Ok(())
    }

    /// Current playback gate
    pub fn playback_gate(&self) -> PlaybackGate {
        PlaybackGate::evaluate(self.config.auto_read.pause_on_playback, self.host.media())
    }

    fn extract(&self) -> SubtitleSnapshot {
        if !self.config.tracking.enabled {
            return SubtitleSnapshot::failure(ExtractionError::TrackingDisabled);
        }
        locator::snapshot(self.host.document(), &self.selector())
    }

    /// Extract the current subtitle text without touching tracking state
    pub fn snapshot(&mut self) -> SubtitleSnapshot {
        self.host.refresh();
        self.extract()
    }

    /// Run one auto-read tick
    pub fn tick(&mut self) -> TickOutcome {
        self.ticks += 1;
        self.host.refresh();
        self.check_navigation();

        let gate = self.playback_gate();
        let (next, tick) = step(&self.detector, &self.config, gate, || self.extract());
        self.detector = next;

        match &tick.outcome {
            TickOutcome::Skipped(reason) => trace!("Tick skipped: {:?}", reason),
            TickOutcome::Failed(error) => trace!("Tick extraction failed: {}", error),
            TickOutcome::Unchanged => trace!("Tick: subtitle unchanged"),
            TickOutcome::Changed(text) => debug!("Tick: subtitle changed to {:?}", text),
        }

        self.apply(tick.effects, gate);
        tick.outcome
    }

    fn apply(&mut self, effects: Vec<Effect>, gate: PlaybackGate) {
        for effect in effects {
            match effect {
                Effect::Speak(text) => {
                    self.dispatch(&text, gate);
                }
                Effect::Notify(event) => self.emit(event),
            }
        }
    }

    /// Speak through the dispatcher, reporting failures instead of returning
    /// them
    fn dispatch(&mut self, text: &str, gate: PlaybackGate) -> bool {
        let params = SpeechParams::from_config(&self.config.speech);
        match self.dispatcher.speak(text, &params, gate) {
            Ok(true) => {
                self.emit(ReaderEvent::Spoken(text.to_string()));
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!("Speech failed: {}", e);
                false
            }
        }
    }

    fn check_navigation(&mut self) {
        let location = self.host.location();
        if location == self.last_location.as_deref() {
            return;
        }
        if self.last_location.is_some() {
            info!("Page changed to {}, restarting tracking", location.unwrap_or("(none)"));
            self.detector.reset();
        }
        self.last_location = location.map(str::to_string);
    }

    /// Forget the remembered caption so the next one is read regardless
    pub fn reset_tracking(&mut self) {
        debug!("Tracking reset");
        self.detector.reset();
    }

    /// Manual re-parse: restart tracking and report the current snapshot
    pub fn parse_now(&mut self) -> SubtitleSnapshot {
        self.reset_tracking();
        self.snapshot()
    }

    /// Speak `text` right away (subject to the playback gate)
    pub fn speak_now(&mut self, text: &str) -> Result<bool, SpeechError> {
        let gate = self.playback_gate();
        let params = SpeechParams::from_config(&self.config.speech);
        let spoken = self.dispatcher.speak(text, &params, gate)?;
        if spoken {
            self.emit(ReaderEvent::Spoken(text.to_string()));
        }
        Ok(spoken)
    }

    /// Parse the page and speak whatever it currently shows
    pub fn parse_and_speak(&mut self) -> SubtitleSnapshot {
        if let Err(reason) = self.check_ready() {
            self.emit(ReaderEvent::Alert(reason));
            return self.snapshot();
        }
        let snapshot = self.snapshot();
        match &snapshot.error {
            Some(error) => debug!("Nothing to speak: {}", error),
            None => {
                let gate = self.playback_gate();
                self.dispatch(&snapshot.text, gate);
            }
        }
        snapshot
    }

    /// Stop any in-flight utterance
    pub fn cancel_speech(&mut self) {
        self.dispatcher.cancel();
    }

    /// Replace the tracking expression (live edit) and restart tracking.
    ///
    /// Polluted input is cleared rather than stored.
    pub fn set_expression(&mut self, expression: &str) -> SubtitleSnapshot {
        let cleaned = sanitize::clean_expression(expression);
        self.update_config(|config| config.tracking.expression = cleaned);
        self.reset_tracking();
        self.snapshot()
    }

    /// Set the page video's volume (clamped to 0-1), persist it and write it
    /// to the media element. Returns the volume applied.
    pub fn set_video_volume(&mut self, volume: f32) -> f32 {
        self.update_config(|config| config.media.video_volume = volume);
        let volume = self.config.media.video_volume;
        if !self.host.set_video_volume(volume) {
            debug!("No media element, video volume {:.2} stored only", volume);
        }
        volume
    }

    /// Switch custom tracking on or off
    pub fn set_tracking_enabled(&mut self, enabled: bool) {
        self.update_config(|config| config.tracking.enabled = enabled);
    }

    /// Flip the auto-read flag, persisting it
    pub fn set_auto_read_enabled(&mut self, enabled: bool) {
        if self.config.auto_read.enabled == enabled {
            return;
        }
        self.update_config(|config| config.auto_read.enabled = enabled);
        self.emit(ReaderEvent::AutoReadChanged(enabled));
    }

    /// Apply a config change: sanitize, push it into the components, persist
    pub fn update_config<F>(&mut self, change: F)
    where
        F: FnOnce(&mut Config),
    {
        let mut config = self.config.clone();
        change(&mut config);
        let config = config.sanitized();

        if config.auto_read.gap_policy != self.detector.gap_policy() {
            self.detector.set_gap_policy(config.auto_read.gap_policy);
        }
        if config.speech.voice_language != self.config.speech.voice_language {
            self.dispatcher
                .set_voice_language(config.speech.voice_language.clone());
        }

        self.config = config;
        self.persist();
    }

    fn persist(&mut self) {
        if let Some(store) = self.store.as_mut() {
            if let Err(e) = store.save(&self.config) {
                warn!("Failed to save configuration: {}", e);
            }
        }
    }
}
