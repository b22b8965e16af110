//! Auto-read scheduling.
//!
//! While auto-read is active, a tokio task ticks the shared engine at the
//! configured interval. At most one timer exists per scheduler: starting again
//! replaces the old timer, and dropping the scheduler stops it.

use crate::engine::TrackingEngine;
use crate::host::PageHost;
use crate::speech::SpeechEngine;
use crate::types::ReaderEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Engine shared between the timer task and UI callers
pub type SharedEngine<H, S> = Arc<Mutex<TrackingEngine<H, S>>>;

/// Errors starting auto-read
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("Auto-read is not configured: {0}")]
    NotConfigured(String),
}

/// A running timer. Dropping it stops the timer.
struct AutoReadSession {
    handle: JoinHandle<()>,
    /// Cleared on stop; the task checks it after taking the engine lock
    running: Arc<AtomicBool>,
    period: Duration,
    started_at: chrono::DateTime<chrono::Local>,
}

impl Drop for AutoReadSession {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.handle.abort();
    }
}

/// Owns the auto-read timer for one engine
pub struct AutoReadScheduler<H: PageHost, S: SpeechEngine + 'static> {
    engine: SharedEngine<H, S>,
    session: Option<AutoReadSession>,
}

impl<H: PageHost, S: SpeechEngine + 'static> AutoReadScheduler<H, S> {
    pub fn new(engine: TrackingEngine<H, S>) -> Self {
        Self::from_shared(Arc::new(Mutex::new(engine)))
    }

    pub fn from_shared(engine: SharedEngine<H, S>) -> Self {
        Self {
            engine,
            session: None,
        }
    }

    /// Handle to the engine for UI operations
    pub fn engine(&self) -> SharedEngine<H, S> {
        Arc::clone(&self.engine)
    }

    /// Whether a timer is running
    pub fn is_active(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| !session.handle.is_finished())
    }

    /// Period of the running timer
    pub fn period(&self) -> Option<Duration> {
        self.session.as_ref().map(|session| session.period)
    }

    /// Start ticking at the configured interval.
    ///
    /// Any previous timer is stopped first. If tracking is off or no
    /// expression is set, an alert is raised, auto-read is switched off and
    /// persisted, and no timer is started.
    pub async fn start(&mut self) -> Result<(), SchedulerError> {
        self.stop();

        let mut engine = self.engine.lock().await;
        if let Err(reason) = engine.check_ready() {
            warn!("Cannot start auto-read: {}", reason);
            engine.emit(ReaderEvent::Alert(reason.clone()));
            engine.set_auto_read_enabled(false);
            return Err(SchedulerError::NotConfigured(reason));
        }
        let period = engine.config().auto_read.interval();
        drop(engine);

        let running = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(run_timer(
            Arc::clone(&self.engine),
            period,
            Arc::clone(&running),
        ));
        self.session = Some(AutoReadSession {
            handle,
            running,
            period,
            started_at: chrono::Local::now(),
        });
        info!("▶️  Auto-read started ({}ms interval)", period.as_millis());
        Ok(())
    }

    /// Stop the timer. Safe to call when nothing is running.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            let ran_for = chrono::Local::now() - session.started_at;
            info!("⏹  Auto-read stopped after {}s", ran_for.num_seconds());
        }
    }

    /// Flip auto-read on or off, returning the new state.
    ///
    /// Switching off also cancels any in-flight speech.
    pub async fn toggle(&mut self) -> Result<bool, SchedulerError> {
        let enabled = {
            let mut engine = self.engine.lock().await;
            let enabled = !engine.config().auto_read.enabled;
            engine.set_auto_read_enabled(enabled);
            if !enabled {
                engine.cancel_speech();
            }
            enabled
        };

        if enabled {
            self.start().await?;
        } else {
            self.stop();
        }
        Ok(enabled)
    }

    /// Change the tick interval (clamped), restarting a running timer.
    ///
    /// Returns the interval actually applied.
    pub async fn set_interval(&mut self, interval_ms: u64) -> Result<Duration, SchedulerError> {
        let interval = {
            let mut engine = self.engine.lock().await;
            engine.update_config(|config| config.auto_read.interval_ms = interval_ms);
            engine.config().auto_read.interval()
        };
        debug!("Auto-read interval set to {}ms", interval.as_millis());

        if self.is_active() {
            self.start().await?;
        }
        Ok(interval)
    }

    /// Tear down: stop the timer and any speech
    pub async fn dispose(&mut self) {
        self.stop();
        self.engine.lock().await.cancel_speech();
    }
}

impl<H: PageHost, S: SpeechEngine + 'static> Drop for AutoReadScheduler<H, S> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_timer<H, S>(engine: SharedEngine<H, S>, period: Duration, running: Arc<AtomicBool>)
where
    H: PageHost,
    S: SpeechEngine + 'static,
{
    // First tick fires one period after start
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        // A tick that finds the engine busy is dropped, never queued
        let Ok(mut guard) = engine.try_lock() else {
            trace!("Engine busy, skipping tick");
            continue;
        };
        // A tick woken before stop() must not run after it
        if !running.load(Ordering::SeqCst) {
            trace!("Auto-read stopped, discarding pending tick");
            return;
        }
        guard.tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, MemoryConfigStore};
    use crate::dom::{Document, DocumentTree};
    use crate::host::StaticPage;
    use crate::speech::RecordingSpeechEngine;

    type TestScheduler = AutoReadScheduler<StaticPage, RecordingSpeechEngine>;

    fn scheduler(expression: &str) -> (TestScheduler, RecordingSpeechEngine, MemoryConfigStore) {
        let mut config = Config::default();
        config.tracking.expression = expression.to_string();
        config.auto_read.interval_ms = 500;
        let store = MemoryConfigStore::new(config);

        let mut doc = Document::new();
        let root = doc.root();
        let line = doc.append_element(root, "div", &["sub-line"]);
        doc.append_text(line, "Hello");

        let speech = RecordingSpeechEngine::default();
        let engine =
            TrackingEngine::with_store(Box::new(store.clone()), StaticPage::new(doc), speech.clone());
        (AutoReadScheduler::new(engine), speech, store)
    }

    async fn ticks(scheduler: &TestScheduler) -> u64 {
        scheduler.engine().lock().await.tick_count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_interval() {
        let (mut scheduler, speech, _) = scheduler("sub-line");
        scheduler.start().await.unwrap();
        assert!(scheduler.is_active());
        assert_eq!(scheduler.period(), Some(Duration::from_millis(500)));

        tokio::time::sleep(Duration::from_millis(1_250)).await;
        assert_eq!(ticks(&scheduler).await, 2);
        assert_eq!(speech.spoken_texts(), vec!["Hello".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_keeps_one_timer() {
        let (mut scheduler, _, _) = scheduler("sub-line");
        scheduler.start().await.unwrap();
        scheduler.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(1_250)).await;
        assert_eq!(ticks(&scheduler).await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let (mut scheduler, _, _) = scheduler("sub-line");
        scheduler.stop();
        scheduler.start().await.unwrap();
        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_active());

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(ticks(&scheduler).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_without_expression_disables_auto_read() {
        let (mut scheduler, _, store) = scheduler("  ");
        let mut events = scheduler.engine().lock().await.subscribe();

        let result = scheduler.start().await;
        assert!(matches!(result, Err(SchedulerError::NotConfigured(_))));
        assert!(!scheduler.is_active());
        assert!(!store.current().auto_read.enabled);

        assert!(matches!(events.try_recv(), Ok(ReaderEvent::Alert(_))));
        assert_eq!(events.try_recv().unwrap(), ReaderEvent::AutoReadChanged(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_off_cancels_speech() {
        let (mut scheduler, speech, store) = scheduler("sub-line");
        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(speech.spoken_texts().len(), 1);

        assert!(!scheduler.toggle().await.unwrap());
        assert!(!scheduler.is_active());
        assert_eq!(speech.cancel_count(), 1);
        assert!(!store.current().auto_read.enabled);

        assert!(scheduler.toggle().await.unwrap());
        assert!(scheduler.is_active());
        assert!(store.current().auto_read.enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_interval_restarts_and_clamps() {
        let (mut scheduler, _, store) = scheduler("sub-line");
        scheduler.start().await.unwrap();

        let applied = scheduler.set_interval(10).await.unwrap();
        assert_eq!(applied, Duration::from_millis(100));
        assert_eq!(scheduler.period(), Some(Duration::from_millis(100)));
        assert_eq!(store.current().auto_read.interval_ms, 100);

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(ticks(&scheduler).await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_interval_while_idle_does_not_start() {
        let (mut scheduler, _, _) = scheduler("sub-line");
        scheduler.set_interval(1_000).await.unwrap();
        assert!(!scheduler.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_engine_drops_ticks() {
        let (mut scheduler, _, _) = scheduler("sub-line");
        scheduler.start().await.unwrap();

        let engine = scheduler.engine();
        let guard = engine.lock().await;
        tokio::time::sleep(Duration::from_millis(1_250)).await;
        assert_eq!(guard.tick_count(), 0);
        drop(guard);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(ticks(&scheduler).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_timer_never_ticks() {
        let (scheduler, _, _) = scheduler("sub-line");
        let running = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(run_timer(
            scheduler.engine(),
            Duration::from_millis(100),
            running,
        ));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(handle.is_finished());
        assert_eq!(ticks(&scheduler).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_stops_everything() {
        let (mut scheduler, speech, _) = scheduler("sub-line");
        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        scheduler.dispose().await;
        assert!(!scheduler.is_active());
        assert_eq!(speech.cancel_count(), 1);

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(ticks(&scheduler).await, 1);
    }
}
