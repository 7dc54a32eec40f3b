use std::sync::{Arc, Mutex, MutexGuard};

use crate::audio::CuePlayer;
use crate::catalog::Catalog;
use crate::feedback::{
    DisplaySink, HapticKind, HapticSink, NoopWakeHold, NullDisplay, NullHaptics, WakeHold,
};
use crate::timeline::{TickHandle, TickScheduler};
use crate::{BreathworkError, Result};

use super::{Session, SessionEvent, SessionPhase, Snapshot};

struct Inner {
    scheduler: Box<dyn TickScheduler + Send>,
    session: Option<Session>,
    handle: Option<TickHandle>,
    display: Box<dyn DisplaySink>,
    haptics: Box<dyn HapticSink>,
    wake: Box<dyn WakeHold>,
    ambient: bool,
}

impl Inner {
    /// Tears down whatever session is live: the timer registration, the
    /// held wake lock and the session state itself. Scheduled tones are
    /// left to ring out.
    fn teardown_session(&mut self, cues: &CuePlayer) {
        self.handle.take();
        self.session = None;
        if self.wake.is_held() {
            self.wake.release();
        }
        cues.reset_ambient();
    }

    fn acquire_wake(&mut self) {
        if let Err(err) = self.wake.acquire() {
            tracing::warn!(%err, "wake hold unavailable");
        }
    }
}

/// Owns the one active breathing session and drives it from a scheduler.
///
/// Exactly one timer registration is live while a session is preparing,
/// running or paused; starting a new session first cancels the previous
/// registration, so the single-active-session rule holds by construction
/// rather than by convention. Every cue fires synchronously inside the
/// tick that produced the transition, before the display sink sees the
/// resulting snapshot.
pub struct SessionRunner {
    catalog: Arc<Catalog>,
    cues: Arc<CuePlayer>,
    inner: Arc<Mutex<Inner>>,
}

impl SessionRunner {
    pub fn new(
        catalog: Arc<Catalog>,
        scheduler: impl TickScheduler + Send + 'static,
        cues: Arc<CuePlayer>,
    ) -> Self {
        Self {
            catalog,
            cues,
            inner: Arc::new(Mutex::new(Inner {
                scheduler: Box::new(scheduler),
                session: None,
                handle: None,
                display: Box::new(NullDisplay),
                haptics: Box::new(NullHaptics),
                wake: Box::new(NoopWakeHold::default()),
                ambient: false,
            })),
        }
    }

    pub fn with_display(self, display: impl DisplaySink + 'static) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            inner.display = Box::new(display);
        }
        self
    }

    pub fn with_haptics(self, haptics: impl HapticSink + 'static) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            inner.haptics = Box::new(haptics);
        }
        self
    }

    pub fn with_wake_hold(self, wake: impl WakeHold + 'static) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            inner.wake = Box::new(wake);
        }
        self
    }

    /// Enables the ambient drone for sessions started by this runner.
    pub fn with_ambient(self, ambient: bool) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            inner.ambient = ambient;
        }
        self
    }

    /// Starts a session for `technique_id`, tearing down any session that
    /// is still live. An unknown id is a caller error: it is reported and
    /// nothing changes.
    pub fn start(&self, technique_id: &str, duration_seconds: u32) -> Result<()> {
        let mut inner = self.lock()?;

        let technique = Arc::new(self.catalog.technique(technique_id)?.clone());
        inner.teardown_session(&self.cues);

        // Audio allocation rides on the user gesture that started the
        // session, as host platforms require.
        self.cues.initialize();
        if inner.ambient {
            self.cues.start_ambient();
        }

        let mut session = Session::new(technique, duration_seconds);
        session.start();
        let snapshot = session.snapshot();
        inner.session = Some(session);

        inner.acquire_wake();
        inner.haptics.pulse(HapticKind::Medium);
        inner.display.notify_phase_change(&snapshot);

        let shared = self.inner.clone();
        let cues = self.cues.clone();
        let handle = inner
            .scheduler
            .every_second(Box::new(move || Self::on_tick(&shared, &cues)));
        inner.handle = Some(handle);

        tracing::info!(technique_id, duration_seconds, "session started");
        Ok(())
    }

    fn on_tick(shared: &Arc<Mutex<Inner>>, cues: &Arc<CuePlayer>) {
        let Ok(mut inner) = shared.lock() else {
            return;
        };

        let Some(session) = inner.session.as_mut() else {
            return;
        };
        let event = session.tick();
        let snapshot = session.snapshot();
        let active = session.is_active();

        match event {
            Some(SessionEvent::PhaseStarted(kind)) => {
                cues.cue_for_phase(kind);
                inner.haptics.pulse(HapticKind::Light);
            }
            Some(SessionEvent::Completed) => {
                cues.cue_complete();
                inner.haptics.pulse(HapticKind::Success);
                inner.handle.take();
                if inner.wake.is_held() {
                    inner.wake.release();
                }
                cues.reset_ambient();
                tracing::info!("session complete");
            }
            None => {}
        }

        // The platform may revoke the wake hold at any time; keep asking
        // for it while the session is alive.
        if active && !inner.wake.is_held() {
            inner.acquire_wake();
        }

        inner.display.notify_phase_change(&snapshot);
    }

    /// Toggles pause on the live session and returns whether it is now
    /// paused. Pause and resume deliberately fire no cue.
    pub fn toggle_pause(&self) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };
        let Some(session) = inner.session.as_mut() else {
            return false;
        };
        let paused = session.toggle_pause();
        let snapshot = session.snapshot();
        inner.haptics.pulse(HapticKind::Light);
        inner.display.notify_phase_change(&snapshot);
        paused
    }

    /// Cancels the live session unconditionally. No cue fires; tones that
    /// are already sounding ring out naturally.
    pub fn stop(&self) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.haptics.pulse(HapticKind::Warning);
        inner.teardown_session(&self.cues);
    }

    /// Acknowledges a completed session and returns the runner to idle.
    pub fn finish(&self) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let complete = inner
            .session
            .as_ref()
            .map(Session::is_complete)
            .unwrap_or(false);
        if complete {
            inner.haptics.pulse(HapticKind::Light);
            inner.teardown_session(&self.cues);
        }
    }

    /// Forwards to the shared cue player; there is exactly one mute state
    /// and this is its owner.
    pub fn set_muted(&self, muted: bool) -> bool {
        self.cues.set_muted(muted)
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.session.as_ref().map(Session::phase))
            .unwrap_or(SessionPhase::Idle)
    }

    pub fn snapshot(&self) -> Option<Snapshot> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.session.as_ref().map(Session::snapshot))
    }

    pub fn is_complete(&self) -> bool {
        self.phase() == SessionPhase::Complete
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| BreathworkError::msg("session state has been poisoned"))
    }
}

impl std::fmt::Debug for SessionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRunner")
            .field("phase", &self.phase())
            .finish()
    }
}
