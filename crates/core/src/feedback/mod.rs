use crate::session::Snapshot;

/// Haptic pulse kinds forwarded to the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HapticKind {
    Light,
    Medium,
    Success,
    Warning,
}

/// Display collaborator: receives the read-only snapshot after every tick.
pub trait DisplaySink: Send {
    fn notify_phase_change(&mut self, snapshot: &Snapshot);
}

/// Host haptic feedback. Strictly best-effort; implementations swallow
/// their own failures.
pub trait HapticSink: Send {
    fn pulse(&mut self, kind: HapticKind);
}

/// Best-effort screen-stay-awake request. Acquisition failures are logged
/// by the caller and never block a session; the platform may also revoke a
/// held lock at any time, which `is_held` reports so it can be re-acquired.
pub trait WakeHold: Send {
    fn acquire(&mut self) -> crate::Result<()>;
    fn release(&mut self);
    fn is_held(&self) -> bool;
}

/// Display sink that ignores every snapshot.
#[derive(Debug, Default)]
pub struct NullDisplay;

impl DisplaySink for NullDisplay {
    fn notify_phase_change(&mut self, _snapshot: &Snapshot) {}
}

/// Haptic sink for hosts without haptics.
#[derive(Debug, Default)]
pub struct NullHaptics;

impl HapticSink for NullHaptics {
    fn pulse(&mut self, _kind: HapticKind) {}
}

/// Wake hold for hosts without a screen to keep awake. Always succeeds and
/// reports itself held so the runner never retries.
#[derive(Debug, Default)]
pub struct NoopWakeHold {
    held: bool,
}

impl WakeHold for NoopWakeHold {
    fn acquire(&mut self) -> crate::Result<()> {
        self.held = true;
        Ok(())
    }

    fn release(&mut self) {
        self.held = false;
    }

    fn is_held(&self) -> bool {
        self.held
    }
}
