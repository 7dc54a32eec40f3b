//! Core library for the Breathwork guided-breathing application.
//!
//! The crate is organised around the two subsystems with real temporal
//! logic: the tick-driven session state machine ([`session`]) and the
//! procedural audio cue player ([`audio`]) that must stay synchronized
//! with it. The technique catalog, scheduler capability and host
//! collaborator interfaces (display, haptics, wake hold) surround them as
//! narrow seams so the engine can be driven deterministically in tests.

pub mod audio;
pub mod catalog;
pub mod error;
pub mod feedback;
pub mod session;
pub mod timeline;

pub use audio::CuePlayer;
pub use catalog::{Catalog, Mode, Phase, PhaseKind, Technique};
pub use error::{BreathworkError, Result};
pub use feedback::{DisplaySink, HapticKind, HapticSink, WakeHold};
pub use session::{
    project_scale, Session, SessionEvent, SessionPhase, SessionRunner, Snapshot, SnapshotMode,
    PREP_SECONDS,
};
pub use timeline::{ManualScheduler, ThreadScheduler, TickHandle, TickScheduler};
