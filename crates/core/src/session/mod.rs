use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::{PhaseKind, Technique};

pub mod runner;

pub use runner::SessionRunner;

/// Number of countdown ticks between `start()` and the first breathing phase.
pub const PREP_SECONDS: u32 = 3;

/// Mutable counters for an in-flight session. `total_remaining` is signed on
/// purpose: it keeps counting below zero while the finishing tail plays out,
/// and only the emitted snapshot clamps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunningState {
    pub phase_index: usize,
    pub phase_remaining: u32,
    pub total_remaining: i64,
    pub finishing: bool,
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Preparing { remaining: u32 },
    Running(RunningState),
    Paused(RunningState),
    Complete,
}

/// Event emitted by a tick that crossed a phase boundary. The caller must
/// dispatch the matching audio cue before the next tick can be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    PhaseStarted(PhaseKind),
    Completed,
}

/// Coarse session mode exposed to display projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotMode {
    Idle,
    Preparing,
    Running,
    Paused,
    Complete,
}

/// Read-only projection of the session state, emitted once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub mode: SnapshotMode,
    pub phase_label: String,
    pub phase_seconds_remaining: u32,
    /// Clamped to zero while the finishing tail runs past the nominal
    /// duration; never negative.
    pub total_seconds_remaining: u32,
    pub animation_scale: f32,
}

/// The breathing session state machine.
///
/// A session owns its countdown and phase-cycling state and nothing else:
/// the technique is borrowed read-only via [`Arc`], and both the technique
/// and the selected duration are fixed at construction. The machine is
/// advanced exclusively through [`Session::tick`], which the caller drives
/// at 1 Hz, so every transition is deterministic and testable without a
/// running timer.
#[derive(Debug, Clone)]
pub struct Session {
    technique: Arc<Technique>,
    duration_seconds: u32,
    phase: SessionPhase,
}

impl Session {
    pub fn new(technique: Arc<Technique>, duration_seconds: u32) -> Self {
        Self {
            technique,
            duration_seconds,
            phase: SessionPhase::Idle,
        }
    }

    pub fn technique(&self) -> &Technique {
        &self.technique
    }

    pub fn duration_seconds(&self) -> u32 {
        self.duration_seconds
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// True while the session holds tick-driven state (Preparing, Running or
    /// Paused). Exactly one live timer registration corresponds to this.
    pub fn is_active(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::Preparing { .. } | SessionPhase::Running(_) | SessionPhase::Paused(_)
        )
    }

    pub fn is_complete(&self) -> bool {
        self.phase == SessionPhase::Complete
    }

    /// Begins the preparation countdown. No-op unless the session is idle.
    pub fn start(&mut self) {
        if self.phase == SessionPhase::Idle {
            self.phase = SessionPhase::Preparing {
                remaining: PREP_SECONDS,
            };
        }
    }

    /// Advances the machine by one second.
    ///
    /// Ticks received while `Idle`, `Complete` or `Paused` change nothing.
    /// A tick that crosses a phase boundary returns the event the caller
    /// must act on within the same tick.
    pub fn tick(&mut self) -> Option<SessionEvent> {
        match self.phase {
            SessionPhase::Idle | SessionPhase::Complete | SessionPhase::Paused(_) => None,
            SessionPhase::Preparing { remaining } => {
                let remaining = remaining.saturating_sub(1);
                if remaining > 0 {
                    self.phase = SessionPhase::Preparing { remaining };
                    return None;
                }
                let first = &self.technique.phases[0];
                self.phase = SessionPhase::Running(RunningState {
                    phase_index: 0,
                    phase_remaining: first.duration,
                    total_remaining: i64::from(self.duration_seconds),
                    finishing: false,
                });
                Some(SessionEvent::PhaseStarted(first.kind))
            }
            SessionPhase::Running(mut run) => {
                run.phase_remaining = run.phase_remaining.saturating_sub(1);
                run.total_remaining -= 1;

                // One-way latch: nominal time is up, but the breath in
                // progress still gets to complete its cycle.
                if run.total_remaining <= 0 {
                    run.finishing = true;
                }

                if run.phase_remaining > 0 {
                    self.phase = SessionPhase::Running(run);
                    return None;
                }

                let last_index = self.technique.phases.len() - 1;
                if run.finishing && run.phase_index == last_index {
                    self.phase = SessionPhase::Complete;
                    return Some(SessionEvent::Completed);
                }

                run.phase_index = (run.phase_index + 1) % self.technique.phases.len();
                run.phase_remaining = self.technique.phases[run.phase_index].duration;
                let kind = self.technique.phases[run.phase_index].kind;
                self.phase = SessionPhase::Running(run);
                Some(SessionEvent::PhaseStarted(kind))
            }
        }
    }

    /// Toggles pause. While paused, ticks are still delivered but all
    /// counters are frozen. Returns whether the session is now paused.
    pub fn toggle_pause(&mut self) -> bool {
        match self.phase {
            SessionPhase::Running(run) => {
                self.phase = SessionPhase::Paused(run);
                true
            }
            SessionPhase::Paused(run) => {
                self.phase = SessionPhase::Running(run);
                false
            }
            _ => false,
        }
    }

    /// Discards all session progress unconditionally.
    pub fn stop(&mut self) {
        self.phase = SessionPhase::Idle;
    }

    /// Acknowledges a completed session, returning the machine to idle.
    pub fn finish(&mut self) {
        if self.phase == SessionPhase::Complete {
            self.phase = SessionPhase::Idle;
        }
    }

    /// Projects the current state into the read-only snapshot handed to
    /// display collaborators.
    pub fn snapshot(&self) -> Snapshot {
        match self.phase {
            SessionPhase::Idle => Snapshot {
                mode: SnapshotMode::Idle,
                phase_label: String::new(),
                phase_seconds_remaining: 0,
                total_seconds_remaining: 0,
                animation_scale: 1.0,
            },
            // The overall countdown reads 0:00 until the first breath starts.
            SessionPhase::Preparing { remaining } => Snapshot {
                mode: SnapshotMode::Preparing,
                phase_label: "Get ready".to_string(),
                phase_seconds_remaining: remaining,
                total_seconds_remaining: 0,
                animation_scale: 1.0,
            },
            SessionPhase::Running(run) | SessionPhase::Paused(run) => {
                let phase = &self.technique.phases[run.phase_index];
                let previous = self.previous_kind(run.phase_index);
                let mode = if matches!(self.phase, SessionPhase::Paused(_)) {
                    SnapshotMode::Paused
                } else {
                    SnapshotMode::Running
                };
                Snapshot {
                    mode,
                    phase_label: phase.name.clone(),
                    phase_seconds_remaining: run.phase_remaining,
                    total_seconds_remaining: run.total_remaining.max(0) as u32,
                    animation_scale: project_scale(
                        phase.kind,
                        phase.duration,
                        run.phase_remaining,
                        previous,
                    ),
                }
            }
            SessionPhase::Complete => Snapshot {
                mode: SnapshotMode::Complete,
                phase_label: "Complete".to_string(),
                phase_seconds_remaining: 0,
                total_seconds_remaining: 0,
                animation_scale: 1.0,
            },
        }
    }

    fn previous_kind(&self, index: usize) -> PhaseKind {
        let len = self.technique.phases.len();
        self.technique.phases[(index + len - 1) % len].kind
    }
}

/// Maps a phase position onto the breathing-circle scale in `[0.8, 1.2]`.
///
/// Stateless and referentially transparent: the scale is derived entirely
/// from the arguments. `hold` has no direction of its own, so it pins to
/// the extreme the previous phase reached.
pub fn project_scale(
    kind: PhaseKind,
    phase_duration: u32,
    phase_remaining: u32,
    previous: PhaseKind,
) -> f32 {
    let progress = if phase_duration == 0 {
        1.0
    } else {
        1.0 - phase_remaining as f32 / phase_duration as f32
    };

    match kind {
        PhaseKind::Inhale => 0.8 + 0.4 * progress,
        PhaseKind::Exhale => 1.2 - 0.4 * progress,
        PhaseKind::Hold => {
            if previous == PhaseKind::Inhale {
                1.2
            } else {
                0.8
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Phase};

    fn technique(phases: &[(&str, u32, PhaseKind)]) -> Arc<Technique> {
        Arc::new(Technique {
            id: "test".to_string(),
            name: "Test".to_string(),
            description: String::new(),
            phases: phases
                .iter()
                .map(|(name, duration, kind)| Phase {
                    name: name.to_string(),
                    duration: *duration,
                    kind: *kind,
                })
                .collect(),
            effects: Vec::new(),
            total_cycle: phases.iter().map(|(_, duration, _)| duration).sum(),
        })
    }

    fn box_technique() -> Arc<Technique> {
        technique(&[
            ("Inhale", 4, PhaseKind::Inhale),
            ("Hold", 4, PhaseKind::Hold),
            ("Exhale", 4, PhaseKind::Exhale),
            ("Hold", 4, PhaseKind::Hold),
        ])
    }

    fn started(technique: Arc<Technique>, duration: u32) -> Session {
        let mut session = Session::new(technique, duration);
        session.start();
        // Burn through the preparation countdown.
        for _ in 0..PREP_SECONDS {
            session.tick();
        }
        assert!(matches!(session.phase(), SessionPhase::Running(_)));
        session
    }

    #[test]
    fn preparing_lasts_exactly_three_ticks() {
        let mut session = Session::new(box_technique(), 60);
        session.start();
        assert_eq!(session.phase(), SessionPhase::Preparing { remaining: 3 });

        assert_eq!(session.tick(), None);
        assert_eq!(session.tick(), None);
        assert_eq!(
            session.tick(),
            Some(SessionEvent::PhaseStarted(PhaseKind::Inhale))
        );
        assert!(matches!(session.phase(), SessionPhase::Running(_)));
    }

    #[test]
    fn ticks_in_idle_and_complete_are_noops() {
        let mut session = Session::new(box_technique(), 16);
        assert_eq!(session.tick(), None);
        assert_eq!(session.phase(), SessionPhase::Idle);

        session.start();
        for _ in 0..PREP_SECONDS {
            session.tick();
        }
        let mut completed = false;
        for _ in 0..16 {
            if session.tick() == Some(SessionEvent::Completed) {
                completed = true;
            }
        }
        assert!(completed);
        assert_eq!(session.tick(), None);
        assert!(session.is_complete());
    }

    #[test]
    fn box_sixteen_seconds_is_exactly_one_cycle() {
        let mut session = started(box_technique(), 16);

        let mut events = Vec::new();
        for tick in 1..=16 {
            if let Some(event) = session.tick() {
                events.push((tick, event));
            }
            if let SessionPhase::Running(run) = session.phase() {
                // The latch flips exactly when the nominal time runs out,
                // which for a 16 s box is the final tick.
                assert_eq!(run.finishing, run.total_remaining <= 0);
            }
        }

        assert_eq!(
            events,
            vec![
                (4, SessionEvent::PhaseStarted(PhaseKind::Hold)),
                (8, SessionEvent::PhaseStarted(PhaseKind::Exhale)),
                (12, SessionEvent::PhaseStarted(PhaseKind::Hold)),
                (16, SessionEvent::Completed),
            ]
        );
    }

    #[test]
    fn finishing_latch_runs_out_the_current_cycle() {
        // Nominal 14 s expires during the fourth phase (ticks 13..16); the
        // session keeps going to the cycle boundary instead of cutting off.
        let mut session = started(box_technique(), 14);

        for tick in 1..=16 {
            let event = session.tick();
            match tick {
                14 | 15 => {
                    let SessionPhase::Running(run) = session.phase() else {
                        panic!("expected running at tick {tick}");
                    };
                    assert!(run.finishing);
                    assert!(run.total_remaining <= 0);
                    // The snapshot clamps the overrun to zero.
                    assert_eq!(session.snapshot().total_seconds_remaining, 0);
                }
                16 => assert_eq!(event, Some(SessionEvent::Completed)),
                _ => assert_ne!(event, Some(SessionEvent::Completed)),
            }
        }
    }

    #[test]
    fn physiological_nine_seconds_is_exactly_one_cycle() {
        let technique = technique(&[
            ("Inhale", 2, PhaseKind::Inhale),
            ("Top-up", 1, PhaseKind::Inhale),
            ("Exhale", 6, PhaseKind::Exhale),
        ]);
        let mut session = started(technique, 9);

        let mut events = Vec::new();
        for tick in 1..=9 {
            if let Some(event) = session.tick() {
                events.push((tick, event));
            }
        }

        assert_eq!(
            events,
            vec![
                (2, SessionEvent::PhaseStarted(PhaseKind::Inhale)),
                (3, SessionEvent::PhaseStarted(PhaseKind::Exhale)),
                (9, SessionEvent::Completed),
            ]
        );
    }

    #[test]
    fn completion_always_lands_on_the_last_phase() {
        // Every catalog technique, across a spread of durations, must end
        // at the boundary of its own final phase: the number of phase
        // starts is then an exact multiple of the phase count.
        let catalog = Catalog::fallback();
        for technique in &catalog.techniques {
            let cycle = technique.cycle_seconds();
            for duration in [1, cycle - 1, cycle, cycle + 1, 60] {
                let mut session = started(Arc::new(technique.clone()), duration);
                let mut phase_starts = 1u32; // the first phase fired during prep
                loop {
                    match session.tick() {
                        Some(SessionEvent::PhaseStarted(_)) => phase_starts += 1,
                        Some(SessionEvent::Completed) => break,
                        None => {}
                    }
                }
                assert_eq!(
                    phase_starts % technique.phases.len() as u32,
                    0,
                    "{} with duration {duration} cut off mid-cycle",
                    technique.id
                );
            }
        }
    }

    #[test]
    fn pause_freezes_every_counter() {
        let mut session = started(box_technique(), 60);
        session.tick();
        session.tick();

        let before = session.phase();
        assert!(session.toggle_pause());
        for _ in 0..50 {
            assert_eq!(session.tick(), None);
        }
        assert_eq!(session.snapshot().mode, SnapshotMode::Paused);

        assert!(!session.toggle_pause());
        assert_eq!(session.phase(), before);

        // Resuming picks up exactly where the session left off.
        let SessionPhase::Running(run) = session.phase() else {
            panic!("expected running after resume");
        };
        assert_eq!(run.phase_remaining, 2);
        assert_eq!(run.total_remaining, 58);
    }

    #[test]
    fn stop_discards_state_from_any_active_phase() {
        let mut session = Session::new(box_technique(), 60);
        session.start();
        session.stop();
        assert_eq!(session.phase(), SessionPhase::Idle);

        let mut session = started(box_technique(), 60);
        session.toggle_pause();
        session.stop();
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn finish_acknowledges_completion_only() {
        let mut session = started(box_technique(), 16);
        session.finish();
        assert!(session.is_active());

        for _ in 0..16 {
            session.tick();
        }
        assert!(session.is_complete());
        session.finish();
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn project_scale_endpoints_and_purity() {
        // Inhale grows from contracted to expanded.
        assert!((project_scale(PhaseKind::Inhale, 4, 4, PhaseKind::Hold) - 0.8).abs() < 1e-6);
        assert!((project_scale(PhaseKind::Inhale, 4, 0, PhaseKind::Hold) - 1.2).abs() < 1e-6);
        // Exhale is the symmetric inverse.
        assert!((project_scale(PhaseKind::Exhale, 4, 4, PhaseKind::Hold) - 1.2).abs() < 1e-6);
        assert!((project_scale(PhaseKind::Exhale, 4, 0, PhaseKind::Hold) - 0.8).abs() < 1e-6);
        // Hold pins to whatever the previous phase reached.
        assert_eq!(project_scale(PhaseKind::Hold, 7, 3, PhaseKind::Inhale), 1.2);
        assert_eq!(project_scale(PhaseKind::Hold, 7, 3, PhaseKind::Exhale), 0.8);

        for _ in 0..3 {
            let a = project_scale(PhaseKind::Inhale, 5, 2, PhaseKind::Exhale);
            let b = project_scale(PhaseKind::Inhale, 5, 2, PhaseKind::Exhale);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn snapshot_tracks_running_state() {
        let mut session = started(box_technique(), 60);
        session.tick();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.mode, SnapshotMode::Running);
        assert_eq!(snapshot.phase_label, "Inhale");
        assert_eq!(snapshot.phase_seconds_remaining, 3);
        assert_eq!(snapshot.total_seconds_remaining, 59);
        assert!(snapshot.animation_scale > 0.8 && snapshot.animation_scale < 1.2);
    }
}
