use std::sync::{Arc, Mutex};

use crate::catalog::PhaseKind;

mod output;
pub mod synth;

pub use output::OutputStream;
pub use synth::{Mixer, Tone, Waveform, MASTER_VOLUME};

// Cue frequency table, "singing bowl" register. The exact pitches are
// cosmetic; the triggering and envelope contract is what matters.
const INHALE_HZ: f32 = 432.0;
const EXHALE_HZ: f32 = 324.0;
const HOLD_HZ: f32 = 540.0;
const OVERTONE_RATIO: f32 = 1.5;

const PHASE_TONE_SECONDS: f64 = 2.5;
const HOLD_TONE_SECONDS: f64 = 1.0;
const ATTACK_SECONDS: f64 = 0.1;
const TONE_PEAK: f32 = 0.6;
const OVERTONE_PEAK: f32 = 0.2;

const COMPLETE_NOTES: [f32; 3] = [432.0, 540.0, 648.0];
const COMPLETE_STAGGER: f64 = 0.1;
const COMPLETE_SECONDS: f64 = 4.0;
const COMPLETE_PEAK: f32 = 0.3;

const DEFAULT_SAMPLE_RATE: u32 = 48_000;

#[derive(Debug)]
enum Output {
    /// No user gesture yet; host platforms forbid sound before one, so
    /// every cue call is a no-op until `initialize` runs.
    Uninitialized,
    /// Graph allocated without a device, for tests and headless hosts.
    Detached,
    Active(OutputStream),
    /// Device open failed. Cues still schedule into the mixer but nothing
    /// renders them; session timing is unaffected.
    Silent,
}

/// Maps phase-transition and completion events to synthesized tones.
///
/// All scheduling is "schedule ahead" against the mixer's own clock: a cue
/// call only appends tone values under a short lock and returns, so the
/// session tick never waits on audio. The player is shared between the
/// session runner and the UI mute toggle, hence `&self` everywhere.
#[derive(Debug)]
pub struct CuePlayer {
    mixer: Arc<Mutex<Mixer>>,
    output: Mutex<Output>,
}

impl CuePlayer {
    pub fn new() -> Self {
        Self {
            mixer: Arc::new(Mutex::new(Mixer::new(DEFAULT_SAMPLE_RATE))),
            output: Mutex::new(Output::Uninitialized),
        }
    }

    /// Creates a player whose graph is allocated but not connected to any
    /// device. Cues behave normally and can be inspected or rendered by
    /// hand, which is how the synthesis path is tested.
    pub fn detached() -> Self {
        Self {
            mixer: Arc::new(Mutex::new(Mixer::new(DEFAULT_SAMPLE_RATE))),
            output: Mutex::new(Output::Detached),
        }
    }

    /// Lazily allocates the output stream, or resumes it when already
    /// allocated. Idempotent and safe to call on every session start; a
    /// missing or broken device downgrades the player to silent no-ops.
    pub fn initialize(&self) {
        let Ok(mut output) = self.output.lock() else {
            return;
        };
        match &*output {
            Output::Uninitialized => match OutputStream::open(self.mixer.clone()) {
                Ok(stream) => {
                    tracing::debug!(sample_rate = stream.sample_rate(), "audio output ready");
                    *output = Output::Active(stream);
                }
                Err(err) => {
                    tracing::warn!(%err, "audio unavailable; cues will be silent");
                    *output = Output::Silent;
                }
            },
            Output::Active(stream) => stream.resume(),
            Output::Detached | Output::Silent => {}
        }
    }

    /// True once `initialize` has run (or the player was built detached),
    /// regardless of whether a device could actually be opened.
    pub fn initialized(&self) -> bool {
        self.output
            .lock()
            .map(|output| !matches!(&*output, Output::Uninitialized))
            .unwrap_or(false)
    }

    pub fn is_muted(&self) -> bool {
        self.mixer
            .lock()
            .map(|mixer| mixer.is_muted())
            .unwrap_or(false)
    }

    /// Sets the mute state and returns the new value. Output is silenced
    /// via the mixer's gain ramp, never an instant cut; unmuting restores
    /// the nominal volume and recreates the ambient layer if one was
    /// active before the mute.
    pub fn set_muted(&self, muted: bool) -> bool {
        let Ok(mut mixer) = self.mixer.lock() else {
            return muted;
        };
        mixer.set_muted(muted);
        if muted {
            mixer.stop_ambient();
        } else if mixer.ambient_engaged() {
            mixer.start_ambient();
        }
        muted
    }

    /// Schedules the enveloped tone for a phase start. No-op while muted
    /// or before initialization.
    pub fn cue_for_phase(&self, kind: PhaseKind) {
        if !self.initialized() {
            return;
        }
        let Ok(mut mixer) = self.mixer.lock() else {
            return;
        };
        if mixer.is_muted() {
            return;
        }

        let now = mixer.now();
        let (freq, duration) = match kind {
            PhaseKind::Inhale => (INHALE_HZ, PHASE_TONE_SECONDS),
            PhaseKind::Exhale => (EXHALE_HZ, PHASE_TONE_SECONDS),
            PhaseKind::Hold => (HOLD_HZ, HOLD_TONE_SECONDS),
        };

        mixer.schedule(Tone {
            freq_hz: freq,
            start: now,
            duration,
            attack: ATTACK_SECONDS,
            peak: TONE_PEAK,
            waveform: Waveform::Sine,
        });

        // A quieter fifth above gives inhale/exhale some body; the short
        // hold tone stays plain.
        if kind != PhaseKind::Hold {
            mixer.schedule(Tone {
                freq_hz: freq * OVERTONE_RATIO,
                start: now,
                duration: duration - 0.5,
                attack: ATTACK_SECONDS,
                peak: OVERTONE_PEAK,
                waveform: Waveform::Sine,
            });
        }
    }

    /// Schedules the session-complete chord: an ascending triad with
    /// staggered onsets and long individual releases.
    pub fn cue_complete(&self) {
        if !self.initialized() {
            return;
        }
        let Ok(mut mixer) = self.mixer.lock() else {
            return;
        };
        if mixer.is_muted() {
            return;
        }

        let now = mixer.now();
        for (index, freq) in COMPLETE_NOTES.into_iter().enumerate() {
            mixer.schedule(Tone {
                freq_hz: freq,
                start: now + index as f64 * COMPLETE_STAGGER,
                duration: COMPLETE_SECONDS,
                attack: ATTACK_SECONDS,
                peak: COMPLETE_PEAK,
                waveform: Waveform::Sine,
            });
        }
    }

    /// Starts the ambient background drone. At most one layer is started
    /// per session; while muted, only the intent is recorded and the layer
    /// is created when the player is unmuted.
    pub fn start_ambient(&self) {
        if !self.initialized() {
            return;
        }
        let Ok(mut mixer) = self.mixer.lock() else {
            return;
        };
        if mixer.ambient_engaged() {
            return;
        }
        mixer.engage_ambient();
    }

    /// Fades the ambient layer out and forgets that it was started; the
    /// next session may start it afresh.
    pub fn reset_ambient(&self) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.disengage_ambient();
        }
    }

    /// Stops the output thread and cancels everything still scheduled.
    pub fn teardown(&self) {
        if let Ok(mut output) = self.output.lock() {
            *output = Output::Uninitialized;
        }
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.cancel_pending();
        }
    }

    #[cfg(test)]
    pub(crate) fn mixer(&self) -> Arc<Mutex<Mixer>> {
        self.mixer.clone()
    }
}

impl Default for CuePlayer {
    fn default() -> Self {
        Self::new()
    }
}
