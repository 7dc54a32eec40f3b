//! Pure synthesis model for the cue subsystem.
//!
//! Every scheduled sound is a plain value carrying its own envelope and
//! absolute end time on the mixer's sample clock. "Silence everything" is
//! therefore just dropping the not-yet-expired values; there is no node
//! graph to unpick. Nothing in this module touches an audio device, so the
//! whole model renders deterministically under test.

use std::f64::consts::{PI, TAU};

/// Gain the exponential release decays to at the end of a tone.
const RELEASE_FLOOR: f32 = 0.01;

/// Seconds the ambient layer takes to fade in from silence.
pub const AMBIENT_FADE_IN: f64 = 5.0;

/// Seconds the ambient layer takes to fade back out when stopped.
pub const AMBIENT_FADE_OUT: f64 = 2.0;

/// Nominal master volume when unmuted.
pub const MASTER_VOLUME: f32 = 0.5;

/// Time constant of the master-gain smoothing ramp. Mute and unmute slide
/// the gain along this curve rather than cutting it, so they never click.
const MASTER_RAMP_TAU: f64 = 0.1;

/// Upper bound on simultaneously scheduled tones. Only reachable when the
/// clock is frozen (no device rendering); oldest tones are dropped first.
const MAX_TONES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
}

impl Waveform {
    fn value(self, phase: f64) -> f32 {
        match self {
            Waveform::Sine => phase.sin() as f32,
            Waveform::Triangle => ((2.0 / PI) * phase.sin().asin()) as f32,
        }
    }
}

/// One enveloped tone: linear attack to `peak`, then an exponential release
/// down to [`RELEASE_FLOOR`] at its absolute end time.
#[derive(Debug, Clone, Copy)]
pub struct Tone {
    pub freq_hz: f32,
    pub start: f64,
    pub duration: f64,
    pub attack: f64,
    pub peak: f32,
    pub waveform: Waveform,
}

impl Tone {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    pub fn expired(&self, now: f64) -> bool {
        now >= self.end()
    }

    /// Envelope gain at an absolute mixer time.
    pub fn gain_at(&self, now: f64) -> f32 {
        let t = now - self.start;
        if t < 0.0 || t >= self.duration || self.peak <= 0.0 {
            return 0.0;
        }
        if t < self.attack {
            return self.peak * (t / self.attack) as f32;
        }
        let span = (self.duration - self.attack).max(f64::EPSILON);
        let pos = (t - self.attack) / span;
        let ratio = (RELEASE_FLOOR / self.peak).min(1.0);
        self.peak * ratio.powf(pos as f32)
    }

    pub fn sample(&self, now: f64) -> f32 {
        let gain = self.gain_at(now);
        if gain == 0.0 {
            return 0.0;
        }
        gain * self.waveform.value(TAU * self.freq_hz as f64 * (now - self.start))
    }
}

/// One oscillator of the ambient drone, with its own slow amplitude LFO.
#[derive(Debug, Clone, Copy)]
pub struct AmbientVoice {
    pub freq_hz: f32,
    pub volume: f32,
    pub lfo_hz: f64,
    pub lfo_depth: f32,
    pub waveform: Waveform,
    started: f64,
    fade_out_from: Option<f64>,
}

impl AmbientVoice {
    fn new(freq_hz: f32, volume: f32, lfo_hz: f64, waveform: Waveform, started: f64) -> Self {
        Self {
            freq_hz,
            volume,
            lfo_hz,
            lfo_depth: 0.3,
            waveform,
            started,
            fade_out_from: None,
        }
    }

    fn gain_at(&self, now: f64) -> f32 {
        let t = now - self.started;
        if t < 0.0 {
            return 0.0;
        }
        let fade_in = (t / AMBIENT_FADE_IN).min(1.0) as f32;
        let fade_out = match self.fade_out_from {
            Some(from) => (1.0 - (now - from) / AMBIENT_FADE_OUT).clamp(0.0, 1.0) as f32,
            None => 1.0,
        };
        let lfo = 1.0 + self.lfo_depth * (TAU * self.lfo_hz * now).sin() as f32;
        (self.volume * fade_in * fade_out * lfo).max(0.0)
    }

    fn sample(&self, now: f64) -> f32 {
        let gain = self.gain_at(now);
        if gain == 0.0 {
            return 0.0;
        }
        gain * self.waveform.value(TAU * self.freq_hz as f64 * (now - self.started))
    }

    fn expired(&self, now: f64) -> bool {
        matches!(self.fade_out_from, Some(from) if now >= from + AMBIENT_FADE_OUT)
    }
}

/// The sustained background drone: three detuned oscillators around F#3
/// with a perfect fifth on top. One layer is created per `start`, fades in
/// over several seconds and is always faded out before being discarded.
#[derive(Debug, Clone)]
pub struct AmbientLayer {
    voices: Vec<AmbientVoice>,
}

impl AmbientLayer {
    pub fn new(now: f64) -> Self {
        Self {
            voices: vec![
                AmbientVoice::new(185.0, 0.1, 0.10, Waveform::Sine, now),
                AmbientVoice::new(186.5, 0.1, 0.15, Waveform::Sine, now),
                AmbientVoice::new(277.18, 0.05, 0.20, Waveform::Triangle, now),
            ],
        }
    }

    pub fn begin_fade_out(&mut self, now: f64) {
        for voice in &mut self.voices {
            if voice.fade_out_from.is_none() {
                voice.fade_out_from = Some(now);
            }
        }
    }

    pub fn is_fading_out(&self) -> bool {
        self.voices
            .iter()
            .all(|voice| voice.fade_out_from.is_some())
    }

    fn sample(&self, now: f64) -> f32 {
        self.voices.iter().map(|voice| voice.sample(now)).sum()
    }

    fn expired(&self, now: f64) -> bool {
        self.voices.iter().all(|voice| voice.expired(now))
    }
}

/// Owns every live sound source plus the master gain, and renders them
/// against a sample-accurate clock. The mixer is the single place mute
/// state takes effect; callers only ever move the master-gain target.
#[derive(Debug)]
pub struct Mixer {
    sample_rate: u32,
    rendered_samples: u64,
    master: f32,
    master_target: f32,
    ramp_alpha: f32,
    muted: bool,
    ambient_engaged: bool,
    tones: Vec<Tone>,
    ambient: Vec<AmbientLayer>,
}

impl Mixer {
    pub fn new(sample_rate: u32) -> Self {
        let mut mixer = Self {
            sample_rate: 0,
            rendered_samples: 0,
            master: MASTER_VOLUME,
            master_target: MASTER_VOLUME,
            ramp_alpha: 0.0,
            muted: false,
            ambient_engaged: false,
            tones: Vec::new(),
            ambient: Vec::new(),
        };
        mixer.set_sample_rate(sample_rate);
        mixer
    }

    /// Reconfigures the clock for the actual device rate. Only meaningful
    /// before rendering starts.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        let sample_rate = sample_rate.max(1);
        self.sample_rate = sample_rate;
        self.ramp_alpha = (1.0 - (-1.0 / (MASTER_RAMP_TAU * f64::from(sample_rate))).exp()) as f32;
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Current position of the audio clock in seconds.
    pub fn now(&self) -> f64 {
        self.rendered_samples as f64 / f64::from(self.sample_rate)
    }

    pub fn schedule(&mut self, tone: Tone) {
        if self.tones.len() >= MAX_TONES {
            self.tones.remove(0);
        }
        self.tones.push(tone);
    }

    /// The mixer's master gain is the single source of truth for mute
    /// state. Muting slides the gain target to zero; the audible level
    /// follows along the smoothing ramp during rendering.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.set_master_target(if muted { 0.0 } else { MASTER_VOLUME });
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    fn set_master_target(&mut self, target: f32) {
        self.master_target = target.clamp(0.0, 1.0);
    }

    pub fn master_target(&self) -> f32 {
        self.master_target
    }

    pub fn master_level(&self) -> f32 {
        self.master
    }

    pub fn active_tones(&self) -> usize {
        self.tones.len()
    }

    pub fn ambient_layers(&self) -> usize {
        self.ambient.len()
    }

    pub fn has_live_ambient(&self) -> bool {
        self.ambient.iter().any(|layer| !layer.is_fading_out())
    }

    /// Records that the ambient drone should be playing and, unless muted,
    /// creates the layer. The intent outlives a mute cycle so unmuting can
    /// recreate the drone.
    pub fn engage_ambient(&mut self) {
        self.ambient_engaged = true;
        if !self.muted {
            self.start_ambient();
        }
    }

    /// Forgets the ambient intent and fades any live layer out.
    pub fn disengage_ambient(&mut self) {
        self.ambient_engaged = false;
        self.stop_ambient();
    }

    pub fn ambient_engaged(&self) -> bool {
        self.ambient_engaged
    }

    /// Starts a fresh ambient layer, fading out any existing one first so
    /// no oscillator is ever abandoned at full volume.
    pub fn start_ambient(&mut self) {
        let now = self.now();
        for layer in &mut self.ambient {
            layer.begin_fade_out(now);
        }
        self.ambient.push(AmbientLayer::new(now));
    }

    pub fn stop_ambient(&mut self) {
        let now = self.now();
        for layer in &mut self.ambient {
            layer.begin_fade_out(now);
        }
    }

    /// Cancels every not-yet-expired tone and fades the ambient layer. Used
    /// at teardown; ordinary stops let scheduled tones ring out.
    pub fn cancel_pending(&mut self) {
        self.tones.clear();
        self.disengage_ambient();
    }

    /// Renders mono samples into `out`, advancing the clock and pruning
    /// sources that have fully expired.
    pub fn render(&mut self, out: &mut [f32]) {
        for slot in out.iter_mut() {
            let now = self.rendered_samples as f64 / f64::from(self.sample_rate);
            let mut mix = 0.0f32;
            for tone in &self.tones {
                mix += tone.sample(now);
            }
            for layer in &self.ambient {
                mix += layer.sample(now);
            }
            self.master += (self.master_target - self.master) * self.ramp_alpha;
            *slot = (mix * self.master).clamp(-1.0, 1.0);
            self.rendered_samples += 1;
        }

        let now = self.now();
        self.tones.retain(|tone| !tone.expired(now));
        self.ambient.retain(|layer| !layer.expired(now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(start: f64) -> Tone {
        Tone {
            freq_hz: 432.0,
            start,
            duration: 2.5,
            attack: 0.1,
            peak: 0.6,
            waveform: Waveform::Sine,
        }
    }

    #[test]
    fn tone_envelope_has_attack_and_exponential_tail() {
        let tone = tone(1.0);
        assert_eq!(tone.gain_at(0.5), 0.0);
        assert!((tone.gain_at(1.05) - 0.3).abs() < 1e-3, "mid-attack is linear");
        assert!((tone.gain_at(1.1) - 0.6).abs() < 1e-3, "attack peaks on time");

        // Past the attack the envelope decays monotonically to the floor.
        let mid = tone.gain_at(2.0);
        let late = tone.gain_at(3.3);
        assert!(mid < 0.6 && late < mid);
        assert!(late >= 0.005);
        assert_eq!(tone.gain_at(3.5), 0.0);
        assert!(tone.expired(3.5));
    }

    #[test]
    fn render_advances_clock_and_prunes_expired_tones() {
        let mut mixer = Mixer::new(1_000);
        mixer.schedule(tone(0.0));
        assert_eq!(mixer.active_tones(), 1);

        let mut out = vec![0.0; 1_000];
        mixer.render(&mut out);
        assert!((mixer.now() - 1.0).abs() < 1e-9);
        assert!(out.iter().any(|sample| sample.abs() > 0.01), "tone is audible");
        assert_eq!(mixer.active_tones(), 1);

        mixer.render(&mut out);
        mixer.render(&mut out);
        assert_eq!(mixer.active_tones(), 0, "expired tone was pruned");
    }

    #[test]
    fn master_ramp_never_cuts_instantly() {
        let mut mixer = Mixer::new(1_000);
        mixer.schedule(Tone {
            duration: 60.0,
            ..tone(0.0)
        });
        let mut out = vec![0.0; 200];
        mixer.render(&mut out);

        mixer.set_muted(true);
        let mut out = vec![0.0; 20];
        mixer.render(&mut out);
        // 20 ms into the ramp the gain is reduced but clearly not silent.
        assert!(mixer.master_level() > 0.1);
        assert!(mixer.master_level() < MASTER_VOLUME);

        let mut out = vec![0.0; 1_000];
        mixer.render(&mut out);
        assert!(mixer.master_level() < 1e-3, "ramp converges to silence");
        assert!(out[out.len() - 1].abs() < 1e-3);
    }

    #[test]
    fn ambient_layer_fades_out_and_is_pruned() {
        let mut mixer = Mixer::new(1_000);
        mixer.start_ambient();
        assert!(mixer.has_live_ambient());

        let mut out = vec![0.0; 1_000];
        mixer.render(&mut out);
        mixer.stop_ambient();
        assert!(!mixer.has_live_ambient());

        // After the fade window no voice may remain.
        let mut out = vec![0.0; (AMBIENT_FADE_OUT * 1_000.0) as usize + 100];
        mixer.render(&mut out);
        assert_eq!(mixer.ambient_layers(), 0);
        assert!(out[out.len() - 1].abs() < 1e-6);
    }

    #[test]
    fn restarting_ambient_fades_the_previous_layer() {
        let mut mixer = Mixer::new(1_000);
        mixer.start_ambient();
        let mut out = vec![0.0; 500];
        mixer.render(&mut out);

        mixer.start_ambient();
        assert_eq!(mixer.ambient_layers(), 2);
        assert!(mixer.has_live_ambient());

        let mut out = vec![0.0; (AMBIENT_FADE_OUT * 1_000.0) as usize + 100];
        mixer.render(&mut out);
        assert_eq!(mixer.ambient_layers(), 1, "only the new layer survives");
    }

    #[test]
    fn frozen_clock_cannot_accumulate_tones_without_bound() {
        let mut mixer = Mixer::new(48_000);
        for i in 0..200 {
            mixer.schedule(tone(i as f64));
        }
        assert!(mixer.active_tones() <= 64);
    }
}
