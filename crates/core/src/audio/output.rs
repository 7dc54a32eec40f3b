//! Device output for the cue mixer.
//!
//! `cpal::Stream` is not `Send`, so the stream lives its whole life on a
//! dedicated thread; the rest of the crate talks to it through a small
//! command channel. The data callback renders straight out of the shared
//! [`Mixer`], which is how scheduled cues reach the speaker without the
//! session engine ever waiting on the audio clock.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, unbounded, Sender};

use crate::{BreathworkError, Result};

use super::synth::Mixer;

enum Command {
    Resume,
    Shutdown,
}

/// Handle to the audio-output thread.
pub struct OutputStream {
    control: Sender<Command>,
    sample_rate: u32,
}

impl OutputStream {
    /// Opens the default output device and starts rendering the mixer.
    /// Fails with [`BreathworkError::Audio`] when no usable device exists;
    /// the caller treats that as cosmetic and carries on silently.
    pub fn open(mixer: Arc<Mutex<Mixer>>) -> Result<Self> {
        let (control_tx, control_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);

        std::thread::Builder::new()
            .name("breathwork-audio".to_string())
            .spawn(move || {
                let stream = match build_stream(&mixer) {
                    Ok((stream, sample_rate)) => {
                        let _ = ready_tx.send(Ok(sample_rate));
                        stream
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                loop {
                    match control_rx.recv() {
                        Ok(Command::Resume) => {
                            if let Err(err) = stream.play() {
                                tracing::warn!(%err, "failed to resume audio stream");
                            }
                        }
                        Ok(Command::Shutdown) | Err(_) => break,
                    }
                }
            })
            .map_err(|err| BreathworkError::Audio(err.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(sample_rate)) => Ok(Self {
                control: control_tx,
                sample_rate,
            }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(BreathworkError::Audio(
                "audio thread exited during startup".to_string(),
            )),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Asks the device thread to resume a suspended stream. Fire-and-forget,
    /// so repeated initialisation never blocks tick delivery.
    pub fn resume(&self) {
        let _ = self.control.send(Command::Resume);
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        let _ = self.control.send(Command::Shutdown);
    }
}

impl std::fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStream")
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

fn build_stream(mixer: &Arc<Mutex<Mixer>>) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| BreathworkError::Audio("no default output device".to_string()))?;
    let config = device
        .default_output_config()
        .map_err(|err| BreathworkError::Audio(err.to_string()))?;

    if config.sample_format() != cpal::SampleFormat::F32 {
        return Err(BreathworkError::Audio(format!(
            "unsupported output sample format {:?}",
            config.sample_format()
        )));
    }

    let channels = config.channels().max(1) as usize;
    let sample_rate = config.sample_rate().0;
    if let Ok(mut mixer) = mixer.lock() {
        mixer.set_sample_rate(sample_rate);
    }

    let shared = mixer.clone();
    let mut mono: Vec<f32> = Vec::new();
    let stream = device
        .build_output_stream(
            &config.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                mono.resize(frames, 0.0);
                match shared.lock() {
                    Ok(mut mixer) => mixer.render(&mut mono),
                    Err(_) => mono.fill(0.0),
                }
                for (frame, sample) in data.chunks_mut(channels).zip(&mono) {
                    frame.fill(*sample);
                }
            },
            |err| tracing::warn!(%err, "audio output stream error"),
            None,
        )
        .map_err(|err| BreathworkError::Audio(err.to_string()))?;

    stream
        .play()
        .map_err(|err| BreathworkError::Audio(err.to_string()))?;

    Ok((stream, sample_rate))
}
