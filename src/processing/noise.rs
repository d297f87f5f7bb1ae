//! Spectral gating noise reduction
//!
//! A noise magnitude profile is taken from the leading part of the signal
//! (speech recordings almost always start with a moment of room tone) and
//! every STFT bin is pulled down toward that floor.

use std::sync::Arc;
use log::{debug, warn};
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use crate::audio::AudioBuffer;
use crate::error::{StudioError, Result};
use crate::processing::pipeline::{Stage, StageOutput};

pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const DEFAULT_NOISE_WINDOW_SECS: f32 = 0.5;

/// Gain applied to a bin at full strength when it is pure noise (~ -26 dB).
const MIN_GAIN: f32 = 0.05;
/// Noise profiles with less total magnitude than this are treated as digital silence.
const SILENT_PROFILE: f32 = 1e-9;

pub struct NoiseReducer {
    strength: f32,
    fft_size: usize,
    hop_size: usize,
    noise_window_secs: f32,
    forward_fft: Arc<dyn RealToComplex<f32>>,
    inverse_fft: Arc<dyn ComplexToReal<f32>>,
    window: Vec<f32>,
}

impl std::fmt::Debug for NoiseReducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseReducer")
            .field("strength", &self.strength)
            .field("fft_size", &self.fft_size)
            .field("hop_size", &self.hop_size)
            .finish()
    }
}

impl NoiseReducer {
    pub fn new(strength: f32) -> Self {
        Self::with_fft_size(strength, DEFAULT_FFT_SIZE)
    }

    /// `fft_size` is rounded up to an even number of at least 16.
    pub fn with_fft_size(strength: f32, fft_size: usize) -> Self {
        let strength = if strength.is_finite() { strength } else { 0.0 };
        let clamped = strength.clamp(0.0, 1.0);
        if clamped != strength {
            warn!("Noise reduction strength {} clamped to {}", strength, clamped);
        }

        let fft_size = (fft_size.max(16) + 1) & !1;
        let hop_size = fft_size / 4;

        let mut planner = RealFftPlanner::<f32>::new();
        let forward_fft = planner.plan_fft_forward(fft_size);
        let inverse_fft = planner.plan_fft_inverse(fft_size);

        // Periodic Hann window
        let window = (0..fft_size)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / fft_size as f32).cos()))
            .collect();

        Self {
            strength: clamped,
            fft_size,
            hop_size,
            noise_window_secs: DEFAULT_NOISE_WINDOW_SECS,
            forward_fft,
            inverse_fft,
            window,
        }
    }

    pub fn strength(&self) -> f32 {
        self.strength
    }

    /// Reduce noise in every channel.
    ///
    /// Too-short buffers and zero strength pass through untouched. Channels
    /// are independent: one that cannot be processed (digital silence, numerical
    /// trouble) is passed through as-is while the others are still cleaned. The
    /// degradation flag is only set when no channel could be processed.
    pub fn reduce(&self, buffer: &AudioBuffer) -> StageOutput {
        if self.strength == 0.0 || buffer.frames() < self.fft_size {
            return StageOutput::processed(buffer.clone());
        }

        let channels = match buffer.channels() {
            Ok(channels) => channels,
            Err(e) => return StageOutput::degraded(buffer, e.to_string()),
        };

        let sample_rate = buffer.sample_rate();
        let mut failures = Vec::new();
        let processed: Vec<Vec<f32>> = channels
            .into_iter()
            .enumerate()
            .map(|(index, channel)| match self.reduce_channel(&channel, sample_rate) {
                Ok(out) if out.len() == channel.len() => out,
                Ok(out) => {
                    failures.push(format!(
                        "channel {}: {} samples out, expected {}", index, out.len(), channel.len()
                    ));
                    channel
                }
                Err(e) => {
                    debug!("Noise reduction left channel {} untouched: {}", index, e);
                    failures.push(format!("channel {}: {}", index, e));
                    channel
                }
            })
            .collect();

        if failures.len() == processed.len() {
            return StageOutput::degraded(buffer, failures.join("; "));
        }
        if !failures.is_empty() {
            warn!("Noise reduction skipped {}", failures.join("; "));
        }

        match AudioBuffer::from_channels(&processed, sample_rate) {
            Ok(out) => StageOutput::processed(out),
            Err(e) => StageOutput::degraded(buffer, e.to_string()),
        }
    }

    fn reduce_channel(&self, signal: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
        let noise = self.estimate_noise_profile(signal, sample_rate)?;

        let n = signal.len();
        let pad = self.fft_size;
        let body = n + 2 * pad;
        let frames = (body - self.fft_size).div_ceil(self.hop_size) + 1;
        let total = (frames - 1) * self.hop_size + self.fft_size;

        let mut padded = vec![0.0f32; total];
        padded[pad..pad + n].copy_from_slice(signal);

        let mut output = vec![0.0f32; total];
        let mut window_sum = vec![0.0f32; total];

        let floor_gain = 1.0 - self.strength * (1.0 - MIN_GAIN);
        let norm = 1.0 / self.fft_size as f32;

        let mut frame = self.forward_fft.make_input_vec();
        let mut spectrum = self.forward_fft.make_output_vec();
        let mut time = self.inverse_fft.make_output_vec();
        let last_bin = spectrum.len() - 1;

        for start in (0..frames).map(|f| f * self.hop_size) {
            for (i, slot) in frame.iter_mut().enumerate() {
                *slot = padded[start + i] * self.window[i];
            }

            self.forward_fft
                .process(&mut frame, &mut spectrum)
                .map_err(|e| StudioError::stage(format!("forward FFT failed: {}", e)))?;

            for (bin, noise_mag) in spectrum.iter_mut().zip(&noise) {
                let mag = bin.norm();
                let gain = if mag > 0.0 {
                    (1.0 - self.strength * noise_mag / mag).max(floor_gain)
                } else {
                    floor_gain
                };
                *bin *= gain;
            }
            spectrum[0].im = 0.0;
            spectrum[last_bin].im = 0.0;

            self.inverse_fft
                .process(&mut spectrum, &mut time)
                .map_err(|e| StudioError::stage(format!("inverse FFT failed: {}", e)))?;

            for (i, &sample) in time.iter().enumerate() {
                output[start + i] += sample * norm * self.window[i];
                window_sum[start + i] += self.window[i] * self.window[i];
            }
        }

        let result: Vec<f32> = (pad..pad + n)
            .map(|j| if window_sum[j] > 1e-6 { output[j] / window_sum[j] } else { 0.0 })
            .collect();

        if result.iter().any(|s| !s.is_finite()) {
            return Err(StudioError::stage("noise reduction produced non-finite samples"));
        }
        Ok(result)
    }

    /// Mean magnitude spectrum over the leading noise window.
    fn estimate_noise_profile(&self, signal: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
        let window_len = (self.noise_window_secs * sample_rate as f32).round() as usize;
        let noise_len = window_len.clamp(self.fft_size, signal.len());

        let mut profile = vec![0.0f32; self.fft_size / 2 + 1];
        let mut frame = self.forward_fft.make_input_vec();
        let mut spectrum = self.forward_fft.make_output_vec();
        let mut frame_count = 0usize;

        let mut pos = 0;
        while pos + self.fft_size <= noise_len {
            for (i, slot) in frame.iter_mut().enumerate() {
                *slot = signal[pos + i] * self.window[i];
            }
            self.forward_fft
                .process(&mut frame, &mut spectrum)
                .map_err(|e| StudioError::stage(format!("forward FFT failed: {}", e)))?;

            for (acc, c) in profile.iter_mut().zip(&spectrum) {
                *acc += c.norm();
            }
            frame_count += 1;
            pos += self.hop_size;
        }

        if frame_count == 0 {
            return Err(StudioError::stage("noise window shorter than one analysis frame"));
        }
        for value in profile.iter_mut() {
            *value /= frame_count as f32;
        }

        let total: f32 = profile.iter().sum();
        if !total.is_finite() {
            return Err(StudioError::stage("noise profile is not finite"));
        }
        if total < SILENT_PROFILE {
            return Err(StudioError::stage("noise profile is silent; nothing to gate against"));
        }
        Ok(profile)
    }
}

impl Stage for NoiseReducer {
    fn name(&self) -> &str {
        "noise_reduction"
    }

    fn process(&self, input: &AudioBuffer) -> Result<StageOutput> {
        Ok(self.reduce(input))
    }
}
