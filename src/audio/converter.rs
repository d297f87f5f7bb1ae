//! Sample rate conversion

use crate::audio::AudioBuffer;
use crate::error::{StudioError, Result};

/// Converts a buffer to another sample rate, keeping its channel layout.
pub trait Resampler: Send + Sync {
    fn resample(&self, buffer: &AudioBuffer, target_sample_rate: u32) -> Result<AudioBuffer>;
}

/// Linear-interpolation resampler. Cheap, adequate for speech.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearResampler;

impl Resampler for LinearResampler {
    fn resample(&self, buffer: &AudioBuffer, target_sample_rate: u32) -> Result<AudioBuffer> {
        if target_sample_rate == 0 {
            return Err(StudioError::audio("Target sample rate cannot be 0"));
        }
        if buffer.sample_rate() == target_sample_rate {
            return Ok(buffer.clone());
        }

        let ratio = target_sample_rate as f64 / buffer.sample_rate() as f64;
        let new_length = (buffer.frames() as f64 * ratio).round() as usize;

        let channels: Vec<Vec<f32>> = buffer.channels()?
            .iter()
            .map(|c| Self::resample_channel(c, new_length, ratio))
            .collect();

        AudioBuffer::from_channels(&channels, target_sample_rate)
    }
}

impl LinearResampler {
    fn resample_channel(data: &[f32], new_length: usize, ratio: f64) -> Vec<f32> {
        if data.is_empty() {
            return vec![0.0; new_length];
        }

        let old_length = data.len();
        (0..new_length)
            .map(|i| {
                let old_pos = i as f64 / ratio;
                let old_index = old_pos.floor() as usize;
                let fraction = (old_pos - old_index as f64) as f32;

                if old_index >= old_length - 1 {
                    data[old_length - 1]
                } else {
                    data[old_index] + (data[old_index + 1] - data[old_index]) * fraction
                }
            })
            .collect()
    }
}

/// Fit `data` to exactly `frames` samples, zero-padding or truncating the tail.
pub fn fit_length(mut data: Vec<f32>, frames: usize) -> Vec<f32> {
    data.resize(frames, 0.0);
    data
}
