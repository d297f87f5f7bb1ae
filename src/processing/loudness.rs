//! RMS loudness normalization with a peak safety ceiling

use log::debug;
use crate::audio::AudioBuffer;
use crate::error::{StudioError, Result};
use crate::processing::pipeline::{Stage, StageOutput};

/// No output sample may exceed this magnitude.
pub const PEAK_CEILING: f32 = 0.999;
/// Buffers quieter than this RMS are left alone.
pub const SILENCE_RMS: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct LoudnessNormalizer {
    target_db: f32,
}

impl LoudnessNormalizer {
    pub fn new(target_db: f32) -> Self {
        Self { target_db }
    }

    pub fn target_db(&self) -> f32 {
        self.target_db
    }

    pub fn normalize(&self, buffer: &AudioBuffer) -> Result<AudioBuffer> {
        if !self.target_db.is_finite() {
            return Err(StudioError::stage(format!("Invalid loudness target: {} dB", self.target_db)));
        }

        let rms = buffer.rms();
        if rms < SILENCE_RMS {
            debug!("Loudness: near-silent input (RMS={:.3e}), left unchanged", rms);
            return Ok(buffer.clone());
        }

        let target = 10f64.powf(self.target_db as f64 / 20.0);
        let mut gain = target / rms;

        let peak = buffer.peak() as f64 * gain;
        if peak > PEAK_CEILING as f64 {
            let limited = gain * PEAK_CEILING as f64 / peak;
            debug!("Loudness: peak {:.3} would exceed ceiling, gain {:.2} -> {:.2}", peak, gain, limited);
            gain = limited;
        }

        // The clamp only absorbs f32 rounding; the gain above already keeps peaks in range.
        let samples = buffer
            .samples()
            .iter()
            .map(|&s| ((s as f64 * gain) as f32).clamp(-PEAK_CEILING, PEAK_CEILING))
            .collect();
        buffer.with_samples(samples)
    }
}

impl Stage for LoudnessNormalizer {
    fn name(&self) -> &str {
        "loudness"
    }

    fn process(&self, input: &AudioBuffer) -> Result<StageOutput> {
        self.normalize(input).map(StageOutput::processed)
    }
}
