//! Butterworth high-pass as cascaded second-order sections

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};
use log::warn;
use crate::audio::AudioBuffer;
use crate::error::{StudioError, Result};
use crate::processing::pipeline::{Stage, StageOutput};

/// Lowest cutoff accepted before clamping.
pub const MIN_CUTOFF_HZ: f64 = 1.0;
/// Highest cutoff as a fraction of the sample rate (just under Nyquist).
pub const MAX_CUTOFF_RATIO: f64 = 0.45;

#[derive(Debug, Clone)]
pub struct HighPassFilter {
    cutoff_hz: f32,
    order: usize,
}

impl HighPassFilter {
    /// `order` is rounded to the nearest supported even order (2 or 4).
    pub fn new(cutoff_hz: f32, order: usize) -> Self {
        let order = if order >= 4 { 4 } else { 2 };
        Self { cutoff_hz, order }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Cutoff actually used at `sample_rate`, clamped into `[1 Hz, 0.45 * fs]`.
    pub fn effective_cutoff(&self, sample_rate: u32) -> Result<f64> {
        let max = sample_rate as f64 * MAX_CUTOFF_RATIO;
        if max <= MIN_CUTOFF_HZ {
            return Err(StudioError::stage(format!(
                "Sample rate {} Hz too low for a high-pass filter", sample_rate
            )));
        }

        let requested = self.cutoff_hz as f64;
        let cutoff = if requested.is_finite() { requested.clamp(MIN_CUTOFF_HZ, max) } else { MIN_CUTOFF_HZ };
        if cutoff != requested {
            warn!("High-pass cutoff {} Hz outside (0, {}) at {} Hz; using {:.1} Hz",
                  self.cutoff_hz, sample_rate / 2, sample_rate, cutoff);
        }
        Ok(cutoff)
    }

    /// Q of each second-order section of an order-`order` Butterworth.
    fn section_qs(order: usize) -> Vec<f64> {
        (0..order / 2)
            .map(|k| {
                let theta = std::f64::consts::PI * (2 * k + 1) as f64 / (2 * order) as f64;
                1.0 / (2.0 * theta.cos())
            })
            .collect()
    }

    fn design(&self, sample_rate: u32) -> Result<Vec<Coefficients<f64>>> {
        let cutoff = self.effective_cutoff(sample_rate)?;
        Self::section_qs(self.order)
            .into_iter()
            .map(|q| {
                Coefficients::<f64>::from_params(Type::HighPass, (sample_rate as f64).hz(), cutoff.hz(), q)
                    .map_err(|e| StudioError::stage(format!("High-pass design failed: {:?}", e)))
            })
            .collect()
    }

    pub fn apply(&self, buffer: &AudioBuffer) -> Result<AudioBuffer> {
        if buffer.is_empty() {
            return Ok(buffer.clone());
        }
        let sections = self.design(buffer.sample_rate())?;

        let out = buffer.map_channels(|channel| {
            let mut filters: Vec<DirectForm2Transposed<f64>> =
                sections.iter().map(|c| DirectForm2Transposed::<f64>::new(*c)).collect();

            Ok(channel
                .iter()
                .map(|&x| filters.iter_mut().fold(x as f64, |acc, f| f.run(acc)) as f32)
                .collect())
        })?;

        if !out.is_finite() {
            return Err(StudioError::stage("High-pass produced non-finite samples"));
        }
        Ok(out)
    }
}

impl Stage for HighPassFilter {
    fn name(&self) -> &str {
        "highpass"
    }

    fn process(&self, input: &AudioBuffer) -> Result<StageOutput> {
        self.apply(input).map(StageOutput::processed)
    }
}
