//! High-shelf presence boost in the frequency domain

use realfft::RealFftPlanner;
use crate::audio::AudioBuffer;
use crate::error::{StudioError, Result};
use crate::processing::pipeline::{Stage, StageOutput};

/// Frequency where the shelf ramp starts.
pub const PRESENCE_START_HZ: f64 = 2000.0;

#[derive(Debug, Clone)]
pub struct PresenceBoost {
    gain_db: f32,
}

impl PresenceBoost {
    pub fn new(gain_db: f32) -> Self {
        Self { gain_db }
    }

    /// Ramp linearly from unity at 2 kHz to `10^(gain_db/20)` at Nyquist.
    ///
    /// A zero gain returns an exact copy of the input without touching the FFT.
    pub fn apply(&self, buffer: &AudioBuffer) -> Result<AudioBuffer> {
        if self.gain_db == 0.0 {
            return Ok(buffer.clone());
        }
        if !self.gain_db.is_finite() {
            return Err(StudioError::stage(format!("Invalid presence gain: {} dB", self.gain_db)));
        }

        let nyquist = buffer.sample_rate() as f64 / 2.0;
        if nyquist <= PRESENCE_START_HZ || buffer.frames() < 2 {
            return Ok(buffer.clone());
        }

        let boost = 10f64.powf(self.gain_db as f64 / 20.0);
        let sample_rate = buffer.sample_rate() as f64;
        let mut planner = RealFftPlanner::<f64>::new();

        buffer.map_channels(|channel| {
            let n = channel.len();
            let forward = planner.plan_fft_forward(n);
            let inverse = planner.plan_fft_inverse(n);

            let mut time: Vec<f64> = channel.iter().map(|&s| s as f64).collect();
            let mut spectrum = forward.make_output_vec();
            forward
                .process(&mut time, &mut spectrum)
                .map_err(|e| StudioError::stage(format!("forward FFT failed: {}", e)))?;

            for (k, bin) in spectrum.iter_mut().enumerate() {
                let freq = k as f64 * sample_rate / n as f64;
                let mask = ((freq - PRESENCE_START_HZ) / (nyquist - PRESENCE_START_HZ)).clamp(0.0, 1.0);
                *bin *= 1.0 + (boost - 1.0) * mask;
            }
            spectrum[0].im = 0.0;
            if n % 2 == 0 {
                if let Some(last) = spectrum.last_mut() {
                    last.im = 0.0;
                }
            }

            let mut out = inverse.make_output_vec();
            inverse
                .process(&mut spectrum, &mut out)
                .map_err(|e| StudioError::stage(format!("inverse FFT failed: {}", e)))?;

            let scale = 1.0 / n as f64;
            Ok(out.into_iter().map(|s| (s * scale) as f32).collect())
        })
    }
}

impl Stage for PresenceBoost {
    fn name(&self) -> &str {
        "presence_boost"
    }

    fn process(&self, input: &AudioBuffer) -> Result<StageOutput> {
        self.apply(input).map(StageOutput::processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, sample_rate: u32, len: usize) -> AudioBuffer {
        let samples = (0..len)
            .map(|i| (0.25 * (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate as f64).sin()) as f32)
            .collect();
        AudioBuffer::mono(samples, sample_rate).unwrap()
    }

    #[test]
    fn test_zero_gain_is_exact_identity() {
        let input = sine(3000.0, 44100, 4411);
        let out = PresenceBoost::new(0.0).apply(&input).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_low_frequencies_untouched() {
        // 500 Hz sits below the shelf; 1 s keeps it bin-centred.
        let input = sine(500.0, 16000, 16000);
        let out = PresenceBoost::new(6.0).apply(&input).unwrap();
        for (a, b) in out.samples().iter().zip(input.samples()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_high_frequencies_boosted() {
        // Halfway between 2 kHz and Nyquist gets half the linear boost.
        let input = sine(5000.0, 16000, 16000);
        let out = PresenceBoost::new(6.0).apply(&input).unwrap();
        let expected = 1.0 + (10f64.powf(6.0 / 20.0) - 1.0) * 0.5;
        let ratio = out.rms() / input.rms();
        assert!((ratio - expected).abs() < 1e-3, "ratio={} expected={}", ratio, expected);
    }

    #[test]
    fn test_odd_length_preserved() {
        let input = AudioBuffer::new(sine(4000.0, 22050, 2001).samples().repeat(2), 22050, 2).unwrap();
        let out = PresenceBoost::new(3.0).apply(&input).unwrap();
        assert_eq!(out.len(), input.len());
        assert_eq!(out.channel_count(), 2);
    }

    #[test]
    fn test_low_sample_rate_is_passthrough() {
        let input = sine(500.0, 4000, 400);
        assert_eq!(PresenceBoost::new(8.0).apply(&input).unwrap(), input);
    }
}
