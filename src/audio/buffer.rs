//! In-memory PCM buffer shared by every enhancement stage

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use crate::error::{StudioError, Result};

/// Interleaved floating-point PCM.
///
/// Fields are private: once built, a buffer is never mutated. Stages produce
/// new buffers through [`AudioBuffer::with_samples`] or
/// [`AudioBuffer::from_channels`].
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channel_count: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channel_count: u16) -> Result<Self> {
        if sample_rate == 0 {
            return Err(StudioError::audio("Sample rate cannot be 0"));
        }
        if channel_count == 0 {
            return Err(StudioError::audio("Channel count cannot be 0"));
        }
        if samples.len() % channel_count as usize != 0 {
            return Err(StudioError::audio(format!(
                "Sample count {} is not a multiple of channel count {}",
                samples.len(), channel_count
            )));
        }

        Ok(Self { samples, sample_rate, channel_count })
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::new(samples, sample_rate, 1)
    }

    /// Interleave per-channel planes into a new buffer.
    pub fn from_channels(channels: &[Vec<f32>], sample_rate: u32) -> Result<Self> {
        if channels.is_empty() {
            return Err(StudioError::audio("At least one channel is required"));
        }
        let frames = channels[0].len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(StudioError::audio("All channels must have the same length"));
        }

        let mut planes = Array2::<f32>::zeros((frames, channels.len()));
        for (c, data) in channels.iter().enumerate() {
            planes.column_mut(c).assign(&ArrayView1::from(data.as_slice()));
        }

        Self::new(planes.into_raw_vec(), sample_rate, channels.len() as u16)
    }

    /// Same format, new samples.
    pub fn with_samples(&self, samples: Vec<f32>) -> Result<Self> {
        if samples.len() != self.samples.len() {
            return Err(StudioError::audio(format!(
                "Replacement length {} differs from original {}",
                samples.len(), self.samples.len()
            )));
        }
        Self::new(samples, self.sample_rate, self.channel_count)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channel_count as usize
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Frames x channels view over the interleaved samples.
    fn planes(&self) -> Result<ArrayView2<'_, f32>> {
        ArrayView2::from_shape((self.frames(), self.channel_count as usize), &self.samples)
            .map_err(|e| StudioError::audio(format!("Invalid buffer shape: {}", e)))
    }

    /// De-interleave a single channel.
    pub fn channel(&self, index: usize) -> Option<Vec<f32>> {
        if index >= self.channel_count as usize {
            return None;
        }
        self.planes().ok().map(|p| p.column(index).to_vec())
    }

    pub fn channels(&self) -> Result<Vec<Vec<f32>>> {
        let planes = self.planes()?;
        Ok(planes.columns().into_iter().map(|c| c.to_vec()).collect())
    }

    /// Run `f` on every channel independently and re-interleave the results.
    ///
    /// `f` must return exactly as many samples as it was given.
    pub fn map_channels<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(&[f32]) -> Result<Vec<f32>>,
    {
        let frames = self.frames();
        let mut processed = Vec::with_capacity(self.channel_count as usize);
        for channel in self.channels()? {
            let out = f(&channel)?;
            if out.len() != frames {
                return Err(StudioError::audio(format!(
                    "Channel processor returned {} samples, expected {}", out.len(), frames
                )));
            }
            processed.push(out);
        }
        Self::from_channels(&processed, self.sample_rate)
    }

    /// Average all channels into one.
    pub fn to_mono(&self) -> Result<Self> {
        if self.channel_count == 1 {
            return Ok(self.clone());
        }
        let mono = self.planes()?
            .mean_axis(Axis(1))
            .map(|m| m.to_vec())
            .unwrap_or_default();
        Ok(Self { samples: mono, sample_rate: self.sample_rate, channel_count: 1 })
    }

    pub fn rms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_sq / self.samples.len() as f64).sqrt()
    }

    /// RMS in dBFS; `-inf` for digital silence.
    pub fn rms_db(&self) -> f64 {
        20.0 * self.rms().log10()
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
    }

    pub fn is_finite(&self) -> bool {
        self.samples.iter().all(|s| s.is_finite())
    }

    /// Check that `other` has the same shape as `self`.
    pub fn ensure_same_format(&self, other: &AudioBuffer) -> Result<()> {
        if other.sample_rate != self.sample_rate {
            return Err(StudioError::audio(format!(
                "Sample rate changed: {} -> {}", self.sample_rate, other.sample_rate
            )));
        }
        if other.channel_count != self.channel_count {
            return Err(StudioError::audio(format!(
                "Channel count changed: {} -> {}", self.channel_count, other.channel_count
            )));
        }
        if other.samples.len() != self.samples.len() {
            return Err(StudioError::audio(format!(
                "Sample count changed: {} -> {}", self.samples.len(), other.samples.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_creation() {
        let buffer = AudioBuffer::new(vec![0.1, 0.2, 0.3, 0.4], 16000, 2).unwrap();
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.channel_count(), 2);
        assert!((buffer.duration_secs() - 2.0 / 16000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_buffer_validation() {
        assert!(AudioBuffer::new(vec![0.1, 0.2, 0.3], 16000, 2).is_err());
        assert!(AudioBuffer::new(vec![0.1], 0, 1).is_err());
        assert!(AudioBuffer::new(vec![0.1], 16000, 0).is_err());
        assert!(AudioBuffer::mono(vec![], 16000).is_ok());
    }

    #[test]
    fn test_channel_roundtrip() {
        let buffer = AudioBuffer::new(vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0], 8000, 2).unwrap();
        assert_eq!(buffer.channel(0).unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(buffer.channel(1).unwrap(), vec![-1.0, -2.0, -3.0]);
        assert!(buffer.channel(2).is_none());

        let rebuilt = AudioBuffer::from_channels(&buffer.channels().unwrap(), 8000).unwrap();
        assert_eq!(rebuilt, buffer);
    }

    #[test]
    fn test_map_channels_rejects_length_change() {
        let buffer = AudioBuffer::mono(vec![0.1, 0.2], 8000).unwrap();
        let result = buffer.map_channels(|c| Ok(c[..1].to_vec()));
        assert!(result.is_err());
    }

    #[test]
    fn test_to_mono() {
        let buffer = AudioBuffer::new(vec![1.0, 0.0, 0.5, 0.5], 8000, 2).unwrap();
        let mono = buffer.to_mono().unwrap();
        assert_eq!(mono.channel_count(), 1);
        assert_eq!(mono.samples(), &[0.5, 0.5]);
    }

    #[test]
    fn test_levels() {
        let buffer = AudioBuffer::mono(vec![0.5, -0.5, 0.5, -0.5], 8000).unwrap();
        assert!((buffer.rms() - 0.5).abs() < 1e-9);
        assert_eq!(buffer.peak(), 0.5);
        assert!((buffer.rms_db() - (-6.0206)).abs() < 1e-3);
    }

    #[test]
    fn test_with_samples_keeps_format() {
        let buffer = AudioBuffer::new(vec![0.0; 4], 22050, 2).unwrap();
        let replaced = buffer.with_samples(vec![0.1; 4]).unwrap();
        assert!(buffer.ensure_same_format(&replaced).is_ok());
        assert!(buffer.with_samples(vec![0.1; 2]).is_err());
    }
}
