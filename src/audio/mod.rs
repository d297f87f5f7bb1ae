//! Audio Data Module
//!
//! In-memory PCM buffers and sample rate conversion.

pub mod buffer;
pub mod converter;

pub use buffer::AudioBuffer;
pub use converter::{LinearResampler, Resampler, fit_length};
