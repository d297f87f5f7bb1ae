//! Pluggable external enhancement stage
//!
//! Wraps a command-line enhancer (RNNoise demo binaries, DeepFilterNet CLIs
//! and similar) that takes `<input.wav> <output.wav>`. The stage looks like
//! any other to the pipeline: same rate, same channels, same length.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use log::debug;
use serde::{Deserialize, Serialize};
use crate::audio::{AudioBuffer, LinearResampler, Resampler, fit_length};
use crate::codec::wav::{WavCodec, WavSampleFormat};
use crate::error::{StudioError, Result};
use crate::processing::pipeline::{Stage, StageOutput};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalPlacement {
    /// Run right after the built-in noise reducer.
    #[default]
    AfterNoiseReduction,
    /// Run instead of the built-in noise reducer.
    ReplaceNoiseReduction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalStageConfig {
    pub program: PathBuf,
    /// Extra arguments placed before the input and output paths.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub placement: ExternalPlacement,
}

#[derive(Debug, Clone)]
pub struct ExternalCommandStage {
    config: ExternalStageConfig,
    name: String,
}

impl ExternalCommandStage {
    pub fn new(config: ExternalStageConfig) -> Self {
        let program = config
            .program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| config.program.display().to_string());
        Self { name: format!("external:{}", program), config }
    }

    pub fn enhance(&self, input: &AudioBuffer) -> Result<AudioBuffer> {
        let scratch = tempfile::tempdir()?;
        let in_path = scratch.path().join("in.wav");
        let out_path = scratch.path().join("out.wav");

        WavCodec::new(WavSampleFormat::Float32).write_file(input, &in_path)?;

        debug!("Running external stage {} {:?}", self.config.program.display(), self.config.args);
        let output = Command::new(&self.config.program)
            .args(&self.config.args)
            .arg(&in_path)
            .arg(&out_path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| StudioError::stage(format!(
                "Cannot run {}: {}", self.config.program.display(), e
            )))?;

        if !output.status.success() {
            return Err(StudioError::stage(format!(
                "{} exited with {}: {}",
                self.config.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let enhanced = WavCodec::read_file(&out_path)
            .map_err(|e| StudioError::stage(format!("Unreadable external output: {}", e)))?;
        self.conform(input, enhanced)
    }

    /// Bring the tool's output back to the input's rate, channel count and length.
    fn conform(&self, input: &AudioBuffer, enhanced: AudioBuffer) -> Result<AudioBuffer> {
        let enhanced = LinearResampler.resample(&enhanced, input.sample_rate())?;

        let enhanced = match (input.channel_count(), enhanced.channel_count()) {
            (a, b) if a == b => enhanced,
            (1, _) => enhanced.to_mono()?,
            (n, 1) => {
                let mono = enhanced.into_samples();
                AudioBuffer::from_channels(&vec![mono; n as usize], input.sample_rate())?
            }
            (a, b) => {
                return Err(StudioError::stage(format!(
                    "External stage changed channel layout {} -> {}", a, b
                )));
            }
        };

        let channels: Vec<Vec<f32>> = enhanced
            .channels()?
            .into_iter()
            .map(|c| fit_length(c, input.frames()))
            .collect();
        AudioBuffer::from_channels(&channels, input.sample_rate())
    }
}

impl Stage for ExternalCommandStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, input: &AudioBuffer) -> Result<StageOutput> {
        self.enhance(input).map(StageOutput::processed)
    }
}
