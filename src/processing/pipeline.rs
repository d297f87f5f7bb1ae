//! Enhancement pipeline with per-stage fallback

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use log::{debug, warn};
use crate::audio::AudioBuffer;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::processing::external::{ExternalCommandStage, ExternalPlacement};
use crate::processing::performance::StageTiming;
use crate::processing::{HighPassFilter, LoudnessNormalizer, NoiseReducer, PresenceBoost};

/// Result of one stage run.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub buffer: AudioBuffer,
    /// Set when the stage fell back to passing its input through.
    pub degraded: Option<String>,
}

impl StageOutput {
    pub fn processed(buffer: AudioBuffer) -> Self {
        Self { buffer, degraded: None }
    }

    pub fn degraded<S: Into<String>>(input: &AudioBuffer, reason: S) -> Self {
        Self { buffer: input.clone(), degraded: Some(reason.into()) }
    }
}

/// One `AudioBuffer -> AudioBuffer` step.
///
/// Implementations must keep sample rate, channel count and length intact.
/// Returning `Err` is treated as a fatal stage failure and the pipeline
/// carries on with the stage's input.
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;
    fn process(&self, input: &AudioBuffer) -> Result<StageOutput>;
}

/// A stage that fell back to identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedStage {
    pub stage: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub buffer: AudioBuffer,
    pub skipped: Vec<SkippedStage>,
    pub timings: Vec<StageTiming>,
}

impl PipelineOutput {
    pub fn is_degraded(&self) -> bool {
        !self.skipped.is_empty()
    }
}

pub struct StagePipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl std::fmt::Debug for StagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagePipeline").field("stages", &self.stage_names()).finish()
    }
}

impl StagePipeline {
    /// Standard chain: noise reduction, high-pass, presence boost, loudness.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let mut stages: Vec<Box<dyn Stage>> = Vec::with_capacity(5);

        let external = config.external_stage.as_ref().map(|c| (c.placement, ExternalCommandStage::new(c.clone())));
        match external {
            Some((ExternalPlacement::ReplaceNoiseReduction, stage)) => stages.push(Box::new(stage)),
            Some((ExternalPlacement::AfterNoiseReduction, stage)) => {
                stages.push(Box::new(NoiseReducer::new(config.noise_reduction_strength)));
                stages.push(Box::new(stage));
            }
            None => stages.push(Box::new(NoiseReducer::new(config.noise_reduction_strength))),
        }

        stages.push(Box::new(HighPassFilter::new(config.highpass_cutoff_hz as f32, config.highpass_order)));
        stages.push(Box::new(PresenceBoost::new(config.presence_gain_db)));
        stages.push(Box::new(LoudnessNormalizer::new(config.target_loudness_db)));

        Self { stages }
    }

    pub fn with_stages(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order. Never fails: a failing stage is skipped and
    /// recorded in [`PipelineOutput::skipped`].
    pub fn run(&self, input: &AudioBuffer) -> PipelineOutput {
        let mut current = input.clone();
        let mut skipped = Vec::new();
        let mut timings = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let start = Instant::now();
            let result = panic::catch_unwind(AssertUnwindSafe(|| stage.process(&current)));
            timings.push(StageTiming::new(stage.name(), start.elapsed()));

            let fallback_reason = match result {
                Ok(Ok(output)) => match Self::check_output(&current, &output) {
                    Ok(()) => {
                        let reason = output.degraded;
                        if reason.is_none() {
                            current = output.buffer;
                        }
                        reason
                    }
                    Err(reason) => Some(reason),
                },
                Ok(Err(e)) => Some(e.to_string()),
                Err(payload) => Some(format!("stage panicked: {}", panic_message(payload.as_ref()))),
            };

            match fallback_reason {
                Some(reason) => {
                    warn!("Stage '{}' skipped: {}", stage.name(), reason);
                    skipped.push(SkippedStage { stage: stage.name().to_string(), reason });
                }
                None => debug!("Stage '{}' done in {:.1}ms", stage.name(),
                               timings.last().map(|t| t.millis()).unwrap_or_default()),
            }
        }

        PipelineOutput { buffer: current, skipped, timings }
    }

    fn check_output(input: &AudioBuffer, output: &StageOutput) -> std::result::Result<(), String> {
        input.ensure_same_format(&output.buffer).map_err(|e| e.to_string())?;
        if !output.buffer.is_finite() {
            return Err("stage produced non-finite samples".to_string());
        }
        Ok(())
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
