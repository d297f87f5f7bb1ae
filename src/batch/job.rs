//! Per-file job state machine

use std::fmt;
use std::path::{Path, PathBuf};
use crate::audio::AudioBuffer;
use crate::codec::AudioSource;
use crate::error::{StudioError, Result};
use crate::processing::{PerformanceMetrics, SkippedStage};

/// Submission index of a job within its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub usize);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A job that has not reached a terminal state yet.
///
/// Terminal transitions consume the job, so a finished job cannot run again
/// or change its outcome.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    source: AudioSource,
    status: JobStatus,
}

impl Job {
    pub fn new(id: JobId, source: AudioSource) -> Self {
        Self { id, source, status: JobStatus::Pending }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn source(&self) -> &AudioSource {
        &self.source
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// `Pending -> Running`. A job runs at most once.
    pub fn begin(&mut self) -> Result<()> {
        if self.status != JobStatus::Pending {
            return Err(StudioError::internal(format!(
                "job {} cannot start from state {}", self.id, self.status
            )));
        }
        self.status = JobStatus::Running;
        Ok(())
    }

    pub fn succeed(self, output: JobOutput) -> JobReport {
        self.finish(JobOutcome::Succeeded(output))
    }

    pub fn fail(self, error: StudioError) -> JobReport {
        self.finish(JobOutcome::Failed(error))
    }

    fn finish(self, outcome: JobOutcome) -> JobReport {
        JobReport { id: self.id, input_name: self.source.name(), outcome }
    }
}

/// What a successful job produced.
#[derive(Debug, Clone)]
pub struct JobOutput {
    /// Kept only when the job was not encoded to disk.
    pub buffer: Option<AudioBuffer>,
    pub output_path: Option<PathBuf>,
    /// Stages that fell back to identity. Non-empty means the output is degraded.
    pub skipped: Vec<SkippedStage>,
    pub metrics: PerformanceMetrics,
}

impl JobOutput {
    pub fn is_degraded(&self) -> bool {
        !self.skipped.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum JobOutcome {
    Succeeded(JobOutput),
    Failed(StudioError),
}

/// Terminal record of one job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub id: JobId,
    pub input_name: String,
    pub outcome: JobOutcome,
}

impl JobReport {
    pub fn status(&self) -> JobStatus {
        match self.outcome {
            JobOutcome::Succeeded(_) => JobStatus::Succeeded,
            JobOutcome::Failed(_) => JobStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, JobOutcome::Succeeded(_))
    }

    pub fn output(&self) -> Option<&JobOutput> {
        match &self.outcome {
            JobOutcome::Succeeded(output) => Some(output),
            JobOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&StudioError> {
        match &self.outcome {
            JobOutcome::Succeeded(_) => None,
            JobOutcome::Failed(e) => Some(e),
        }
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output().and_then(|o| o.output_path.as_deref())
    }
}
