//! Batch processing: jobs, worker pool, progress and output naming

pub mod job;
pub mod namespace;
pub mod progress;
pub mod scheduler;

pub use job::{Job, JobId, JobOutcome, JobOutput, JobReport, JobStatus};
pub use namespace::OutputNamespace;
pub use progress::{LogProgress, ProgressEvent, ProgressSink};
pub use scheduler::{BatchResult, BatchScheduler, CancellationToken};
