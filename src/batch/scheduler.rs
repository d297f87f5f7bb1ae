//! Batch Scheduler - bounded worker pool over many input files

use std::collections::HashSet;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::time::{Duration, Instant};
use log::{debug, info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::audio::{AudioBuffer, LinearResampler, Resampler};
use crate::batch::job::{Job, JobId, JobOutcome, JobOutput, JobReport, JobStatus};
use crate::batch::namespace::OutputNamespace;
use crate::batch::progress::{ProgressEvent, ProgressSink};
use crate::codec::{AudioSource, Decoder, Encoder, MediaCodec};
use crate::config::{BatchConfig, Config, PipelineConfig};
use crate::error::{StudioError, Result};
use crate::processing::pipeline::panic_message;
use crate::processing::{PerformanceMetrics, StagePipeline};

/// Stops pending jobs from starting. Running jobs finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// One report per submitted job, in completion order.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    reports: Vec<JobReport>,
    elapsed: Duration,
}

impl BatchResult {
    pub fn reports(&self) -> &[JobReport] {
        &self.reports
    }

    pub fn in_submission_order(&self) -> Vec<&JobReport> {
        let mut ordered: Vec<&JobReport> = self.reports.iter().collect();
        ordered.sort_by_key(|r| r.id);
        ordered
    }

    pub fn get(&self, id: JobId) -> Option<&JobReport> {
        self.reports.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn succeeded_count(&self) -> usize {
        self.reports.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.len() - self.succeeded_count()
    }

    /// Succeeded jobs where at least one stage fell back.
    pub fn degraded_count(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.output().is_some_and(|o| o.is_degraded()))
            .count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.reports.iter().all(|r| r.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobReport> {
        self.reports.iter().filter(|r| !r.is_success())
    }

    /// Written files, in submission order.
    pub fn output_paths(&self) -> Vec<&Path> {
        self.in_submission_order()
            .into_iter()
            .filter_map(|r| r.output_path())
            .collect()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

enum WorkerMessage {
    Started { id: JobId, name: String },
    Finished(JobReport),
}

/// Runs jobs bound to one [`PipelineConfig`] on a fixed pool of workers.
pub struct BatchScheduler {
    pipeline_config: PipelineConfig,
    batch: BatchConfig,
    pipeline: StagePipeline,
    decoder: Arc<dyn Decoder>,
    encoder: Arc<dyn Encoder>,
    resampler: Arc<dyn Resampler>,
    pool: ThreadPool,
}

impl BatchScheduler {
    /// Scheduler using the WAV/ffmpeg codec from `config.toolchain`.
    pub fn new(config: &Config) -> Result<Self> {
        let codec = Arc::new(MediaCodec::new(config.toolchain.clone()));
        Self::with_codec(config, codec.clone(), codec)
    }

    /// Rejects invalid configuration before any job exists.
    pub fn with_codec(config: &Config, decoder: Arc<dyn Decoder>, encoder: Arc<dyn Encoder>) -> Result<Self> {
        config.validate()?;

        let workers = config.batch.effective_jobs();
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("studioclean-worker-{}", i))
            .build()
            .map_err(|e| StudioError::config(format!("Failed to start worker pool: {}", e)))?;

        let pipeline = StagePipeline::from_config(&config.pipeline);
        debug!("Pipeline: {:?} ({})", pipeline.stage_names(), config.pipeline);

        Ok(Self {
            pipeline_config: config.pipeline.clone(),
            batch: config.batch.clone(),
            pipeline,
            decoder,
            encoder,
            resampler: Arc::new(LinearResampler),
            pool,
        })
    }

    pub fn n_jobs(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn pipeline(&self) -> &StagePipeline {
        &self.pipeline
    }

    pub fn run(&self, sources: Vec<AudioSource>) -> BatchResult {
        self.run_with(sources, None, &CancellationToken::new())
    }

    /// Execute every source as one job. Always returns exactly one report per
    /// source; job failures never abort their siblings.
    pub fn run_with(
        &self,
        sources: Vec<AudioSource>,
        sink: Option<&dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> BatchResult {
        let start = Instant::now();
        let total = sources.len();
        let names: Vec<String> = sources.iter().map(|s| s.name()).collect();
        let mut reports: Vec<JobReport> = Vec::with_capacity(total);
        let mut completed = 0usize;

        let emit = |id: JobId, name: &str, status: JobStatus, completed: usize| {
            if let Some(sink) = sink {
                sink.report(&ProgressEvent { job_id: id, input_name: name.to_string(), status, completed, total });
            }
        };

        let namespace = match &self.batch.output_dir {
            Some(dir) => match OutputNamespace::new(dir, &self.batch.output_suffix) {
                Ok(ns) => Some(ns),
                Err(e) => {
                    warn!("Output directory unusable: {}", e);
                    for (index, source) in sources.into_iter().enumerate() {
                        let report = Job::new(JobId(index), source).fail(e.clone());
                        completed += 1;
                        emit(report.id, &report.input_name, JobStatus::Failed, completed);
                        reports.push(report);
                    }
                    return BatchResult { reports, elapsed: start.elapsed() };
                }
            },
            None => None,
        };

        info!("Processing {} file(s) with {} worker(s)", total, self.n_jobs());

        let (tx, rx) = channel::<WorkerMessage>();
        self.pool.in_place_scope(|scope| {
            for (index, source) in sources.into_iter().enumerate() {
                let job = Job::new(JobId(index), source);
                let tx = tx.clone();
                let namespace = namespace.as_ref();
                scope.spawn(move |_| {
                    let report = self.process_job(job, namespace, cancel, &tx);
                    let _ = tx.send(WorkerMessage::Finished(report));
                });
            }
            drop(tx);

            for message in rx {
                match message {
                    WorkerMessage::Started { id, name } => {
                        emit(id, &name, JobStatus::Running, completed);
                    }
                    WorkerMessage::Finished(report) => {
                        completed += 1;
                        if let JobOutcome::Failed(e) = &report.outcome {
                            warn!("{} failed: {}", report.input_name, e);
                        }
                        emit(report.id, &report.input_name, report.status(), completed);
                        reports.push(report);
                    }
                }
            }
        });

        // A worker that died without reporting still owes its job an outcome.
        let seen: HashSet<JobId> = reports.iter().map(|r| r.id).collect();
        for (index, name) in names.into_iter().enumerate() {
            let id = JobId(index);
            if !seen.contains(&id) {
                completed += 1;
                emit(id, &name, JobStatus::Failed, completed);
                reports.push(JobReport {
                    id,
                    input_name: name,
                    outcome: JobOutcome::Failed(StudioError::internal("worker exited without a result")),
                });
            }
        }

        let result = BatchResult { reports, elapsed: start.elapsed() };
        info!(
            "Batch finished in {:.2}s: {} succeeded ({} degraded), {} failed",
            result.elapsed.as_secs_f64(),
            result.succeeded_count(),
            result.degraded_count(),
            result.failed_count()
        );
        result
    }

    fn process_job(
        &self,
        mut job: Job,
        namespace: Option<&OutputNamespace>,
        cancel: &CancellationToken,
        tx: &Sender<WorkerMessage>,
    ) -> JobReport {
        if cancel.is_cancelled() {
            return job.fail(StudioError::Cancelled);
        }
        if let Err(e) = job.begin() {
            return job.fail(e);
        }
        let _ = tx.send(WorkerMessage::Started { id: job.id(), name: job.source().name() });

        match panic::catch_unwind(AssertUnwindSafe(|| self.execute(&job, namespace))) {
            Ok(Ok(output)) => job.succeed(output),
            Ok(Err(e)) => job.fail(e),
            Err(payload) => job.fail(StudioError::internal(format!(
                "worker panicked: {}", panic_message(payload.as_ref())
            ))),
        }
    }

    /// decode -> downmix -> resample -> pipeline -> encode
    fn execute(&self, job: &Job, namespace: Option<&OutputNamespace>) -> Result<JobOutput> {
        let start = Instant::now();
        let source = job.source();

        let mut buffer = self.decoder.decode(source)?;
        if buffer.is_empty() {
            return Err(StudioError::decode(format!("{} contains no audio", source.name())));
        }

        if self.pipeline_config.downmix_to_mono && buffer.channel_count() > 1 {
            buffer = buffer.to_mono()?;
        }

        let target_rate = self.pipeline_config.target_sample_rate;
        if buffer.sample_rate() != target_rate {
            debug!("{}: resampling {} Hz -> {} Hz", source.name(), buffer.sample_rate(), target_rate);
            buffer = self.resampler.resample(&buffer, target_rate)?;
        }

        let input_duration = buffer.duration_secs();
        let processed = self.pipeline.run(&buffer);

        let output_path = match namespace {
            Some(ns) => Some(self.write_output(job, ns, &processed.buffer)?),
            None => None,
        };

        let metrics = PerformanceMetrics::new(start.elapsed(), input_duration, processed.timings);
        debug!(
            "{} done in {:.2}s (RTF {:.3})",
            source.name(), metrics.processing_time_seconds, metrics.real_time_factor
        );

        Ok(JobOutput {
            buffer: if output_path.is_none() { Some(processed.buffer) } else { None },
            output_path,
            skipped: processed.skipped,
            metrics,
        })
    }

    fn write_output(&self, job: &Job, namespace: &OutputNamespace, buffer: &AudioBuffer) -> Result<PathBuf> {
        let stem = if self.batch.preserve_names {
            job.source().stem()
        } else {
            format!("{:03}", job.id().0 + 1)
        };
        let format = self.batch.output_format;
        let claim = ClaimedOutput::new(namespace.claim(&stem, format.extension())?);
        let bitrate = format.is_lossy().then_some(self.batch.bitrate_kbps);

        self.encoder.encode(buffer, format, bitrate, claim.path())?;
        Ok(claim.keep())
    }
}

/// A claimed output name. Released on drop, so an encoder that errors or
/// panics leaves no placeholder behind.
struct ClaimedOutput {
    path: PathBuf,
    kept: bool,
}

impl ClaimedOutput {
    fn new(path: PathBuf) -> Self {
        Self { path, kept: false }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) -> PathBuf {
        self.kept = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for ClaimedOutput {
    fn drop(&mut self) {
        if !self.kept {
            debug!("Releasing output name {}", self.path.display());
            let _ = fs::remove_file(&self.path);
        }
    }
}
