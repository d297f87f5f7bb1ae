//! Configuration management for batch enhancement

use crate::codec::{DEFAULT_BITRATE_KBPS, OutputFormat, ToolchainConfig};
use crate::error::{StudioError, Result};
use crate::processing::ExternalStageConfig;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Output directory used by the CLI when none is configured.
pub const DEFAULT_OUTPUT_DIR: &str = "enhanced";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub batch: BatchConfig,
    pub toolchain: ToolchainConfig,
}

/// Enhancement parameters shared by every job of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 0.0 disables noise reduction, 1.0 is the strongest setting.
    pub noise_reduction_strength: f32,
    pub highpass_cutoff_hz: u32,
    /// Butterworth order, 2 or 4.
    pub highpass_order: usize,
    pub presence_gain_db: f32,
    /// RMS target in dBFS.
    pub target_loudness_db: f32,
    pub target_sample_rate: u32,
    pub downmix_to_mono: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_stage: Option<ExternalStageConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub n_jobs: usize,
    /// Name outputs after their inputs; otherwise `001`, `002`, ...
    pub preserve_names: bool,
    pub output_format: OutputFormat,
    pub bitrate_kbps: u32,
    pub output_suffix: String,
    /// Jobs are encoded here. Without it results stay in memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    /// Zip successful outputs into a timestamped archive.
    pub archive: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            noise_reduction_strength: 0.6,
            highpass_cutoff_hz: 80,
            highpass_order: 4,
            presence_gain_db: 3.0,
            target_loudness_db: -18.0,
            target_sample_rate: 44100,
            downmix_to_mono: true,
            external_stage: None,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            n_jobs: 2,
            preserve_names: true,
            output_format: OutputFormat::Mp3,
            bitrate_kbps: DEFAULT_BITRATE_KBPS,
            output_suffix: "_studio".to_string(),
            output_dir: None,
            archive: false,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.noise_reduction_strength) {
            return Err(StudioError::config("Noise reduction strength must be in range [0.0, 1.0]"));
        }

        if self.highpass_cutoff_hz == 0 {
            return Err(StudioError::config("High-pass cutoff must be greater than 0"));
        }
        if self.highpass_order != 2 && self.highpass_order != 4 {
            return Err(StudioError::config("High-pass order must be 2 or 4"));
        }

        if !self.presence_gain_db.is_finite() {
            return Err(StudioError::config("Presence gain must be a finite number"));
        }
        if !self.target_loudness_db.is_finite() {
            return Err(StudioError::config("Target loudness must be a finite number"));
        }
        if self.target_loudness_db > 0.0 {
            return Err(StudioError::config("Target loudness cannot exceed 0 dBFS"));
        }

        if self.target_sample_rate == 0 {
            return Err(StudioError::config("Sample rate must be greater than 0"));
        }
        if self.target_sample_rate > 192000 {
            return Err(StudioError::config("Sample rate cannot exceed 192000 Hz"));
        }

        if let Some(external) = &self.external_stage {
            if external.program.as_os_str().is_empty() {
                return Err(StudioError::config("External stage program cannot be empty"));
            }
        }

        Ok(())
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_jobs == 0 {
            return Err(StudioError::config("Job count must be greater than 0"));
        }
        if self.bitrate_kbps < 8 || self.bitrate_kbps > 512 {
            return Err(StudioError::config("Bitrate must be between 8 and 512 kbps"));
        }
        if self.output_suffix.contains(['/', '\\']) {
            return Err(StudioError::config("Output suffix cannot contain path separators"));
        }
        Ok(())
    }

    /// Worker count actually used, clamped to [`utils::MAX_WORKERS`].
    pub fn effective_jobs(&self) -> usize {
        utils::clamp_workers(self.n_jobs)
    }
}

#[derive(Debug, Parser)]
#[command(name = "studioclean", about = "Batch speech enhancement", version, author)]
pub struct Args {
    #[arg(required_unless_present_any = ["check", "write_config"], help = "Input audio files or directories")]
    pub inputs: Vec<PathBuf>,

    #[arg(short = 'o', long = "output-dir", help = "Directory for enhanced files [default: enhanced]")]
    pub output_dir: Option<PathBuf>,

    #[arg(short = 'c', long = "config", help = "Config file path (TOML format)")]
    pub config_file: Option<PathBuf>,

    #[arg(short = 'j', long = "jobs", help = "Number of files processed in parallel (1-8)")]
    pub jobs: Option<usize>,

    #[arg(long = "strength", help = "Noise reduction strength (0.0 - 1.0)")]
    pub strength: Option<f32>,

    #[arg(long = "highpass", help = "High-pass cutoff (Hz)")]
    pub highpass: Option<u32>,

    #[arg(long = "highpass-order", help = "High-pass filter order (2 or 4)")]
    pub highpass_order: Option<usize>,

    #[arg(long = "presence-db", allow_negative_numbers = true, help = "Presence boost above 2 kHz (dB)")]
    pub presence_db: Option<f32>,

    #[arg(long = "target-db", allow_negative_numbers = true, help = "Target RMS loudness (dBFS)")]
    pub target_db: Option<f32>,

    #[arg(short = 'r', long = "sample-rate", help = "Output sample rate (Hz)")]
    pub sample_rate: Option<u32>,

    #[arg(short = 'f', long = "format", value_enum, help = "Output format")]
    pub format: Option<OutputFormat>,

    #[arg(long = "bitrate", help = "Bitrate for lossy formats (kbps)")]
    pub bitrate: Option<u32>,

    #[arg(long = "suffix", help = "Suffix appended to output file names")]
    pub suffix: Option<String>,

    #[arg(long = "no-preserve-names", help = "Name outputs 001, 002, ... instead of after their inputs")]
    pub no_preserve_names: bool,

    #[arg(long = "keep-channels", help = "Keep the input channel layout instead of downmixing to mono")]
    pub keep_channels: bool,

    #[arg(long = "archive", help = "Zip outputs into enhanced_audios_<timestamp>.zip in the output directory")]
    pub archive: bool,

    #[arg(long = "ffmpeg", help = "Path to the ffmpeg executable")]
    pub ffmpeg: Option<PathBuf>,

    #[arg(long = "write-config", value_name = "PATH", help = "Write a default config file and exit")]
    pub write_config: Option<PathBuf>,

    #[arg(long = "check", help = "Check that ffmpeg is available and exit")]
    pub check: bool,

    #[arg(short = 'v', long = "verbose", help = "Enable verbose output mode")]
    pub verbose: bool,
}

impl Config {
    /// Create config from command line arguments and config file
    pub fn from_args_and_config(args: &Args) -> Result<Self> {
        let mut config = if let Some(config_path) = &args.config_file {
            Self::from_file(config_path)?
        } else {
            Self::default()
        };

        // Command line arguments override config file settings
        let pipeline = &mut config.pipeline;
        if let Some(strength) = args.strength {
            pipeline.noise_reduction_strength = strength;
        }
        if let Some(cutoff) = args.highpass {
            pipeline.highpass_cutoff_hz = cutoff;
        }
        if let Some(order) = args.highpass_order {
            pipeline.highpass_order = order;
        }
        if let Some(gain) = args.presence_db {
            pipeline.presence_gain_db = gain;
        }
        if let Some(target) = args.target_db {
            pipeline.target_loudness_db = target;
        }
        if let Some(rate) = args.sample_rate {
            pipeline.target_sample_rate = rate;
        }
        if args.keep_channels {
            pipeline.downmix_to_mono = false;
        }

        let batch = &mut config.batch;
        if let Some(jobs) = args.jobs {
            batch.n_jobs = jobs;
        }
        if let Some(format) = args.format {
            batch.output_format = format;
        }
        if let Some(bitrate) = args.bitrate {
            batch.bitrate_kbps = bitrate;
        }
        if let Some(suffix) = &args.suffix {
            batch.output_suffix = suffix.clone();
        }
        if args.no_preserve_names {
            batch.preserve_names = false;
        }
        if args.archive {
            batch.archive = true;
        }
        batch.output_dir = args
            .output_dir
            .clone()
            .or(batch.output_dir.take())
            .or_else(|| Some(PathBuf::from(DEFAULT_OUTPUT_DIR)));

        if let Some(ffmpeg) = &args.ffmpeg {
            config.toolchain = ToolchainConfig::new(ffmpeg.clone());
        }

        config.validate()?;

        Ok(config)
    }

    /// Load config from TOML config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StudioError::config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| StudioError::config(format!("Failed to parse config file: {}", e)))
    }

    /// Reject settings no job could run with. Worker counts above the pool
    /// limit are clamped later, not rejected.
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        self.batch.validate()?;
        if self.toolchain.ffmpeg.as_os_str().is_empty() {
            return Err(StudioError::config("ffmpeg path cannot be empty"));
        }
        Ok(())
    }

    /// Save config to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| StudioError::config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| StudioError::config(format!("Failed to write config file: {}", e)))
    }

    /// Create default config file
    pub fn create_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
        Self::default().save_to_file(path)
    }
}

pub mod utils {
    use log::warn;

    /// Upper bound on concurrent jobs.
    pub const MAX_WORKERS: usize = 8;

    pub fn cpu_count() -> usize {
        num_cpus::get()
    }

    pub fn recommended_workers() -> usize {
        cpu_count().clamp(1, MAX_WORKERS)
    }

    pub fn clamp_workers(requested: usize) -> usize {
        if requested > MAX_WORKERS {
            warn!("Requested {} workers, clamping to {}", requested, MAX_WORKERS);
        }
        requested.clamp(1, MAX_WORKERS)
    }
}

impl std::fmt::Display for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "strength={:.2} highpass={}Hz/{} presence={:+.1}dB target={:.1}dBFS rate={}Hz",
            self.noise_reduction_strength,
            self.highpass_cutoff_hz,
            self.highpass_order,
            self.presence_gain_db,
            self.target_loudness_db,
            self.target_sample_rate
        )?;
        if let Some(external) = &self.external_stage {
            write!(f, " external={}", external.program.display())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::ExternalPlacement;
    use tempfile::TempDir;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("studioclean").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pipeline.noise_reduction_strength, 0.6);
        assert_eq!(config.pipeline.highpass_cutoff_hz, 80);
        assert_eq!(config.pipeline.presence_gain_db, 3.0);
        assert_eq!(config.pipeline.target_loudness_db, -18.0);
        assert_eq!(config.pipeline.target_sample_rate, 44100);
        assert_eq!(config.batch.n_jobs, 2);
        assert_eq!(config.batch.output_format, OutputFormat::Mp3);
        assert_eq!(config.batch.output_suffix, "_studio");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.pipeline.noise_reduction_strength = 1.5;
        assert!(config.validate().is_err());
        config.pipeline.noise_reduction_strength = 0.6;

        config.pipeline.highpass_cutoff_hz = 0;
        assert!(config.validate().is_err());
        config.pipeline.highpass_cutoff_hz = 80;

        config.pipeline.highpass_order = 3;
        assert!(config.validate().is_err());
        config.pipeline.highpass_order = 2;

        config.pipeline.presence_gain_db = f32::INFINITY;
        assert!(config.validate().is_err());
        config.pipeline.presence_gain_db = 3.0;

        config.pipeline.target_loudness_db = 1.0;
        assert!(config.validate().is_err());
        config.pipeline.target_loudness_db = -18.0;

        config.pipeline.target_sample_rate = 0;
        assert!(config.validate().is_err());
        config.pipeline.target_sample_rate = 44100;

        config.batch.n_jobs = 0;
        assert!(config.validate().is_err());
        config.batch.n_jobs = 2;

        config.batch.output_suffix = "../x".to_string();
        assert!(config.validate().is_err());
        config.batch.output_suffix = "_studio".to_string();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_worker_clamping() {
        let mut batch = BatchConfig::default();
        batch.n_jobs = 32;
        assert!(batch.validate().is_ok());
        assert_eq!(batch.effective_jobs(), utils::MAX_WORKERS);

        batch.n_jobs = 3;
        assert_eq!(batch.effective_jobs(), 3);
    }

    #[test]
    fn test_config_file_operations() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.pipeline.external_stage = Some(ExternalStageConfig {
            program: PathBuf::from("/usr/local/bin/rnnoise"),
            args: vec!["--quiet".to_string()],
            placement: ExternalPlacement::ReplaceNoiseReduction,
        });

        assert!(config.save_to_file(&config_path).is_ok());
        assert!(config_path.exists());

        let loaded = Config::from_file(&config_path).unwrap();
        assert_eq!(loaded.pipeline, config.pipeline);
        assert_eq!(loaded.batch, config.batch);
        assert_eq!(loaded.toolchain, config.toolchain);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("partial.toml");
        std::fs::write(&config_path, "[pipeline]\npresence_gain_db = 6.0\n\n[batch]\noutput_format = \"flac\"\n").unwrap();

        let config = Config::from_file(&config_path).unwrap();
        assert_eq!(config.pipeline.presence_gain_db, 6.0);
        assert_eq!(config.pipeline.target_loudness_db, -18.0);
        assert_eq!(config.batch.output_format, OutputFormat::Flac);
        assert_eq!(config.batch.n_jobs, 2);
    }

    #[test]
    fn test_args_override_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "[pipeline]\ntarget_loudness_db = -16.0\nhighpass_cutoff_hz = 120\n").unwrap();

        let args = parse(&[
            "-c", config_path.to_str().unwrap(),
            "--target-db", "-20",
            "-j", "4",
            "-f", "wav",
            "--keep-channels",
            "--no-preserve-names",
            "in.wav",
        ]);
        let config = Config::from_args_and_config(&args).unwrap();

        assert_eq!(config.pipeline.target_loudness_db, -20.0);
        assert_eq!(config.pipeline.highpass_cutoff_hz, 120);
        assert!(!config.pipeline.downmix_to_mono);
        assert_eq!(config.batch.n_jobs, 4);
        assert_eq!(config.batch.output_format, OutputFormat::Wav);
        assert!(!config.batch.preserve_names);
        assert_eq!(config.batch.output_dir, Some(PathBuf::from(DEFAULT_OUTPUT_DIR)));
    }

    #[test]
    fn test_invalid_args_rejected() {
        let args = parse(&["--strength", "2.0", "in.wav"]);
        assert!(matches!(Config::from_args_and_config(&args), Err(StudioError::Config { .. })));
    }

    #[test]
    fn test_inputs_required_unless_utility_mode() {
        assert!(Args::try_parse_from(["studioclean"]).is_err());
        assert!(Args::try_parse_from(["studioclean", "--check"]).is_ok());
    }

    #[test]
    fn test_helper_functions() {
        assert!(utils::cpu_count() > 0);
        let workers = utils::recommended_workers();
        assert!((1..=utils::MAX_WORKERS).contains(&workers));
        assert_eq!(utils::clamp_workers(0), 1);
    }
}
