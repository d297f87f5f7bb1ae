//! StudioClean - Batch Speech Enhancement Library
//!
//! Runs recorded speech through noise reduction, a high-pass filter, a
//! presence boost and loudness normalization, many files at a time.

pub mod archive;
pub mod audio;
pub mod batch;
pub mod codec;
pub mod config;
pub mod error;
pub mod processing;

pub use audio::AudioBuffer;
pub use batch::{BatchResult, BatchScheduler, CancellationToken};
pub use config::{Args, Config, PipelineConfig};
pub use error::{StudioError, Result};
pub use processing::StagePipeline;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// `info` by default, `debug` when verbose. `RUST_LOG` takes precedence.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .try_init()
        .ok();
}

pub fn get_library_info() -> LibraryInfo {
    LibraryInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct LibraryInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

impl std::fmt::Display for LibraryInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} v{} - {}", self.name, self.version, self.description)
    }
}
