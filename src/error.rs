//! Error Types

use thiserror::Error;

/// Main error type
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StudioError {
    /// Input could not be read or its format is unsupported.
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Output could not be produced in the requested format.
    #[error("Encode error: {message}")]
    Encode { message: String },

    /// A required external decoder/encoder is missing from the environment.
    #[error("Toolchain unavailable: {message}")]
    ToolchainUnavailable { message: String },

    #[error("Config error: {message}")]
    Config { message: String },

    /// Buffer invariant violation.
    #[error("Audio error: {message}")]
    Audio { message: String },

    /// Failure inside a single enhancement stage. Absorbed by the pipeline.
    #[error("Stage error: {message}")]
    Stage { message: String },

    #[error("IO error: {message}")]
    Io { message: String },

    /// Unexpected failure inside a worker, e.g. a caught panic.
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Job cancelled before it started")]
    Cancelled,
}

impl StudioError {
    pub fn decode<S: Into<String>>(msg: S) -> Self { Self::Decode { message: msg.into() } }
    pub fn encode<S: Into<String>>(msg: S) -> Self { Self::Encode { message: msg.into() } }
    pub fn toolchain<S: Into<String>>(msg: S) -> Self { Self::ToolchainUnavailable { message: msg.into() } }
    pub fn config<S: Into<String>>(msg: S) -> Self { Self::Config { message: msg.into() } }
    pub fn audio<S: Into<String>>(msg: S) -> Self { Self::Audio { message: msg.into() } }
    pub fn stage<S: Into<String>>(msg: S) -> Self { Self::Stage { message: msg.into() } }
    pub fn io<S: Into<String>>(msg: S) -> Self { Self::Io { message: msg.into() } }
    pub fn internal<S: Into<String>>(msg: S) -> Self { Self::Internal { message: msg.into() } }

    /// Short machine-friendly tag used in reports and manifests.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "decode",
            Self::Encode { .. } => "encode",
            Self::ToolchainUnavailable { .. } => "toolchain_unavailable",
            Self::Config { .. } => "config",
            Self::Audio { .. } => "audio",
            Self::Stage { .. } => "stage",
            Self::Io { .. } => "io",
            Self::Internal { .. } => "internal",
            Self::Cancelled => "cancelled",
        }
    }
}

pub type Result<T> = std::result::Result<T, StudioError>;

impl From<std::io::Error> for StudioError {
    fn from(err: std::io::Error) -> Self { Self::io(err.to_string()) }
}
