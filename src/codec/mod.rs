//! Codec Collaborators
//!
//! Decoding and encoding sit outside the enhancement core. The core only
//! needs something that turns a source into an [`AudioBuffer`] and something
//! that writes an [`AudioBuffer`] back out.

pub mod ffmpeg;
pub mod wav;

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::audio::AudioBuffer;
use crate::error::Result;

pub use ffmpeg::{FfmpegCodec, MediaCodec, ToolchainConfig};
pub use wav::WavCodec;

/// Input extensions the batch front-end accepts.
pub const SUPPORTED_INPUT_EXTENSIONS: &[&str] = &["wav", "mp3", "ogg", "m4a", "flac", "aac", "opus"];

pub const DEFAULT_BITRATE_KBPS: u32 = 192;

/// Where a job's audio comes from.
#[derive(Debug, Clone)]
pub enum AudioSource {
    Path(PathBuf),
    /// Raw container bytes; `name` carries the original file name as a format hint.
    Bytes { name: String, data: Vec<u8> },
    /// Already-decoded audio, handed straight to the pipeline.
    Buffer { name: String, buffer: AudioBuffer },
}

impl AudioSource {
    /// Display name: the file name for paths, the supplied name otherwise.
    pub fn name(&self) -> String {
        match self {
            AudioSource::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            AudioSource::Bytes { name, .. } | AudioSource::Buffer { name, .. } => name.clone(),
        }
    }

    /// File stem used to derive output names.
    pub fn stem(&self) -> String {
        let name = self.name();
        Path::new(&name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "audio".to_string())
    }

    /// Lower-cased extension, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.name();
        Path::new(&name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }
}

impl From<PathBuf> for AudioSource {
    fn from(path: PathBuf) -> Self {
        AudioSource::Path(path)
    }
}

/// Output container/codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Wav,
    Mp3,
    Ogg,
    Flac,
    Opus,
    M4a,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Wav => "wav",
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Ogg => "ogg",
            OutputFormat::Flac => "flac",
            OutputFormat::Opus => "opus",
            OutputFormat::M4a => "m4a",
        }
    }

    /// Whether a bitrate applies to this format.
    pub fn is_lossy(&self) -> bool {
        !matches!(self, OutputFormat::Wav | OutputFormat::Flac)
    }

    /// Whether this format can be written without the external toolchain.
    pub fn is_native(&self) -> bool {
        matches!(self, OutputFormat::Wav)
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

pub trait Decoder: Send + Sync {
    fn decode(&self, source: &AudioSource) -> Result<AudioBuffer>;
}

pub trait Encoder: Send + Sync {
    /// Write `buffer` to `destination` in `format`. `bitrate_kbps` is ignored
    /// for lossless formats.
    fn encode(
        &self,
        buffer: &AudioBuffer,
        format: OutputFormat,
        bitrate_kbps: Option<u32>,
        destination: &Path,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_names() {
        let source = AudioSource::Path(PathBuf::from("/tmp/voice note.OPUS"));
        assert_eq!(source.name(), "voice note.OPUS");
        assert_eq!(source.stem(), "voice note");
        assert_eq!(source.extension().as_deref(), Some("opus"));

        let bytes = AudioSource::Bytes { name: String::new(), data: vec![] };
        assert_eq!(bytes.stem(), "audio");
        assert!(bytes.extension().is_none());
    }

    #[test]
    fn test_output_format() {
        assert_eq!(OutputFormat::Mp3.extension(), "mp3");
        assert!(OutputFormat::Mp3.is_lossy());
        assert!(!OutputFormat::Flac.is_lossy());
        assert!(OutputFormat::Wav.is_native());
        assert_eq!(OutputFormat::M4a.to_string(), "m4a");
    }

    #[test]
    fn test_output_format_serde() {
        #[derive(Deserialize)]
        struct Holder { format: OutputFormat }
        let holder: Holder = toml::from_str("format = \"ogg\"").unwrap();
        assert_eq!(holder.format, OutputFormat::Ogg);
    }
}
