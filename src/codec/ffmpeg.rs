//! External toolchain codec (ffmpeg)
//!
//! The program path is supplied through [`ToolchainConfig`] at construction;
//! nothing here reads or writes process-wide state.

use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use crate::audio::AudioBuffer;
use crate::codec::wav::{WavCodec, WavSampleFormat};
use crate::codec::{AudioSource, DEFAULT_BITRATE_KBPS, Decoder, Encoder, OutputFormat};
use crate::error::{StudioError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// ffmpeg executable, either a bare name resolved through `PATH` or a full path.
    pub ffmpeg: PathBuf,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self { ffmpeg: PathBuf::from("ffmpeg") }
    }
}

impl ToolchainConfig {
    pub fn new<P: Into<PathBuf>>(ffmpeg: P) -> Self {
        Self { ffmpeg: ffmpeg.into() }
    }

    /// Availability probe: true when `ffmpeg -version` runs successfully.
    pub fn probe(&self) -> bool {
        Command::new(&self.ffmpeg)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

/// Decoder/encoder that shells out to ffmpeg through temporary WAV files.
#[derive(Debug)]
pub struct FfmpegCodec {
    toolchain: ToolchainConfig,
    available: OnceLock<bool>,
}

impl FfmpegCodec {
    pub fn new(toolchain: ToolchainConfig) -> Self {
        Self { toolchain, available: OnceLock::new() }
    }

    /// Probes once and caches the answer.
    pub fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let found = self.toolchain.probe();
            if !found {
                warn!("ffmpeg not found at '{}'; only WAV input/output will work",
                      self.toolchain.ffmpeg.display());
            }
            found
        })
    }

    fn ensure_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StudioError::toolchain(format!(
                "ffmpeg is not available at '{}'", self.toolchain.ffmpeg.display()
            )))
        }
    }

    fn run(&self, args: &[&OsStr]) -> std::result::Result<(), String> {
        debug!("Running {} {:?}", self.toolchain.ffmpeg.display(), args);
        let output = Command::new(&self.toolchain.ffmpeg)
            .args(["-nostdin", "-hide_banner", "-loglevel", "error", "-y"])
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| format!("Failed to run ffmpeg: {}", e))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
        }
    }

    fn decode_path(&self, input: &Path) -> Result<AudioBuffer> {
        self.ensure_available()?;
        let scratch = tempfile::tempdir()?;
        let wav_path = scratch.path().join("decoded.wav");

        self.run(&[
            OsStr::new("-i"), input.as_os_str(),
            OsStr::new("-vn"),
            OsStr::new("-c:a"), OsStr::new("pcm_f32le"),
            OsStr::new("-f"), OsStr::new("wav"),
            wav_path.as_os_str(),
        ])
        .map_err(|e| StudioError::decode(format!("ffmpeg could not decode {}: {}", input.display(), e)))?;

        WavCodec::read_file(&wav_path)
    }
}

impl Decoder for FfmpegCodec {
    fn decode(&self, source: &AudioSource) -> Result<AudioBuffer> {
        match source {
            AudioSource::Path(path) => self.decode_path(path),
            AudioSource::Bytes { data, .. } => {
                self.ensure_available()?;
                let suffix = source.extension().map(|e| format!(".{}", e)).unwrap_or_default();
                let mut input = tempfile::Builder::new()
                    .prefix("studioclean-in-")
                    .suffix(&suffix)
                    .tempfile()?;
                input.write_all(data)?;
                input.flush()?;
                self.decode_path(input.path())
            }
            AudioSource::Buffer { buffer, .. } => Ok(buffer.clone()),
        }
    }
}

impl Encoder for FfmpegCodec {
    fn encode(
        &self,
        buffer: &AudioBuffer,
        format: OutputFormat,
        bitrate_kbps: Option<u32>,
        destination: &Path,
    ) -> Result<()> {
        self.ensure_available()?;
        let scratch = tempfile::tempdir()?;
        let wav_path = scratch.path().join("encode.wav");
        WavCodec::new(WavSampleFormat::Float32).write_file(buffer, &wav_path)?;

        let codec = match format {
            OutputFormat::Wav => "pcm_s16le",
            OutputFormat::Mp3 => "libmp3lame",
            OutputFormat::Ogg => "libvorbis",
            OutputFormat::Flac => "flac",
            OutputFormat::Opus => "libopus",
            OutputFormat::M4a => "aac",
        };
        let bitrate = format!("{}k", bitrate_kbps.unwrap_or(DEFAULT_BITRATE_KBPS));

        let mut args: Vec<&OsStr> = vec![
            OsStr::new("-i"), wav_path.as_os_str(),
            OsStr::new("-c:a"), OsStr::new(codec),
        ];
        if format.is_lossy() {
            args.push(OsStr::new("-b:a"));
            args.push(OsStr::new(&bitrate));
        }
        args.push(destination.as_os_str());

        self.run(&args).map_err(|e| {
            StudioError::encode(format!("ffmpeg could not write {}: {}", destination.display(), e))
        })
    }
}

/// Routes WAV through the native codec and everything else through ffmpeg.
#[derive(Debug)]
pub struct MediaCodec {
    wav: WavCodec,
    ffmpeg: FfmpegCodec,
}

impl MediaCodec {
    pub fn new(toolchain: ToolchainConfig) -> Self {
        Self { wav: WavCodec::default(), ffmpeg: FfmpegCodec::new(toolchain) }
    }

    fn looks_like_wav(source: &AudioSource) -> bool {
        match source {
            AudioSource::Bytes { data, .. } if data.starts_with(b"RIFF") => true,
            _ => source.extension().as_deref() == Some("wav"),
        }
    }
}

impl Decoder for MediaCodec {
    fn decode(&self, source: &AudioSource) -> Result<AudioBuffer> {
        if let AudioSource::Buffer { buffer, .. } = source {
            return Ok(buffer.clone());
        }
        if !Self::looks_like_wav(source) {
            return self.ffmpeg.decode(source);
        }

        match self.wav.decode(source) {
            Ok(buffer) => Ok(buffer),
            // WAV variants hound rejects (e.g. A-law, extensible oddities) may still decode via ffmpeg.
            Err(native) if self.ffmpeg.is_available() => {
                debug!("Native WAV decode of {} failed ({}), retrying with ffmpeg", source.name(), native);
                self.ffmpeg.decode(source).map_err(|_| native)
            }
            Err(native) => Err(native),
        }
    }
}

impl Encoder for MediaCodec {
    fn encode(
        &self,
        buffer: &AudioBuffer,
        format: OutputFormat,
        bitrate_kbps: Option<u32>,
        destination: &Path,
    ) -> Result<()> {
        if format.is_native() {
            self.wav.encode(buffer, format, bitrate_kbps, destination)
        } else {
            self.ffmpeg.encode(buffer, format, bitrate_kbps, destination)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn missing_toolchain() -> ToolchainConfig {
        ToolchainConfig::new("/nonexistent/bin/ffmpeg-missing")
    }

    #[test]
    fn test_probe_missing_program() {
        assert!(!missing_toolchain().probe());
    }

    #[test]
    fn test_missing_toolchain_is_reported_per_call() {
        let codec = FfmpegCodec::new(missing_toolchain());
        let source = AudioSource::Path(PathBuf::from("voice.mp3"));
        let err = codec.decode(&source).unwrap_err();
        assert_eq!(err.kind(), "toolchain_unavailable");
    }

    #[test]
    fn test_media_codec_wav_without_toolchain() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.wav");
        let codec = MediaCodec::new(missing_toolchain());
        let buffer = AudioBuffer::mono(vec![0.25; 64], 16000).unwrap();

        codec.encode(&buffer, OutputFormat::Wav, None, &path).unwrap();
        let decoded = codec.decode(&AudioSource::Path(path)).unwrap();
        assert_eq!(decoded.frames(), 64);
    }

    #[test]
    fn test_media_codec_mp3_without_toolchain() {
        let dir = TempDir::new().unwrap();
        let codec = MediaCodec::new(missing_toolchain());
        let buffer = AudioBuffer::mono(vec![0.25; 64], 16000).unwrap();

        let err = codec
            .encode(&buffer, OutputFormat::Mp3, Some(128), &dir.path().join("out.mp3"))
            .unwrap_err();
        assert_eq!(err.kind(), "toolchain_unavailable");
    }

    #[test]
    fn test_riff_bytes_detected_as_wav() {
        let source = AudioSource::Bytes { name: "upload".into(), data: b"RIFF....WAVE".to_vec() };
        assert!(MediaCodec::looks_like_wav(&source));
    }
}
