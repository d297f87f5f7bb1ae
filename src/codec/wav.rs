//! Native WAV decoding and encoding

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use crate::audio::AudioBuffer;
use crate::codec::{AudioSource, Decoder, Encoder, OutputFormat};
use crate::error::{StudioError, Result};

/// Sample encoding used when writing WAV files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavSampleFormat {
    Int16,
    Float32,
}

impl WavSampleFormat {
    fn to_spec(self, sample_rate: u32, channels: u16) -> WavSpec {
        match self {
            WavSampleFormat::Int16 => WavSpec {
                channels,
                sample_rate,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
            WavSampleFormat::Float32 => WavSpec {
                channels,
                sample_rate,
                bits_per_sample: 32,
                sample_format: SampleFormat::Float,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WavCodec {
    pub output_format: WavSampleFormat,
}

impl Default for WavCodec {
    fn default() -> Self {
        Self { output_format: WavSampleFormat::Int16 }
    }
}

impl WavCodec {
    pub fn new(output_format: WavSampleFormat) -> Self {
        Self { output_format }
    }

    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            StudioError::decode(format!("Cannot open audio file {}: {}", path.display(), e))
        })?;
        Self::read(BufReader::new(file))
    }

    pub fn read_bytes(data: &[u8]) -> Result<AudioBuffer> {
        Self::read(Cursor::new(data))
    }

    fn read<R: Read>(source: R) -> Result<AudioBuffer> {
        let mut reader = WavReader::new(source)
            .map_err(|e| StudioError::decode(format!("Cannot create WAV reader: {}", e)))?;

        let spec = reader.spec();
        if spec.sample_rate == 0 {
            return Err(StudioError::decode("Invalid sample rate"));
        }
        if spec.channels == 0 {
            return Err(StudioError::decode("Invalid channel count"));
        }

        let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, 32) => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| StudioError::decode(format!("Failed to read sample: {}", e)))?,
            (SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => {
                let scale = (1u64 << (bits - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| StudioError::decode(format!("Failed to read sample: {}", e)))?
            }
            (format, bits) => {
                return Err(StudioError::decode(format!(
                    "Unsupported WAV encoding: {:?} at {} bits", format, bits
                )));
            }
        };

        AudioBuffer::new(samples, spec.sample_rate, spec.channels)
            .map_err(|e| StudioError::decode(e.to_string()))
    }

    pub fn write_file<P: AsRef<Path>>(&self, buffer: &AudioBuffer, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StudioError::encode(format!("Cannot create output directory: {}", e))
            })?;
        }

        let file = File::create(path).map_err(|e| {
            StudioError::encode(format!("Cannot create output file {}: {}", path.display(), e))
        })?;
        self.write(buffer, std::io::BufWriter::new(file))
    }

    pub fn write_bytes(&self, buffer: &AudioBuffer) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write(buffer, &mut cursor)?;
        Ok(cursor.into_inner())
    }

    fn write<W: std::io::Write + Seek>(&self, buffer: &AudioBuffer, sink: W) -> Result<()> {
        let spec = self.output_format.to_spec(buffer.sample_rate(), buffer.channel_count());
        let mut writer = WavWriter::new(sink, spec)
            .map_err(|e| StudioError::encode(format!("Cannot create WAV writer: {}", e)))?;

        for &sample in buffer.samples() {
            let sample = if sample.is_finite() { sample } else { 0.0 };
            // Float keeps headroom above full scale; 16-bit cannot.
            let written = match self.output_format {
                WavSampleFormat::Float32 => writer.write_sample(sample),
                WavSampleFormat::Int16 => writer.write_sample((sample.clamp(-1.0, 1.0) * 32767.0) as i16),
            };
            written.map_err(|e| StudioError::encode(format!("Failed to write sample: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| StudioError::encode(format!("Failed to finalize WAV writing: {}", e)))
    }
}

impl Decoder for WavCodec {
    fn decode(&self, source: &AudioSource) -> Result<AudioBuffer> {
        match source {
            AudioSource::Path(path) => Self::read_file(path),
            AudioSource::Bytes { data, .. } => Self::read_bytes(data),
            AudioSource::Buffer { buffer, .. } => Ok(buffer.clone()),
        }
    }
}

impl Encoder for WavCodec {
    fn encode(
        &self,
        buffer: &AudioBuffer,
        format: OutputFormat,
        _bitrate_kbps: Option<u32>,
        destination: &Path,
    ) -> Result<()> {
        if format != OutputFormat::Wav {
            return Err(StudioError::encode(format!(
                "WAV codec cannot produce {} output", format
            )));
        }
        self.write_file(buffer, destination)
    }
}
