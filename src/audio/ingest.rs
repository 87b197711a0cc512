// Audio ingestion module
// Reads WAV and MP3 files, extracts metadata, and normalizes audio samples

use hound::{SampleFormat, WavReader};
use std::fs::File;
use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audio file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read WAV file: {0}")]
    WavReadError(#[from] hound::Error),

    #[error("Failed to decode audio: {0}")]
    DecodeError(#[from] SymphoniaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid audio data")]
    InvalidData,
}

#[derive(Debug, Clone)]
pub struct AudioData {
    /// Audio samples normalized to f32 in range [-1.0, 1.0], interleaved
    pub samples: Vec<f32>,

    /// Sample rate in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Bit depth of original audio (8, 16, 24, 32)
    pub bit_depth: u16,

    /// Duration in milliseconds
    pub duration_ms: i64,

    /// Total number of frames (samples / channels)
    pub frame_count: usize,
}

impl AudioData {
    /// Build from interleaved samples, deriving frame count and duration
    pub fn from_interleaved(
        samples: Vec<f32>,
        sample_rate: u32,
        channels: u16,
        bit_depth: u16,
    ) -> Result<Self, AudioError> {
        if channels == 0 || sample_rate == 0 {
            return Err(AudioError::InvalidData);
        }

        let frame_count = samples.len() / channels as usize;
        let duration_secs = frame_count as f64 / sample_rate as f64;

        Ok(AudioData {
            samples,
            sample_rate,
            channels,
            bit_depth,
            duration_ms: (duration_secs * 1000.0) as i64,
            frame_count,
        })
    }

    /// Mono 32-bit float audio, as produced by the analysis stages
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self, AudioError> {
        Self::from_interleaved(samples, sample_rate, 1, 32)
    }

    /// Get duration in seconds as f64
    pub fn duration_secs(&self) -> f64 {
        self.frame_count as f64 / self.sample_rate as f64
    }

    /// Convert to mono by averaging channels
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels == 1 {
            return self.samples.clone();
        }

        let mut mono = Vec::with_capacity(self.frame_count);
        let channels = self.channels as usize;

        for frame_idx in 0..self.frame_count {
            let mut sum = 0.0;
            for ch in 0..channels {
                sum += self.samples[frame_idx * channels + ch];
            }
            mono.push(sum / channels as f32);
        }

        mono
    }

    /// Mono excerpt between two times in seconds, clipped to the track
    pub fn slice_secs(&self, start_secs: f64, end_secs: f64) -> Vec<f32> {
        let to_frame = |secs: f64| {
            ((secs.max(0.0) * self.sample_rate as f64).round() as usize).min(self.frame_count)
        };
        let start = to_frame(start_secs);
        let end = to_frame(end_secs);

        if start >= end {
            return Vec::new();
        }

        let mono = self.to_mono();
        mono[start..end].to_vec()
    }
}

/// Load an audio file from disk, dispatching on the file extension
pub fn load_audio(path: &Path) -> Result<AudioData, AudioError> {
    if !path.exists() {
        return Err(AudioError::NotFound(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let audio = match extension.as_str() {
        "wav" => {
            let bytes = std::fs::read(path).map_err(|e| match e.kind() {
                ErrorKind::NotFound => AudioError::NotFound(path.to_path_buf()),
                _ => AudioError::Io(e),
            })?;
            ingest_wav(&bytes)?
        }
        "mp3" => ingest_compressed(path)?,
        other => {
            return Err(AudioError::UnsupportedFormat(format!(
                "'.{}' files are not supported",
                other
            )));
        }
    };

    log::debug!(
        "Loaded {}: {} Hz, {} channels, {} ms",
        path.display(),
        audio.sample_rate,
        audio.channels,
        audio.duration_ms
    );

    Ok(audio)
}

/// Ingest a WAV file from raw bytes
/// Returns AudioData with normalized samples and metadata
pub fn ingest_wav(data: &[u8]) -> Result<AudioData, AudioError> {
    let cursor = Cursor::new(data);
    let mut reader = WavReader::new(cursor)?;

    let spec = reader.spec();
    let sample_rate = spec.sample_rate;
    let channels = spec.channels;
    let bit_depth = spec.bits_per_sample;
    let sample_format = spec.sample_format;

    // Read and normalize samples to f32 [-1.0, 1.0]
    let samples: Vec<f32> = match (sample_format, bit_depth) {
        (SampleFormat::Int, 8) => {
            // hound yields 8-bit PCM already centered on zero
            reader
                .samples::<i8>()
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(|s| s as f32 / 128.0)
                .collect()
        }
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|s| s as f32 / 32768.0)
            .collect(),
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|s| s as f32 / 8388608.0)
            .collect(),
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|s| s as f32 / 2147483648.0)
            .collect(),
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        _ => {
            return Err(AudioError::UnsupportedFormat(format!(
                "{:?} bit {}-bit audio",
                sample_format, bit_depth
            )));
        }
    };

    AudioData::from_interleaved(samples, sample_rate, channels, bit_depth)
}

/// Decode a compressed file (MP3) with symphonia into interleaved f32 samples
pub fn ingest_compressed(path: &Path) -> Result<AudioData, AudioError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => AudioError::NotFound(path.to_path_buf()),
        _ => AudioError::Io(e),
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::UnsupportedFormat("no decodable audio track".to_string()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;

                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            // Corrupt frames are skipped, the rest of the stream is still usable
            Err(SymphoniaError::DecodeError(msg)) => {
                log::debug!("Skipping undecodable packet in {}: {}", path.display(), msg);
            }
            Err(e) => return Err(e.into()),
        }
    }

    if samples.is_empty() {
        return Err(AudioError::InvalidData);
    }

    AudioData::from_interleaved(samples, sample_rate, channels, 32)
}
