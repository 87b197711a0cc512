// WAV export for extracted excerpts
// Writes mono 32-bit float WAV files

use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::path::Path;

use crate::audio::AudioError;

fn mono_float_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    }
}

/// Encode mono samples as an in-memory WAV file
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, mono_float_spec(sample_rate))?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Write mono samples to a WAV file on disk
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), AudioError> {
    let mut writer = WavWriter::create(path, mono_float_spec(sample_rate))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::load_audio;
    use tempfile::TempDir;

    #[test]
    fn test_encoded_header() {
        let bytes = encode_wav(&[0.1, 0.2], 44100).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
    }

    #[test]
    fn test_write_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bass_line.wav");

        let samples: Vec<f32> = (0..441).map(|i| (i as f32 / 441.0) - 0.5).collect();
        write_wav(&path, &samples, 44100).unwrap();

        let audio = load_audio(&path).unwrap();
        assert_eq!(audio.frame_count, 441);
        assert!((audio.samples[100] - samples[100]).abs() < 1e-7);
    }
}
