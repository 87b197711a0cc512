// Source separator backend abstraction
// A separator isolates the bass stem of a mono excerpt

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::{SpectrumError, StftConfig};
use crate::separation::spectral::SpectralBassSeparator;

/// Separation backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeparatorBackend {
    /// Harmonic/percussive median filtering followed by a low-pass mask
    Spectral,
}

/// Errors that can occur during separation
#[derive(Debug, Error)]
pub enum SeparationError {
    #[error("Invalid separator configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot separate an empty excerpt")]
    EmptyInput,

    #[error("Spectral processing failed: {0}")]
    Spectrum(#[from] SpectrumError),
}

/// Configuration for bass separation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationConfig {
    pub backend: SeparatorBackend,

    pub stft: StftConfig,

    /// Frequencies up to here pass untouched
    pub cutoff_hz: f32,

    /// Width of the raised-cosine transition above the cutoff
    pub rolloff_hz: f32,

    /// Median filter length across time (frames), enhances sustained notes
    pub harmonic_kernel: usize,

    /// Median filter length across frequency (bins), enhances transients
    pub percussive_kernel: usize,

    /// Exponent of the soft harmonic mask
    pub mask_power: f32,

    /// Peak level of the processed bass line
    pub target_peak: f32,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        SeparationConfig {
            backend: SeparatorBackend::Spectral,
            stft: StftConfig {
                n_fft: 4096,
                hop_length: 1024,
            },
            cutoff_hz: 250.0,
            rolloff_hz: 60.0,
            harmonic_kernel: 17,
            percussive_kernel: 17,
            mask_power: 2.0,
            target_peak: 0.9,
        }
    }
}

/// Isolates the bass line of a mono excerpt
pub trait SourceSeparator {
    fn separate_bass_line(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f32>, SeparationError>;
}

/// Create the separator for the configured backend
pub fn create_separator(config: &SeparationConfig) -> Result<Box<dyn SourceSeparator>, SeparationError> {
    match config.backend {
        SeparatorBackend::Spectral => {
            let separator = SpectralBassSeparator::new(config.clone())?;
            log::info!(
                "Using spectral bass separator (cutoff {:.0} Hz, n_fft {})",
                config.cutoff_hz,
                config.stft.n_fft
            );
            Ok(Box::new(separator))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_spectral_separator() {
        let separator = create_separator(&SeparationConfig::default()).unwrap();
        let out = separator.separate_bass_line(&vec![0.0; 8192], 44100).unwrap();
        assert_eq!(out.len(), 8192);
    }

    #[test]
    fn test_backend_serde_name() {
        let json = serde_json::to_string(&SeparatorBackend::Spectral).unwrap();
        assert_eq!(json, "\"spectral\"");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SeparationConfig {
            cutoff_hz: -5.0,
            ..Default::default()
        };
        assert!(matches!(
            create_separator(&config),
            Err(SeparationError::InvalidConfig(_))
        ));
    }
}
