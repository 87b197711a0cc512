// Pitch module
// Fundamental frequency estimation for isolated bass lines

pub mod f0;
pub mod yin;

pub use f0::{
    argmax_f0, confidence_filter, ensure_sequence_length, pyin_f0, resolve_threshold, ConfidenceThreshold,
    F0Estimate, PitchConfig, PitchTrack,
};
pub use yin::{pyin, PyinConfig, PyinResult};

use thiserror::Error;

/// Errors that can occur during pitch estimation
#[derive(Debug, Error)]
pub enum PitchError {
    #[error("Invalid frame setup: frame length {frame_length}, hop length {hop_length}")]
    InvalidFrame { frame_length: usize, hop_length: usize },

    #[error("Invalid frequency range: {fmin} Hz to {fmax} Hz")]
    InvalidRange { fmin: f32, fmax: f32 },

    #[error("Frame of {frame_length} samples is too short to resolve {fmin} Hz")]
    FrameTooShort { frame_length: usize, fmin: f32 },

    #[error("Confidence threshold must lie in (0, 1), got {0}")]
    InvalidThreshold(f32),

    #[error("Unknown confidence threshold: {0}")]
    UnknownThreshold(String),

    #[error("Invalid beat length: {0} s")]
    InvalidBeatLength(f64),

    #[error("FFT error: {0}")]
    Fft(#[from] realfft::FftError),
}
