// Audio processing module
// Handles file ingestion, spectral analysis and WAV export

pub mod export;
pub mod features;
pub mod ingest;
pub mod spectrum;

pub use export::{encode_wav, write_wav};
pub use features::{analyze_onsets, detect_onsets, onset_envelope, Onset, OnsetAnalysis, OnsetConfig, OnsetEnvelope};
pub use ingest::{ingest_wav, load_audio, AudioData, AudioError};
pub use spectrum::{istft, stft, SpectrumError, Stft, StftConfig};
