// Extraction errors
// Module errors composed into one type, classified for the batch report

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

use crate::audio::AudioError;
use crate::config::ConfigError;
use crate::export::StorageError;
use crate::groove::BeatError;
use crate::metadata::MetadataError;
use crate::pipeline::trace::TraceError;
use crate::pitch::PitchError;
use crate::separation::SeparationError;
use crate::structure::ChorusError;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Beat tracking failed: {0}")]
    Beat(#[from] BeatError),

    #[error("Chorus detection failed: {0}")]
    Chorus(#[from] ChorusError),

    #[error("Separation failed: {0}")]
    Separation(#[from] SeparationError),

    #[error("Pitch estimation failed: {0}")]
    Pitch(#[from] PitchError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid input pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Title '{title}' already taken by {}", first.display())]
    DuplicateTitle { title: String, first: PathBuf },
}

/// Why a track was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Audio or another input file is missing
    FileNotFound,
    /// The track has no usable metadata
    KeyError,
    /// A processing stage failed
    RuntimeError,
    Unexpected,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::FileNotFound => "FileNotFound",
            FailureKind::KeyError => "KeyError",
            FailureKind::RuntimeError => "RuntimeError",
            FailureKind::Unexpected => "Unexpected",
        };
        f.write_str(name)
    }
}

fn io_kind(err: &std::io::Error) -> FailureKind {
    if err.kind() == ErrorKind::NotFound {
        FailureKind::FileNotFound
    } else {
        FailureKind::Unexpected
    }
}

impl ExtractionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ExtractionError::Audio(AudioError::NotFound(_)) => FailureKind::FileNotFound,
            ExtractionError::Audio(AudioError::Io(e)) => io_kind(e),
            ExtractionError::Audio(_) => FailureKind::RuntimeError,
            ExtractionError::Beat(_)
            | ExtractionError::Chorus(_)
            | ExtractionError::Separation(_)
            | ExtractionError::Pitch(_) => FailureKind::RuntimeError,
            ExtractionError::Metadata(MetadataError::MissingTrack(_))
            | ExtractionError::Metadata(MetadataError::InvalidBpm { .. }) => FailureKind::KeyError,
            ExtractionError::Metadata(MetadataError::Io(e)) => io_kind(e),
            ExtractionError::Config(ConfigError::Io(e)) => io_kind(e),
            ExtractionError::Storage(StorageError::Io(e)) => io_kind(e),
            ExtractionError::Trace(TraceError::IoError(e)) => io_kind(e),
            ExtractionError::DuplicateTitle { .. } => FailureKind::Unexpected,
            _ => FailureKind::Unexpected,
        }
    }
}
