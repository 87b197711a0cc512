// Bassline - chorus bass line extraction
// Module declarations

pub mod audio;
pub mod config;
pub mod error;
pub mod export;
pub mod groove;
pub mod metadata;
pub mod pipeline;
pub mod pitch;
pub mod separation;
pub mod structure;

pub use config::ExtractionConfig;
pub use error::{ExtractionError, FailureKind};
pub use metadata::TrackCatalog;
pub use pipeline::{extract_all_bass_lines, BassLineExtractor, BatchReport, TrackSummary};
