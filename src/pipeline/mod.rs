// Pipeline execution and monitoring module
// Orchestrates chorus bass-line extraction for single tracks and batches

pub mod batch;
pub mod extractor;
pub mod trace;

pub use batch::{collect_audio_files, extract_all_bass_lines, format_elapsed, BatchReport, TrackFailure};
pub use extractor::{track_title, BassLineExtractor, ChorusBeatPositions, TrackSummary};
pub use trace::{read_trace_file, Stage, TraceEntry, TraceError, TraceWriter};
