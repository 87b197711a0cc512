// Groove Engine - beat detection and the bar/beat grid

pub mod grid;
pub mod tempo;

pub use grid::{bar_positions, beat_length, quarter_beat_positions, BeatGrid, BEATS_PER_BAR};
pub use tempo::{estimate_tempo_with_config, BeatError, BeatTracker, OnsetBeatTracker, TempoConfig, TempoEstimate};
