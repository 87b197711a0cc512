// Song structure - chorus detection and extraction

pub mod chorus;

pub use chorus::{extract_chorus, Chorus, ChorusConfig, ChorusDetector, ChorusError, RepetitionChorusDetector};
