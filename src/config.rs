// Extraction configuration
// Every section defaults to the values used for the bass-line corpus

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::audio::OnsetConfig;
use crate::groove::TempoConfig;
use crate::pitch::PitchConfig;
use crate::separation::SeparationConfig;
use crate::structure::ChorusConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Settings for the whole extraction pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub onset: OnsetConfig,
    pub tempo: TempoConfig,
    pub chorus: ChorusConfig,
    pub separation: SeparationConfig,
    pub pitch: PitchConfig,

    /// Skip F0 estimation when false
    pub estimate_pitch: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        ExtractionConfig {
            onset: OnsetConfig::default(),
            tempo: TempoConfig::default(),
            chorus: ChorusConfig::default(),
            separation: SeparationConfig::default(),
            pitch: PitchConfig::default(),
            estimate_pitch: true,
        }
    }
}

impl ExtractionConfig {
    /// Load from a JSON file; missing fields keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}
