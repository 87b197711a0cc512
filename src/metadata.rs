// Track metadata
// JSON catalog keyed by track title: { "<title>": { "BPM": 128.0, ... } }

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed metadata: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No metadata for track {0:?}")]
    MissingTrack(String),

    #[error("Invalid BPM {bpm} for track {title:?}")]
    InvalidBpm { title: String, bpm: f64 },
}

/// Metadata of one track; fields other than the BPM are kept as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    #[serde(rename = "BPM")]
    pub bpm: f64,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// All known tracks by title
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackCatalog {
    tracks: HashMap<String, TrackMetadata>,
}

impl TrackCatalog {
    pub fn from_json(json: &str) -> Result<Self, MetadataError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let contents = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&contents)?;
        log::info!("Loaded metadata for {} tracks from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    pub fn insert(&mut self, title: impl Into<String>, metadata: TrackMetadata) {
        self.tracks.insert(title.into(), metadata);
    }

    pub fn get(&self, title: &str) -> Result<&TrackMetadata, MetadataError> {
        self.tracks
            .get(title)
            .ok_or_else(|| MetadataError::MissingTrack(title.to_string()))
    }

    /// BPM of a track, rejecting non-positive values
    pub fn bpm(&self, title: &str) -> Result<f64, MetadataError> {
        let bpm = self.get(title)?.bpm;
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(MetadataError::InvalidBpm {
                title: title.to_string(),
                bpm,
            });
        }
        Ok(bpm)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "Billie Jean": { "BPM": 117.0, "artist": "Michael Jackson" },
        "Silent": { "BPM": 0 }
    }"#;

    #[test]
    fn test_lookup_bpm() {
        let catalog = TrackCatalog::from_json(CATALOG).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.bpm("Billie Jean").unwrap(), 117.0);
        assert_eq!(
            catalog.get("Billie Jean").unwrap().extra["artist"],
            "Michael Jackson"
        );
    }

    #[test]
    fn test_missing_track() {
        let catalog = TrackCatalog::from_json(CATALOG).unwrap();
        assert!(matches!(
            catalog.bpm("Thriller"),
            Err(MetadataError::MissingTrack(title)) if title == "Thriller"
        ));
    }

    #[test]
    fn test_invalid_bpm() {
        let catalog = TrackCatalog::from_json(CATALOG).unwrap();
        assert!(matches!(catalog.bpm("Silent"), Err(MetadataError::InvalidBpm { .. })));
    }

    #[test]
    fn test_missing_bpm_field_is_malformed() {
        assert!(matches!(
            TrackCatalog::from_json(r#"{ "A": { "key": "E" } }"#),
            Err(MetadataError::Parse(_))
        ));
    }
}
