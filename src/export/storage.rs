// File system operations for storing extraction artifacts
// Layout: <out>/<title>/<artifact>

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const BEAT_POSITIONS_FILE: &str = "beat_positions.json";
pub const CHORUS_START_FILE: &str = "chorus_start_beat_idx.json";
pub const CHORUS_BEATS_FILE: &str = "chorus_beat_positions.json";
pub const CHORUS_AUDIO_FILE: &str = "chorus.wav";
pub const BASS_LINE_FILE: &str = "bass_line.wav";
pub const F0_FILE: &str = "f0.json";
pub const TRACE_FILE: &str = "trace.jsonl";
pub const REPORT_FILE: &str = "report.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid track title: {0:?}")]
    InvalidTitle(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A file written for a track, with its content digest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub path: PathBuf,
    pub sha256: String,
}

/// Get (and create) the output directory of a track
pub fn track_dir(out_root: &Path, title: &str) -> StorageResult<PathBuf> {
    let trimmed = title.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." || trimmed.contains(['/', '\\']) {
        return Err(StorageError::InvalidTitle(title.to_string()));
    }

    let dir = out_root.join(trimmed);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Store a file in `dir` and return its path and SHA256 hash
pub fn store_file(dir: &Path, filename: &str, data: &[u8]) -> StorageResult<StoredArtifact> {
    let file_path = dir.join(filename);
    let mut file = fs::File::create(&file_path)?;
    file.write_all(data)?;

    Ok(StoredArtifact {
        path: file_path,
        sha256: calculate_sha256(data),
    })
}

/// Store a value as pretty-printed JSON
pub fn store_json<T: Serialize + ?Sized>(dir: &Path, filename: &str, value: &T) -> StorageResult<StoredArtifact> {
    let data = serde_json::to_vec_pretty(value)?;
    store_file(dir, filename, &data)
}

/// Calculate SHA256 hash of data
pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
