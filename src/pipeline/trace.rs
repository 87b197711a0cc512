// Extraction progress tracing
// Append-only JSONL trace written next to each track's artifacts

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during trace operations
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Stages of a single-track extraction, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Loading,
    BeatTracking,
    ChorusDetection,
    ChorusExtraction,
    Separation,
    PitchEstimation,
}

impl Stage {
    /// Share of the extraction finished once this stage completes
    pub fn progress(&self) -> f32 {
        match self {
            Stage::Loading => 0.1,
            Stage::BeatTracking => 0.3,
            Stage::ChorusDetection => 0.45,
            Stage::ChorusExtraction => 0.55,
            Stage::Separation => 0.85,
            Stage::PitchEstimation => 1.0,
        }
    }

    /// Share finished before this stage starts
    pub fn started_at(&self) -> f32 {
        match self {
            Stage::Loading => 0.0,
            Stage::BeatTracking => Stage::Loading.progress(),
            Stage::ChorusDetection => Stage::BeatTracking.progress(),
            Stage::ChorusExtraction => Stage::ChorusDetection.progress(),
            Stage::Separation => Stage::ChorusExtraction.progress(),
            Stage::PitchEstimation => Stage::Separation.progress(),
        }
    }
}

/// A single line of the trace file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// RFC 3339 timestamp of when this entry was created
    pub timestamp: String,

    pub stage: Stage,

    /// Progress of the whole extraction [0.0, 1.0]
    pub progress: f32,

    pub message: String,

    /// Structured stage output (counts, indices, digests)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Set when the stage failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TraceEntry {
    pub fn new(stage: Stage, progress: f32, message: impl Into<String>) -> Self {
        TraceEntry {
            timestamp: Utc::now().to_rfc3339(),
            stage,
            progress: progress.clamp(0.0, 1.0),
            message: message.into(),
            data: None,
            error: None,
        }
    }

    /// Entry marking a finished stage
    pub fn completed(stage: Stage, message: impl Into<String>) -> Self {
        TraceEntry::new(stage, stage.progress(), message)
    }

    /// Entry marking the stage that stopped the extraction
    pub fn failed(stage: Stage, error: impl Into<String>) -> Self {
        let error = error.into();
        let mut entry = TraceEntry::new(stage, stage.started_at(), format!("Failed: {}", error));
        entry.error = Some(error);
        entry
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize to JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Appends trace entries to a JSONL file
pub struct TraceWriter {
    file_path: PathBuf,
}

impl TraceWriter {
    /// Start a fresh trace, truncating the trace of a previous run
    pub fn create(file_path: PathBuf) -> Result<Self, TraceError> {
        File::create(&file_path)?;
        Ok(TraceWriter { file_path })
    }

    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        let json_line = entry.to_json_line()?;
        file.write_all(json_line.as_bytes())?;
        file.flush()?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Read trace entries from a JSONL file
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(line)?);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_completed_entry_progress() {
        let entry = TraceEntry::completed(Stage::ChorusDetection, "Chorus at beat 16");
        assert_eq!(entry.stage, Stage::ChorusDetection);
        assert_eq!(entry.progress, 0.45);
        assert!(entry.data.is_none());

        let last = TraceEntry::completed(Stage::PitchEstimation, "done");
        assert_eq!(last.progress, 1.0);
    }

    #[test]
    fn test_progress_clamping() {
        assert_eq!(TraceEntry::new(Stage::Loading, -0.5, "x").progress, 0.0);
        assert_eq!(TraceEntry::new(Stage::Loading, 1.5, "x").progress, 1.0);
    }

    #[test]
    fn test_stage_serialization() {
        let entry = TraceEntry::new(Stage::BeatTracking, 0.3, "Beats")
            .with_data(serde_json::json!({ "beats": 412 }));
        let line = entry.to_json_line().unwrap();

        assert!(line.ends_with('\n'));
        assert!(line.contains("\"beat_tracking\""));
        let parsed: TraceEntry = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(parsed.data.unwrap()["beats"], 412);
    }

    #[test]
    fn test_failed_entry() {
        let entry = TraceEntry::failed(Stage::ChorusDetection, "Track too short");
        assert_eq!(entry.progress, 0.3);
        assert_eq!(entry.error.as_deref(), Some("Track too short"));

        let line = entry.to_json_line().unwrap();
        assert!(line.contains("\"error\":\"Track too short\""));

        // Completed entries carry no error field at all
        let ok = TraceEntry::completed(Stage::Loading, "Loaded").to_json_line().unwrap();
        assert!(!ok.contains("error"));
        let parsed: TraceEntry = serde_json::from_str(ok.trim()).unwrap();
        assert!(parsed.error.is_none());
    }

    #[test]
    fn test_writer_truncates_previous_run() {
        let temp_dir = TempDir::new().unwrap();
        let trace_path = temp_dir.path().join("trace.jsonl");

        let writer = TraceWriter::create(trace_path.clone()).unwrap();
        writer.write(&TraceEntry::completed(Stage::Loading, "first run")).unwrap();

        let writer = TraceWriter::create(trace_path.clone()).unwrap();
        writer.write(&TraceEntry::completed(Stage::Loading, "second run")).unwrap();
        writer.write(&TraceEntry::completed(Stage::BeatTracking, "beats")).unwrap();

        let entries = read_trace_file(writer.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "second run");
        assert_eq!(entries[1].stage, Stage::BeatTracking);
    }
}
