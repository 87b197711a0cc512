// Batch extraction over a directory of tracks
// Failing tracks are logged and skipped; the run ends with a JSON report

use chrono::Utc;
use glob::{glob_with, MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::ExtractionConfig;
use crate::error::{ExtractionError, FailureKind};
use crate::export::storage::{self, REPORT_FILE};
use crate::metadata::TrackCatalog;
use crate::pipeline::extractor::{track_title, BassLineExtractor, TrackSummary};
use crate::separation::{create_separator, SourceSeparator};

/// Audio file extensions picked up from the input directory
pub const AUDIO_EXTENSIONS: [&str; 2] = ["mp3", "wav"];

/// A track that was skipped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackFailure {
    pub title: String,
    pub path: PathBuf,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: String,
    /// Wall-clock duration as HH:MM:SS
    pub elapsed: String,
    pub successes: Vec<TrackSummary>,
    pub failures: Vec<TrackFailure>,
}

/// Format a duration as HH:MM:SS
pub fn format_elapsed(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// All mp3 and wav files directly inside `dir`, sorted by path
pub fn collect_audio_files(dir: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
    let options = MatchOptions {
        case_sensitive: false,
        ..Default::default()
    };
    let base = Pattern::escape(&dir.to_string_lossy());

    let mut files = Vec::new();
    for extension in AUDIO_EXTENSIONS {
        let pattern = format!("{}/*.{}", base, extension);
        for entry in glob_with(&pattern, options)? {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(e) => log::warn!("Skipping unreadable entry: {}", e),
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Extract the chorus bass line of every track in `audio_dir`
///
/// The BPM of each track is looked up in `catalog` by title.
/// Outputs are keyed by title, so of several files sharing one
/// (`a.mp3`, `a.wav`) only the first in path order is processed.
pub fn extract_all_bass_lines(
    audio_dir: &Path,
    catalog: &TrackCatalog,
    config: &ExtractionConfig,
    out_root: &Path,
) -> Result<BatchReport, ExtractionError> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now().to_rfc3339();
    let timer = Instant::now();

    let files = collect_audio_files(audio_dir)?;
    log::info!("Run {}: {} tracks in {}", run_id, files.len(), audio_dir.display());

    let separator = create_separator(&config.separation)?;

    let mut successes = Vec::new();
    let mut failures = Vec::new();
    let mut claimed: HashMap<String, PathBuf> = HashMap::new();

    for (idx, path) in files.iter().enumerate() {
        let title = track_title(path);
        log::info!("[{}/{}] {}", idx + 1, files.len(), title);

        let result = match claimed.get(&title) {
            Some(first) => Err(ExtractionError::DuplicateTitle {
                title: title.clone(),
                first: first.clone(),
            }),
            None => {
                claimed.insert(title.clone(), path.clone());
                extract_track(path, catalog, separator.as_ref(), config, out_root)
            }
        };

        match result {
            Ok(summary) => successes.push(summary),
            Err(e) => {
                let kind = e.kind();
                log::warn!("Skipping {} ({}): {}", title, kind, e);
                failures.push(TrackFailure {
                    title,
                    path: path.clone(),
                    kind,
                    message: e.to_string(),
                });
            }
        }
    }

    let elapsed = format_elapsed(timer.elapsed());
    log::info!(
        "Finished {} tracks ({} failed) in {}",
        successes.len(),
        failures.len(),
        elapsed
    );

    let report = BatchReport {
        run_id,
        started_at,
        elapsed,
        successes,
        failures,
    };

    std::fs::create_dir_all(out_root).map_err(storage::StorageError::from)?;
    let artifact = storage::store_json(out_root, REPORT_FILE, &report)?;
    log::info!("Report written to {}", artifact.path.display());

    Ok(report)
}

fn extract_track(
    path: &Path,
    catalog: &TrackCatalog,
    separator: &dyn SourceSeparator,
    config: &ExtractionConfig,
    out_root: &Path,
) -> Result<TrackSummary, ExtractionError> {
    let bpm = catalog.bpm(&track_title(path))?;
    BassLineExtractor::new(path, Some(bpm), separator, config, out_root).extract()
}
