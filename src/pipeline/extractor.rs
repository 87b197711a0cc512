// Single-track bass line extraction
// beats -> chorus -> bass separation -> F0, each stage exported and traced

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::audio::{analyze_onsets, encode_wav, load_audio, Onset};
use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::export::storage::{
    self, StoredArtifact, BASS_LINE_FILE, BEAT_POSITIONS_FILE, CHORUS_AUDIO_FILE, CHORUS_BEATS_FILE,
    CHORUS_START_FILE, F0_FILE, TRACE_FILE,
};
use crate::groove::{beat_length, BeatError, BeatGrid, OnsetBeatTracker};
use crate::pipeline::trace::{Stage, TraceEntry, TraceWriter};
use crate::pitch::pyin_f0;
use crate::separation::{process_bass_line, SourceSeparator};
use crate::structure::{extract_chorus, RepetitionChorusDetector};

/// What one successful extraction produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackSummary {
    pub title: String,
    pub bpm: f64,
    /// Whether the BPM came from the audio instead of the caller
    pub bpm_estimated: bool,
    pub beat_count: usize,
    pub chorus_start_beat_idx: usize,
    pub chorus_start_secs: f64,
    pub chorus_duration_secs: f64,
    /// Share of F0 frames kept by the confidence gate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voiced_ratio: Option<f32>,
    /// Artifacts keyed by file name
    pub artifacts: BTreeMap<String, StoredArtifact>,
}

/// Chorus beat grid, in track time and shifted to the chorus start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChorusBeatPositions {
    pub absolute: BeatGrid,
    /// Lines up with `chorus.wav` and the F0 time axis
    pub relative: BeatGrid,
}

impl ChorusBeatPositions {
    pub fn from_beats(beats: &[f64]) -> Self {
        let absolute = BeatGrid::from_beats(beats);
        let relative = absolute.relative();
        ChorusBeatPositions { absolute, relative }
    }
}

/// Title of a track: its file name without extension
pub fn track_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Extracts the chorus bass line of one track into `<out_root>/<title>/`
pub struct BassLineExtractor<'a> {
    path: PathBuf,
    title: String,
    bpm: Option<f64>,
    separator: &'a dyn SourceSeparator,
    config: &'a ExtractionConfig,
    out_root: PathBuf,
}

impl<'a> BassLineExtractor<'a> {
    /// `bpm` of `None` estimates the tempo from the audio
    pub fn new(
        path: impl Into<PathBuf>,
        bpm: Option<f64>,
        separator: &'a dyn SourceSeparator,
        config: &'a ExtractionConfig,
        out_root: impl Into<PathBuf>,
    ) -> Self {
        let path = path.into();
        let title = track_title(&path);
        BassLineExtractor {
            path,
            title,
            bpm,
            separator,
            config,
            out_root: out_root.into(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Run every stage, recording the failing one in the trace on error
    pub fn extract(&self) -> Result<TrackSummary, ExtractionError> {
        let dir = storage::track_dir(&self.out_root, &self.title)?;
        let trace = TraceWriter::create(dir.join(TRACE_FILE))?;

        let mut stage = Stage::Loading;
        let result = self.run_stages(&dir, &trace, &mut stage);
        if let Err(e) = &result {
            if let Err(trace_err) = trace.write(&TraceEntry::failed(stage, e.to_string())) {
                log::warn!("[{}] Could not record failure in trace: {}", self.title, trace_err);
            }
        }
        result
    }

    fn run_stages(&self, dir: &Path, trace: &TraceWriter, stage: &mut Stage) -> Result<TrackSummary, ExtractionError> {
        let mut artifacts = BTreeMap::new();

        let audio = load_audio(&self.path)?;
        trace.write(
            &TraceEntry::completed(Stage::Loading, format!("Loaded {}", self.path.display())).with_data(
                serde_json::json!({
                    "sample_rate": audio.sample_rate,
                    "channels": audio.channels,
                    "duration_ms": audio.duration_ms,
                }),
            ),
        )?;

        // Beats. The onset analysis also feeds the chorus loudness score
        *stage = Stage::BeatTracking;
        let mono = audio.to_mono();
        let analysis = analyze_onsets(&mono, audio.sample_rate, &self.config.onset).map_err(BeatError::from)?;
        let tracker = OnsetBeatTracker::new(self.config.onset.clone(), self.config.tempo.clone());
        let (bpm, bpm_estimated) = self.resolve_bpm(&tracker, &analysis.onsets, audio.duration_secs())?;
        let beats = tracker.beats_from_onsets(&analysis.onsets, bpm, audio.duration_secs())?;
        log::info!("[{}] {} beats at {:.2} BPM", self.title, beats.len(), bpm);

        let artifact = storage::store_json(dir, BEAT_POSITIONS_FILE, &beats)?;
        trace.write(
            &TraceEntry::completed(Stage::BeatTracking, format!("{} beats", beats.len()))
                .with_data(serde_json::json!({ "bpm": bpm, "estimated": bpm_estimated, "sha256": artifact.sha256 })),
        )?;
        artifacts.insert(BEAT_POSITIONS_FILE.to_string(), artifact);

        // Chorus start
        *stage = Stage::ChorusDetection;
        let chorus_config = &self.config.chorus;
        let detector = RepetitionChorusDetector::new(chorus_config.clone(), self.config.onset.clone());
        let start = detector.locate_chorus(
            &mono,
            audio.sample_rate,
            &beats,
            chorus_config.epsilon,
            &analysis.envelope,
        )?;
        log::info!("[{}] Chorus starts at beat {}", self.title, start);

        let artifact = storage::store_json(dir, CHORUS_START_FILE, &start)?;
        trace.write(
            &TraceEntry::completed(Stage::ChorusDetection, format!("Chorus starts at beat {}", start))
                .with_data(serde_json::json!({ "start_beat_idx": start, "epsilon": chorus_config.epsilon })),
        )?;
        artifacts.insert(CHORUS_START_FILE.to_string(), artifact);

        // Chorus audio and its grid
        *stage = Stage::ChorusExtraction;
        let chorus = extract_chorus(&audio, &beats, start, chorus_config.n_bars)?;
        let grid = ChorusBeatPositions::from_beats(&chorus.beat_positions);
        let chorus_start_secs = chorus.beat_positions.first().copied().unwrap_or(0.0);
        let chorus_duration_secs = chorus.samples.len() as f64 / chorus.sample_rate as f64;

        artifacts.insert(
            CHORUS_BEATS_FILE.to_string(),
            storage::store_json(dir, CHORUS_BEATS_FILE, &grid)?,
        );
        let chorus_wav = encode_wav(&chorus.samples, chorus.sample_rate)?;
        artifacts.insert(
            CHORUS_AUDIO_FILE.to_string(),
            storage::store_file(dir, CHORUS_AUDIO_FILE, &chorus_wav)?,
        );
        trace.write(
            &TraceEntry::completed(
                Stage::ChorusExtraction,
                format!("{} bars from {:.2}s", chorus_config.n_bars, chorus_start_secs),
            )
            .with_data(serde_json::json!({ "duration_secs": chorus_duration_secs })),
        )?;

        // Bass line
        *stage = Stage::Separation;
        let separated = self.separator.separate_bass_line(&chorus.samples, chorus.sample_rate)?;
        let bass_line = process_bass_line(&separated, self.config.separation.target_peak);
        let bass_wav = encode_wav(&bass_line, chorus.sample_rate)?;
        let artifact = storage::store_file(dir, BASS_LINE_FILE, &bass_wav)?;
        trace.write(
            &TraceEntry::completed(Stage::Separation, "Bass line separated")
                .with_data(serde_json::json!({ "sha256": artifact.sha256 })),
        )?;
        artifacts.insert(BASS_LINE_FILE.to_string(), artifact);
        log::info!("[{}] Bass line exported", self.title);

        // F0
        let mut voiced_ratio = None;
        if self.config.estimate_pitch {
            *stage = Stage::PitchEstimation;
            let estimate = pyin_f0(
                &bass_line,
                chorus.sample_rate,
                beat_length(bpm),
                chorus_config.n_bars,
                &self.config.pitch,
            )?;
            let frames = estimate.filtered.frequencies.len();
            let voiced = estimate.filtered.frequencies.iter().filter(|&&f| f > 0.0).count();
            let ratio = if frames > 0 { voiced as f32 / frames as f32 } else { 0.0 };
            voiced_ratio = Some(ratio);

            artifacts.insert(F0_FILE.to_string(), storage::store_json(dir, F0_FILE, &estimate)?);
            trace.write(
                &TraceEntry::completed(Stage::PitchEstimation, format!("{} F0 frames", frames))
                    .with_data(serde_json::json!({ "threshold": estimate.threshold, "voiced_ratio": ratio })),
            )?;
        }

        Ok(TrackSummary {
            title: self.title.clone(),
            bpm,
            bpm_estimated,
            beat_count: beats.len(),
            chorus_start_beat_idx: start,
            chorus_start_secs,
            chorus_duration_secs,
            voiced_ratio,
            artifacts,
        })
    }

    fn resolve_bpm(
        &self,
        tracker: &OnsetBeatTracker,
        onsets: &[Onset],
        duration_secs: f64,
    ) -> Result<(f64, bool), ExtractionError> {
        if let Some(bpm) = self.bpm {
            return Ok((bpm, false));
        }

        let estimate = tracker.estimate_tempo_from_onsets(onsets, duration_secs)?;
        log::info!(
            "[{}] No BPM given, estimated {:.2} BPM (confidence {:.2})",
            self.title,
            estimate.bpm,
            estimate.confidence
        );
        Ok((estimate.bpm, true))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::write_wav;
    use crate::pipeline::trace::read_trace_file;
    use crate::pitch::F0Estimate;
    use crate::separation::{create_separator, SeparationConfig};
    use tempfile::TempDir;

    pub(crate) const SR: u32 = 8000;

    /// 120 BPM: a click and a bass note on every beat, four-note riff
    pub(crate) fn groove(seconds: usize) -> Vec<f32> {
        let riff = [55.0f32, 55.0, 73.42, 65.41];
        let beat_len = SR as usize / 2;
        let mut state: u32 = 7;

        (0..seconds * SR as usize)
            .map(|i| {
                let beat = i / beat_len;
                let pos = i % beat_len;
                let freq = riff[beat % riff.len()];
                let bass = 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / SR as f32).sin();
                let click = if pos < 160 {
                    state = state.wrapping_mul(1103515245).wrapping_add(12345);
                    let noise = ((state >> 16) % 2000) as f32 / 1000.0 - 1.0;
                    0.4 * noise * (1.0 - pos as f32 / 160.0)
                } else {
                    0.0
                };
                bass + click
            })
            .collect()
    }

    #[test]
    fn test_track_title() {
        assert_eq!(track_title(Path::new("/music/Billie Jean.mp3")), "Billie Jean");
        assert_eq!(track_title(Path::new("a.b.wav")), "a.b");
    }

    #[test]
    fn test_extract_writes_all_artifacts() {
        let temp_dir = TempDir::new().unwrap();
        let track = temp_dir.path().join("groove.wav");
        write_wav(&track, &groove(20), SR).unwrap();

        let config = ExtractionConfig::default();
        let separator = create_separator(&SeparationConfig::default()).unwrap();
        let out_root = temp_dir.path().join("out");

        let extractor = BassLineExtractor::new(&track, Some(120.0), separator.as_ref(), &config, &out_root);
        let summary = extractor.extract().unwrap();

        assert_eq!(summary.title, "groove");
        assert!(!summary.bpm_estimated);
        assert!(summary.beat_count >= 39);
        assert!((summary.chorus_duration_secs - 8.0).abs() < 0.01);
        assert_eq!(summary.artifacts.len(), 6);

        let dir = out_root.join("groove");
        for name in [
            BEAT_POSITIONS_FILE,
            CHORUS_START_FILE,
            CHORUS_BEATS_FILE,
            CHORUS_AUDIO_FILE,
            BASS_LINE_FILE,
            F0_FILE,
        ] {
            assert!(dir.join(name).is_file(), "missing {}", name);
        }

        let start: usize = serde_json::from_slice(&std::fs::read(dir.join(CHORUS_START_FILE)).unwrap()).unwrap();
        assert_eq!(start, summary.chorus_start_beat_idx);

        let grid: ChorusBeatPositions =
            serde_json::from_slice(&std::fs::read(dir.join(CHORUS_BEATS_FILE)).unwrap()).unwrap();
        assert_eq!(grid.relative.beats.len(), 17);
        assert_eq!(grid.relative.bars.len(), 5);
        assert_eq!(grid.relative.beats[0], 0.0);
        assert_eq!(grid.absolute.beats[0], summary.chorus_start_secs);
        assert_eq!(grid.absolute.beats.len(), grid.relative.beats.len());
        assert!((grid.absolute.bars[1] - grid.relative.bars[1] - summary.chorus_start_secs).abs() < 1e-9);

        let f0: F0Estimate = serde_json::from_slice(&std::fs::read(dir.join(F0_FILE)).unwrap()).unwrap();
        assert_eq!(f0.raw.frequencies.len(), 512);
        assert_eq!(f0.filtered.times.len(), 512);

        let trace = read_trace_file(&dir.join(TRACE_FILE)).unwrap();
        let stages: Vec<Stage> = trace.iter().map(|e| e.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::Loading,
                Stage::BeatTracking,
                Stage::ChorusDetection,
                Stage::ChorusExtraction,
                Stage::Separation,
                Stage::PitchEstimation,
            ]
        );
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = ExtractionConfig::default();
        let separator = create_separator(&config.separation).unwrap();

        let extractor = BassLineExtractor::new(
            temp_dir.path().join("nowhere.wav"),
            Some(120.0),
            separator.as_ref(),
            &config,
            temp_dir.path(),
        );
        let err = extractor.extract().unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::FileNotFound);
    }

    #[test]
    fn test_extract_estimates_missing_bpm() {
        let temp_dir = TempDir::new().unwrap();
        let track = temp_dir.path().join("groove.wav");
        write_wav(&track, &groove(20), SR).unwrap();

        // 250-sample hop puts every beat exactly 16 frames apart
        let mut config = ExtractionConfig::default();
        config.onset.hop_size = 250;
        config.estimate_pitch = false;
        let separator = create_separator(&config.separation).unwrap();
        let out_root = temp_dir.path().join("out");

        let summary = BassLineExtractor::new(&track, None, separator.as_ref(), &config, &out_root)
            .extract()
            .unwrap();

        assert!(summary.bpm_estimated);
        assert!((summary.bpm - 120.0).abs() < 3.0, "bpm {}", summary.bpm);
        assert!(summary.beat_count >= 36);
        assert!(summary.voiced_ratio.is_none());

        let trace = read_trace_file(&out_root.join("groove").join(TRACE_FILE)).unwrap();
        assert_eq!(trace[1].stage, Stage::BeatTracking);
        assert_eq!(trace[1].data.as_ref().unwrap()["estimated"], true);
    }

    #[test]
    fn test_undetermined_tempo_fails_and_is_traced() {
        let temp_dir = TempDir::new().unwrap();
        let track = temp_dir.path().join("sparse.wav");

        // Three clicks in ten seconds of silence
        let mut samples = vec![0.0f32; 10 * SR as usize];
        for click in 0..3 {
            let start = (click * 2 + 1) * SR as usize;
            for (i, s) in samples[start..start + 160].iter_mut().enumerate() {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                *s = 0.8 * sign * (1.0 - i as f32 / 160.0);
            }
        }
        write_wav(&track, &samples, SR).unwrap();

        let mut config = ExtractionConfig::default();
        config.onset.hop_size = 250;
        let separator = create_separator(&config.separation).unwrap();

        let err = BassLineExtractor::new(&track, None, separator.as_ref(), &config, temp_dir.path())
            .extract()
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::Beat(BeatError::TempoUndetermined { .. })
        ));
        assert_eq!(err.kind(), crate::error::FailureKind::RuntimeError);

        let trace = read_trace_file(&temp_dir.path().join("sparse").join(TRACE_FILE)).unwrap();
        let last = trace.last().unwrap();
        assert_eq!(last.stage, Stage::BeatTracking);
        assert!(last.error.as_deref().unwrap().contains("Tempo could not be determined"));
        assert_eq!(trace.len(), 2);
    }

    #[test]
    fn test_missing_file_is_traced() {
        let temp_dir = TempDir::new().unwrap();
        let config = ExtractionConfig::default();
        let separator = create_separator(&config.separation).unwrap();

        let result = BassLineExtractor::new(
            temp_dir.path().join("gone.mp3"),
            Some(120.0),
            separator.as_ref(),
            &config,
            temp_dir.path(),
        )
        .extract();
        assert!(result.is_err());

        let trace = read_trace_file(&temp_dir.path().join("gone").join(TRACE_FILE)).unwrap();
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0].stage, Stage::Loading);
        assert_eq!(trace[0].progress, 0.0);
        assert!(trace[0].error.is_some());
    }
}
