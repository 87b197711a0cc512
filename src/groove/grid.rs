// Musical Grid - bars, beats and quarter beats derived from beat positions
// All positions are in seconds; bars are 4/4

use serde::{Deserialize, Serialize};

use crate::audio::OnsetEnvelope;

/// Beats in one bar (4/4)
pub const BEATS_PER_BAR: usize = 4;

/// Subdivisions of a beat on the quarter-beat grid
pub const QUARTER_BEATS_PER_BEAT: usize = 4;

/// Duration of one beat in seconds
pub fn beat_length(bpm: f64) -> f64 {
    60.0 / bpm
}

/// Every 4th beat, starting at the first one
pub fn bar_positions(beats: &[f64]) -> Vec<f64> {
    beats.iter().step_by(BEATS_PER_BAR).copied().collect()
}

/// Each beat interval split into 4; the final beat is included once
pub fn quarter_beat_positions(beats: &[f64]) -> Vec<f64> {
    let mut positions = Vec::with_capacity(beats.len() * QUARTER_BEATS_PER_BEAT);

    for pair in beats.windows(2) {
        let step = (pair[1] - pair[0]) / QUARTER_BEATS_PER_BEAT as f64;
        for q in 0..QUARTER_BEATS_PER_BEAT {
            positions.push(pair[0] + q as f64 * step);
        }
    }

    if let Some(&last) = beats.last() {
        positions.push(last);
    }

    positions
}

/// Offset (0..4) of the beats carrying the most onset energy, taken as downbeats
pub fn downbeat_phase(beats: &[f64], envelope: &OnsetEnvelope) -> usize {
    let mut energy = [0.0f32; BEATS_PER_BAR];
    for (i, &beat) in beats.iter().enumerate() {
        energy[i % BEATS_PER_BAR] += envelope.value_at(beat);
    }

    energy
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Beat grid of an excerpt, as exported next to the chorus audio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatGrid {
    pub beats: Vec<f64>,
    pub bars: Vec<f64>,
    pub quarter_beats: Vec<f64>,
}

impl BeatGrid {
    pub fn from_beats(beats: &[f64]) -> Self {
        BeatGrid {
            beats: beats.to_vec(),
            bars: bar_positions(beats),
            quarter_beats: quarter_beat_positions(beats),
        }
    }

    /// The same grid shifted so the first beat lies at 0
    pub fn relative(&self) -> Self {
        let origin = self.beats.first().copied().unwrap_or(0.0);
        let shift = |v: &Vec<f64>| v.iter().map(|t| t - origin).collect();
        BeatGrid {
            beats: shift(&self.beats),
            bars: shift(&self.bars),
            quarter_beats: shift(&self.quarter_beats),
        }
    }
}
