// Bass line post-processing before export

/// Remove the DC offset and peak-normalize to `target_peak`
/// Silent input stays silent
pub fn process_bass_line(samples: &[f32], target_peak: f32) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let mean = samples.iter().sum::<f32>() / samples.len() as f32;
    let centered: Vec<f32> = samples.iter().map(|s| s - mean).collect();

    let peak = centered.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak <= f32::EPSILON {
        return vec![0.0; samples.len()];
    }

    let gain = target_peak.clamp(0.0, 1.0) / peak;
    centered.iter().map(|s| s * gain).collect()
}
