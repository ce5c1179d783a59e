// src/baseline.rs
//
// Characterizes background noise in the ball ROI from the early frames,
// before the swing starts, to derive the adaptive spike threshold.

use crate::event_scanner::changed_fraction;
use crate::types::{BaselineStats, DetectorConfig, Region};
use crate::video_source::VideoSource;
use anyhow::Result;
use tracing::{debug, info};

/// Median and median-absolute-deviation of a series. Robust against the
/// occasional decode glitch in the early window.
pub fn stats_from_series(values: &[f64]) -> BaselineStats {
    if values.is_empty() {
        return BaselineStats::default();
    }

    let med = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    BaselineStats {
        median: med,
        mad: median(&deviations),
    }
}

/// `max(median + k * MAD, floor)`. With an empty early window the stats are
/// zero and the floor alone carries the threshold.
pub fn adaptive_threshold(stats: &BaselineStats, multiplier: f64, floor: f64) -> f64 {
    (stats.median + multiplier * stats.mad).max(floor)
}

/// Changed-pixel fraction between consecutive early frame pairs inside the
/// ball ROI. Uses only frames up to the early window, never frames past a
/// detected event.
pub fn estimate(
    source: &mut VideoSource,
    ball_roi: &Region,
    config: &DetectorConfig,
) -> Result<(BaselineStats, f64)> {
    let end = source.meta.frame_count.min(config.early_frame_count);

    let mut values = Vec::new();
    let mut prev = source.read_gray(0)?;

    for i in 1..end {
        let Some(cur) = source.read_gray(i)? else {
            break;
        };
        if let Some(ref p) = prev {
            values.push(changed_fraction(p, &cur, ball_roi, config.ball_diff_cutoff)?);
        }
        prev = Some(cur);
    }

    if values.is_empty() {
        debug!("Early window yielded no baseline samples, relying on floor");
    }

    let stats = stats_from_series(&values);
    let threshold = adaptive_threshold(&stats, config.mad_multiplier, config.threshold_floor);

    info!(
        "Ball baseline: median={:.5} mad={:.5} -> threshold={:.5} ({} samples)",
        stats.median,
        stats.mad,
        threshold,
        values.len()
    );

    Ok((stats, threshold))
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n == 0 {
        0.0
    } else if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}
