// src/event_scanner.rs
//
// Forward scan over the video for the two impact cues: the first persistent
// motion spike in the ball ROI (ball departure) and the frame of peak motion
// energy in the wider club ROI (club-head passage).

use crate::types::{ClubPeak, DetectorConfig, ImpactEvent, Region};
use crate::video_source::VideoSource;
use anyhow::Result;
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
};
use tracing::{debug, info};

/// Fraction of pixels inside `region` whose absolute grayscale difference
/// between `prev` and `cur` exceeds `cutoff`. An empty or fully clamped-away
/// region yields 0.0.
pub fn changed_fraction(prev: &Mat, cur: &Mat, region: &Region, cutoff: f64) -> Result<f64> {
    let clamped = region.clamped(cur.cols(), cur.rows());
    if clamped.is_empty() {
        return Ok(0.0);
    }
    let rect = clamped.to_rect();

    let ra = Mat::roi(prev, rect)?;
    let rb = Mat::roi(cur, rect)?;

    let mut diff = Mat::default();
    core::absdiff(&ra, &rb, &mut diff)?;

    let mut mask = Mat::default();
    imgproc::threshold(&diff, &mut mask, cutoff, 255.0, imgproc::THRESH_BINARY)?;

    let total = (mask.rows() * mask.cols()) as f64;
    if total <= 0.0 {
        return Ok(0.0);
    }
    Ok(core::count_non_zero(&mask)? as f64 / total)
}

/// Inclusive frame range shared by the ball bookkeeping and the club scan.
/// Derived exactly once per run; never recomputed mid-scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub start: i64,
    pub end: i64,
}

impl ScanWindow {
    pub fn is_degenerate(&self) -> bool {
        self.start > self.end
    }
}

/// `±window` frames around the ball event when one exists, else the full
/// valid pairwise range `[1, frame_count - 1]`.
pub fn derive_scan_window(
    event: Option<&ImpactEvent>,
    frame_count: i64,
    window: i64,
) -> ScanWindow {
    match event {
        Some(e) => ScanWindow {
            start: (e.frame_index - window).max(1),
            end: (e.frame_index + window).min(frame_count - 1),
        },
        None => ScanWindow {
            start: 1,
            end: frame_count - 1,
        },
    }
}

/// Run-length counter over a thresholded energy series. Emits the event once
/// `persistence` consecutive samples qualify, anchored at the first frame of
/// the run, carrying the strength of the qualifying sample.
#[derive(Debug, Clone)]
pub struct SpikeGate {
    threshold: f64,
    persistence: u32,
    run: u32,
}

impl SpikeGate {
    pub fn new(threshold: f64, persistence: u32) -> Self {
        Self {
            threshold,
            persistence: persistence.max(1),
            run: 0,
        }
    }

    pub fn update(&mut self, frame: i64, energy: f64) -> Option<ImpactEvent> {
        if energy >= self.threshold {
            self.run += 1;
        } else {
            self.run = 0;
            return None;
        }

        if self.run >= self.persistence {
            Some(ImpactEvent {
                frame_index: frame - (self.persistence as i64 - 1),
                strength: energy,
            })
        } else {
            None
        }
    }
}

/// First persistent spike in a precomputed energy series. The series must be
/// in increasing frame order.
pub fn detect_event_in_series(
    series: &[(i64, f64)],
    threshold: f64,
    persistence: u32,
) -> Option<ImpactEvent> {
    let mut gate = SpikeGate::new(threshold, persistence);
    for &(frame, energy) in series {
        if let Some(event) = gate.update(frame, energy) {
            return Some(event);
        }
    }
    None
}

/// Maximum of an energy series; first occurrence wins ties. Empty series
/// defaults to frame 0 with zero energy.
pub fn find_peak(series: &[(i64, f64)]) -> ClubPeak {
    let mut peak = ClubPeak {
        frame_index: 0,
        peak_value: 0.0,
    };
    let mut best = f64::NEG_INFINITY;
    for &(frame, energy) in series {
        if energy > best {
            best = energy;
            peak = ClubPeak {
                frame_index: frame,
                peak_value: energy,
            };
        }
    }
    peak
}

/// Walk the full valid range for the ball departure spike. Stops at the
/// first qualifying event (first-spike policy, not global maximum).
pub fn detect_ball_event(
    source: &mut VideoSource,
    ball_roi: &Region,
    threshold: f64,
    config: &DetectorConfig,
) -> Result<Option<ImpactEvent>> {
    let frame_count = source.meta.frame_count;
    let mut gate = SpikeGate::new(threshold, config.persistence_frames);

    let Some(mut prev) = source.read_gray(0)? else {
        return Ok(None);
    };

    for i in 1..frame_count {
        let Some(cur) = source.read_gray(i)? else {
            break;
        };
        let energy = changed_fraction(&prev, &cur, ball_roi, config.ball_diff_cutoff)?;
        debug!("frame {} ball energy {:.5}", i, energy);

        if let Some(event) = gate.update(i, energy) {
            info!(
                "Ball departure at frame {} (strength {:.4}, threshold {:.4})",
                event.frame_index, event.strength, threshold
            );
            return Ok(Some(event));
        }
        prev = cur;
    }

    info!("No persistent ball spike found in [1, {})", frame_count);
    Ok(None)
}

/// Motion-energy peak in the club ROI over the derived window. Returns the
/// peak plus the number of frame pairs actually read, so the caller can tell
/// an empty scan from a quiet one.
pub fn detect_club_peak(
    source: &mut VideoSource,
    club_roi: &Region,
    window: &ScanWindow,
    config: &DetectorConfig,
) -> Result<(ClubPeak, u64)> {
    if window.is_degenerate() {
        return Ok((
            ClubPeak {
                frame_index: 0,
                peak_value: 0.0,
            },
            0,
        ));
    }

    let Some(mut prev) = source.read_gray((window.start - 1).max(0))? else {
        return Ok((
            ClubPeak {
                frame_index: 0,
                peak_value: 0.0,
            },
            0,
        ));
    };

    let mut peak = ClubPeak {
        frame_index: 0,
        peak_value: 0.0,
    };
    let mut best = f64::NEG_INFINITY;
    let mut pairs_read: u64 = 0;

    for i in window.start..=window.end {
        let Some(cur) = source.read_gray(i)? else {
            break;
        };
        let energy = changed_fraction(&prev, &cur, club_roi, config.club_diff_cutoff)?;
        pairs_read += 1;

        if energy > best {
            best = energy;
            peak = ClubPeak {
                frame_index: i,
                peak_value: energy,
            };
        }
        prev = cur;
    }

    info!(
        "Club motion peak at frame {} (energy {:.4}, window [{}, {}])",
        peak.frame_index, peak.peak_value, window.start, window.end
    );
    Ok((peak, pairs_read))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(energies: &[f64]) -> Vec<(i64, f64)> {
        energies
            .iter()
            .enumerate()
            .map(|(i, &e)| (i as i64 + 1, e))
            .collect()
    }

    fn gray4(rows: [[u8; 4]; 4]) -> Mat {
        Mat::from_slice_2d(&rows).unwrap()
    }

    const FULL_4X4: Region = Region {
        x1: 0,
        y1: 0,
        x2: 4,
        y2: 4,
    };

    #[test]
    fn test_changed_fraction_counts_only_pixels_over_cutoff() {
        let prev = gray4([[0; 4]; 4]);
        let mut rows = [[0u8; 4]; 4];
        for i in 0..4 {
            rows[i][i] = 100;
        }
        let cur = gray4(rows);
        let fraction = changed_fraction(&prev, &cur, &FULL_4X4, 25.0).unwrap();
        assert!((fraction - 4.0 / 16.0).abs() < 1e-12);
    }

    #[test]
    fn test_changed_fraction_ignores_sub_cutoff_differences() {
        let prev = gray4([[0; 4]; 4]);
        let faint = gray4([[10; 4]; 4]);
        assert_eq!(changed_fraction(&prev, &faint, &FULL_4X4, 25.0).unwrap(), 0.0);
        // the cutoff itself is exclusive
        let at_cutoff = gray4([[25; 4]; 4]);
        assert_eq!(
            changed_fraction(&prev, &at_cutoff, &FULL_4X4, 25.0).unwrap(),
            0.0
        );
    }

    #[test]
    fn test_changed_fraction_is_confined_to_the_region() {
        let prev = gray4([[0; 4]; 4]);
        let mut rows = [[0u8; 4]; 4];
        rows[0][0] = 200;
        let cur = gray4(rows);

        let quadrant = Region {
            x1: 2,
            y1: 2,
            x2: 4,
            y2: 4,
        };
        assert_eq!(changed_fraction(&prev, &cur, &quadrant, 25.0).unwrap(), 0.0);
        let full = changed_fraction(&prev, &cur, &FULL_4X4, 25.0).unwrap();
        assert!((full - 1.0 / 16.0).abs() < 1e-12);
    }

    #[test]
    fn test_changed_fraction_of_empty_region_is_zero() {
        let prev = gray4([[0; 4]; 4]);
        let cur = gray4([[200; 4]; 4]);
        // zero-width after clamping: must report no energy, never panic
        let collapsed = Region {
            x1: 3,
            y1: 0,
            x2: 3,
            y2: 4,
        };
        assert_eq!(
            changed_fraction(&prev, &cur, &collapsed, 25.0).unwrap(),
            0.0
        );
    }

    #[test]
    fn test_single_frame_spike_is_ignored() {
        let s = series(&[0.0, 0.0, 0.9, 0.0, 0.0]);
        assert!(detect_event_in_series(&s, 0.5, 2).is_none());
    }

    #[test]
    fn test_two_consecutive_spikes_emit_at_run_start() {
        // frames 1..=6; spikes at frames 4 and 5
        let s = series(&[0.0, 0.0, 0.0, 0.8, 0.9, 0.0]);
        let event = detect_event_in_series(&s, 0.5, 2).unwrap();
        assert_eq!(event.frame_index, 4);
        // strength carries the qualifying (second) sample
        assert!((event.strength - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_run_counter_resets_on_dip() {
        let s = series(&[0.8, 0.0, 0.8, 0.0, 0.8, 0.0]);
        assert!(detect_event_in_series(&s, 0.5, 2).is_none());
    }

    #[test]
    fn test_first_spike_wins_over_later_stronger_run() {
        let s = series(&[0.0, 0.6, 0.6, 0.0, 0.9, 0.9]);
        let event = detect_event_in_series(&s, 0.5, 2).unwrap();
        assert_eq!(event.frame_index, 2);
    }

    #[test]
    fn test_raising_threshold_never_advances_the_event() {
        let s = series(&[0.0, 0.02, 0.02, 0.01, 0.05, 0.05, 0.9, 0.9]);
        let low = detect_event_in_series(&s, 0.015, 2).unwrap();
        let mid = detect_event_in_series(&s, 0.04, 2).unwrap();
        let high = detect_event_in_series(&s, 0.5, 2).unwrap();
        assert!(low.frame_index <= mid.frame_index);
        assert!(mid.frame_index <= high.frame_index);
    }

    #[test]
    fn test_all_equal_series_triggers_immediately_or_never() {
        let flat = series(&[0.02; 10]);
        let under = detect_event_in_series(&flat, 0.03, 2);
        assert!(under.is_none());
        let over = detect_event_in_series(&flat, 0.02, 2).unwrap();
        assert_eq!(over.frame_index, 1);
    }

    #[test]
    fn test_window_around_event_is_clamped() {
        let event = ImpactEvent {
            frame_index: 10,
            strength: 0.5,
        };
        let w = derive_scan_window(Some(&event), 200, 30);
        assert_eq!(w, ScanWindow { start: 1, end: 40 });

        let late = ImpactEvent {
            frame_index: 190,
            strength: 0.5,
        };
        let w = derive_scan_window(Some(&late), 200, 30);
        assert_eq!(
            w,
            ScanWindow {
                start: 160,
                end: 199
            }
        );
    }

    #[test]
    fn test_window_without_event_spans_full_range() {
        let w = derive_scan_window(None, 200, 30);
        assert_eq!(w, ScanWindow { start: 1, end: 199 });
    }

    #[test]
    fn test_window_degenerate_for_tiny_video() {
        let w = derive_scan_window(None, 1, 30);
        assert!(w.is_degenerate());
    }

    #[test]
    fn test_peak_ties_resolve_to_first_occurrence() {
        let s = vec![(5, 0.1), (6, 0.3), (7, 0.3), (8, 0.2)];
        let peak = find_peak(&s);
        assert_eq!(peak.frame_index, 6);
        assert!((peak.peak_value - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_peak_of_empty_series_defaults_to_frame_zero() {
        let peak = find_peak(&[]);
        assert_eq!(peak.frame_index, 0);
        assert_eq!(peak.peak_value, 0.0);
    }

    #[test]
    fn test_peak_of_all_zero_series_keeps_zero_value() {
        let s = series(&[0.0; 5]);
        let peak = find_peak(&s);
        assert_eq!(peak.peak_value, 0.0);
        assert_eq!(peak.frame_index, 1);
    }
}
