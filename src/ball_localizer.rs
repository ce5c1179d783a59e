// src/ball_localizer.rs
//
// Finds the resting ball in the early frames, where it is still stationary.
// Primary: HoughCircles over the lower part of the frame, tuned for small
// bright circles. Fallback: brightest small blob, scored by proximity to the
// lower-middle where the ball tends to sit.

use crate::types::{BallCandidate, DetectorConfig};
use crate::video_source::VideoSource;
use anyhow::Result;
use opencv::{
    core::{self, Mat, Point, Rect, Size, Vec3f, Vector},
    imgproc,
    prelude::*,
};
use tracing::{debug, info, warn};

// Ball search is restricted to the lower part of the frame (ball on ground).
const LOWER_REGION_START: f64 = 0.35;

// HoughCircles tuning for a small, round, bright-ish object.
const HOUGH_DP: f64 = 1.2;
const HOUGH_MIN_DIST: f64 = 30.0;
const HOUGH_PARAM1: f64 = 120.0;
const HOUGH_PARAM2: f64 = 16.0;
const HOUGH_MIN_RADIUS: i32 = 2;
const HOUGH_MAX_RADIUS: i32 = 18;

// Bright-blob fallback.
const BLOB_INTENSITY_CUTOFF: f64 = 220.0;
const BLOB_AREA_MIN: f64 = 6.0;
const BLOB_AREA_MAX: f64 = 400.0;

const MIN_REPORTED_RADIUS: i32 = 6;

/// Bright, small circles score high.
pub fn circle_score(brightness: f64, radius: f64) -> f64 {
    brightness - 0.5 * radius
}

/// Blobs near the lower-middle of the frame score high.
pub fn blob_score(cx: i32, cy: i32, frame_width: i32, frame_height: i32) -> f64 {
    let target_y = frame_height as f64 * 0.80;
    let target_x = frame_width as f64 * 0.50;
    50.0 - (cy as f64 - target_y).abs() * 0.02 - (cx as f64 - target_x).abs() * 0.01
}

/// Squashes a raw detection score into a `[0, 1]` confidence.
pub fn logistic_confidence(score: f64) -> f64 {
    1.0 / (1.0 + (-score / 20.0).exp())
}

#[derive(Debug, Clone, Copy)]
struct RawCandidate {
    cx: i32,
    cy: i32,
    r: i32,
    score: f64,
    source_frame: i64,
}

/// Tracks the single best candidate across all sampled frames. Hough results
/// always beat fallback results; within a detector, the higher score wins
/// and ties break to the first found.
#[derive(Debug, Default)]
pub struct CandidateTracker {
    hough: Option<RawCandidate>,
    fallback: Option<RawCandidate>,
}

impl CandidateTracker {
    pub fn offer_hough(&mut self, cx: i32, cy: i32, r: i32, score: f64, frame: i64) {
        let raw = RawCandidate {
            cx,
            cy,
            r,
            score,
            source_frame: frame,
        };
        if self.hough.map_or(true, |best| score > best.score) {
            self.hough = Some(raw);
        }
    }

    pub fn offer_fallback(&mut self, cx: i32, cy: i32, r: i32, score: f64, frame: i64) {
        let raw = RawCandidate {
            cx,
            cy,
            r,
            score,
            source_frame: frame,
        };
        if self.fallback.map_or(true, |best| score > best.score) {
            self.fallback = Some(raw);
        }
    }

    pub fn has_hough(&self) -> bool {
        self.hough.is_some()
    }

    pub fn into_best(self) -> Option<BallCandidate> {
        let raw = self.hough.or(self.fallback)?;
        Some(BallCandidate {
            cx: raw.cx,
            cy: raw.cy,
            r: raw.r.max(MIN_REPORTED_RADIUS),
            confidence: logistic_confidence(raw.score),
            source_frame: raw.source_frame,
        })
    }
}

/// Fixed head of the video plus two strided samples through the early
/// window, deduped and sorted, capped by the frame count.
pub fn sample_indices(frame_count: i64, early_frame_count: i64) -> Vec<i64> {
    let end = frame_count.min(early_frame_count);
    let mut indices: Vec<i64> = (0..end.min(6)).collect();
    indices.extend((0..end).step_by(5));
    indices.extend((0..end).step_by(7));
    indices.sort_unstable();
    indices.dedup();
    indices
}

/// Scans the sampled early frames and returns the single best candidate, or
/// `None` when no frame yields anything — the caller degrades to club-only.
pub fn locate(source: &mut VideoSource, config: &DetectorConfig) -> Result<Option<BallCandidate>> {
    let width = source.meta.width;
    let height = source.meta.height;
    let mut tracker = CandidateTracker::default();

    for index in sample_indices(source.meta.frame_count, config.early_frame_count) {
        let Some(gray) = source.read_gray(index)? else {
            continue;
        };

        let y0 = (height as f64 * LOWER_REGION_START) as i32;
        let lower = Mat::roi(&gray, Rect::new(0, y0, width, height - y0))?;

        let mut blurred = Mat::default();
        imgproc::gaussian_blur(
            &lower,
            &mut blurred,
            Size::new(9, 9),
            1.5,
            0.0,
            core::BORDER_DEFAULT,
        )?;

        let mut circles: Vector<Vec3f> = Vector::new();
        imgproc::hough_circles(
            &blurred,
            &mut circles,
            imgproc::HOUGH_GRADIENT,
            HOUGH_DP,
            HOUGH_MIN_DIST,
            HOUGH_PARAM1,
            HOUGH_PARAM2,
            HOUGH_MIN_RADIUS,
            HOUGH_MAX_RADIUS,
        )?;

        for circle in circles.iter() {
            let cx = circle[0].round() as i32;
            let cy = circle[1].round() as i32 + y0;
            let r = circle[2].round() as i32;

            let sample_y = cy.clamp(0, height - 1);
            let sample_x = cx.clamp(0, width - 1);
            let brightness = *gray.at_2d::<u8>(sample_y, sample_x)? as f64;

            let score = circle_score(brightness, r as f64);
            debug!(
                "frame {}: circle ({}, {}) r={} brightness={} score={:.1}",
                index, cx, cy, r, brightness, score
            );
            tracker.offer_hough(cx, cy, r, score, index);
        }

        // Fallback only while the primary detector has produced nothing.
        if circles.is_empty() && !tracker.has_hough() {
            scan_bright_blobs(&blurred, y0, width, height, index, &mut tracker)?;
        }
    }

    match tracker.into_best() {
        Some(candidate) => {
            info!(
                "Ball found at ({}, {}) r={} conf={:.2} (frame {})",
                candidate.cx, candidate.cy, candidate.r, candidate.confidence, candidate.source_frame
            );
            Ok(Some(candidate))
        }
        None => {
            warn!("No ball candidate in early frames, degrading to club-only");
            Ok(None)
        }
    }
}

fn scan_bright_blobs(
    blurred_lower: &Mat,
    y_offset: i32,
    frame_width: i32,
    frame_height: i32,
    frame_index: i64,
    tracker: &mut CandidateTracker,
) -> Result<()> {
    let mut thresholded = Mat::default();
    imgproc::threshold(
        blurred_lower,
        &mut thresholded,
        BLOB_INTENSITY_CUTOFF,
        255.0,
        imgproc::THRESH_BINARY,
    )?;

    let kernel =
        imgproc::get_structuring_element(imgproc::MORPH_RECT, Size::new(3, 3), Point::new(-1, -1))?;
    let mut opened = Mat::default();
    imgproc::morphology_ex(
        &thresholded,
        &mut opened,
        imgproc::MORPH_OPEN,
        &kernel,
        Point::new(-1, -1),
        1,
        core::BORDER_CONSTANT,
        imgproc::morphology_default_border_value()?,
    )?;

    let mut contours: Vector<Vector<Point>> = Vector::new();
    imgproc::find_contours(
        &opened,
        &mut contours,
        imgproc::RETR_EXTERNAL,
        imgproc::CHAIN_APPROX_SIMPLE,
        Point::new(0, 0),
    )?;

    for contour in contours.iter() {
        let area = imgproc::contour_area(&contour, false)?;
        if !(BLOB_AREA_MIN..=BLOB_AREA_MAX).contains(&area) {
            continue;
        }
        let bounds = imgproc::bounding_rect(&contour)?;
        let cx = bounds.x + bounds.width / 2;
        let cy = bounds.y + bounds.height / 2 + y_offset;
        let r = bounds.width.max(bounds.height) / 2;

        let score = blob_score(cx, cy, frame_width, frame_height);
        debug!(
            "frame {}: bright blob ({}, {}) area={:.0} score={:.1}",
            frame_index, cx, cy, area, score
        );
        tracker.offer_fallback(cx, cy, r, score, frame_index);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logistic_confidence_bounds_and_midpoint() {
        assert!((logistic_confidence(0.0) - 0.5).abs() < 1e-12);
        assert!(logistic_confidence(1000.0) <= 1.0);
        assert!(logistic_confidence(-1000.0) >= 0.0);
        assert!(logistic_confidence(200.0) > 0.99);
        assert!(logistic_confidence(-200.0) < 0.01);
    }

    #[test]
    fn test_logistic_confidence_monotone_in_score() {
        let scores = [-50.0, -10.0, 0.0, 10.0, 50.0, 200.0];
        for pair in scores.windows(2) {
            assert!(logistic_confidence(pair[0]) < logistic_confidence(pair[1]));
        }
    }

    #[test]
    fn test_circle_score_favors_bright_and_small() {
        assert!(circle_score(250.0, 4.0) > circle_score(250.0, 16.0));
        assert!(circle_score(250.0, 8.0) > circle_score(180.0, 8.0));
    }

    #[test]
    fn test_blob_score_peaks_at_lower_middle() {
        let center = blob_score(320, 384, 640, 480); // (0.50w, 0.80h)
        assert!((center - 50.0).abs() < 1e-9);
        assert!(blob_score(320, 100, 640, 480) < center);
        assert!(blob_score(10, 384, 640, 480) < center);
    }

    #[test]
    fn test_hough_beats_fallback_regardless_of_score() {
        let mut tracker = CandidateTracker::default();
        tracker.offer_fallback(300, 400, 5, 49.0, 0);
        tracker.offer_hough(320, 380, 4, 10.0, 3);
        let best = tracker.into_best().unwrap();
        assert_eq!((best.cx, best.cy), (320, 380));
        assert_eq!(best.source_frame, 3);
    }

    #[test]
    fn test_tie_breaks_to_first_found() {
        let mut tracker = CandidateTracker::default();
        tracker.offer_hough(100, 100, 4, 200.0, 0);
        tracker.offer_hough(200, 200, 4, 200.0, 5);
        let best = tracker.into_best().unwrap();
        assert_eq!(best.cx, 100);
    }

    #[test]
    fn test_reported_radius_has_floor() {
        let mut tracker = CandidateTracker::default();
        tracker.offer_hough(100, 100, 2, 200.0, 0);
        assert_eq!(tracker.into_best().unwrap().r, 6);
    }

    #[test]
    fn test_empty_tracker_yields_nothing() {
        assert!(CandidateTracker::default().into_best().is_none());
    }

    #[test]
    fn test_sample_indices_are_sorted_unique_and_bounded() {
        let indices = sample_indices(300, 45);
        assert_eq!(indices[0], 0);
        for pair in indices.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert!(*indices.last().unwrap() < 45);

        // Short video: never index past the end.
        let short = sample_indices(10, 45);
        assert!(*short.last().unwrap() < 10);
    }
}
