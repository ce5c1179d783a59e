// src/types.rs

use opencv::core::Rect;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub video: VideoConfig,
    pub detector: DetectorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    pub input_dir: String,
    pub output_dir: String,
    pub save_debug_frames: bool,
}

/// All tunable heuristic constants of the impact-anchor detector.
///
/// Defaults reproduce the calibrated values: a spike counts once the
/// changed-pixel fraction exceeds `median + mad_multiplier * MAD` (floored),
/// and must persist for `persistence_frames` consecutive frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Fallback FPS when the container reports none.
    pub fps_hint: f64,
    /// Number of head frames used for ball search and baseline noise.
    pub early_frame_count: i64,
    /// Side length of the square ROI centered on the ball (pixels).
    pub ball_box: i32,
    /// Side length of the wider ROI used for club motion (pixels).
    pub club_box: i32,
    /// k in `threshold = max(median + k * MAD, threshold_floor)`.
    pub mad_multiplier: f64,
    /// Absolute floor for the adaptive ball threshold.
    pub threshold_floor: f64,
    /// Grayscale intensity delta for a pixel to count as changed (ball ROI).
    pub ball_diff_cutoff: f64,
    /// Lower cutoff for the club ROI (more sensitive).
    pub club_diff_cutoff: f64,
    /// Consecutive qualifying frames required to accept a ball spike.
    pub persistence_frames: u32,
    /// Half-width of the club scan window around the ball event.
    pub club_window_frames: i64,
    /// Max frame distance for ball/club agreement fusion.
    pub agreement_frames: i64,
    /// Linear rescaling of club peak value into a confidence:
    /// `clamp((peak - club_conf_offset) / club_conf_span, 0, 1)`.
    pub club_conf_offset: f64,
    pub club_conf_span: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            fps_hint: 25.0,
            early_frame_count: 45,
            ball_box: 120,
            club_box: 280,
            mad_multiplier: 8.0,
            threshold_floor: 0.015,
            ball_diff_cutoff: 25.0,
            club_diff_cutoff: 20.0,
            persistence_frames: 2,
            club_window_frames: 30,
            agreement_frames: 3,
            club_conf_offset: 0.01,
            club_conf_span: 0.10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Axis-aligned pixel rectangle, half-open on the right/bottom edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Region {
    /// Square region of side `size` centered on `(cx, cy)`, clamped to the
    /// frame bounds.
    pub fn centered(cx: i32, cy: i32, size: i32, width: i32, height: i32) -> Self {
        let half = size / 2;
        Self {
            x1: cx - half,
            y1: cy - half,
            x2: cx + half,
            y2: cy + half,
        }
        .clamped(width, height)
    }

    /// Fractional region of the frame (used as the club ROI when no ball was
    /// found: central area where the swing happens).
    pub fn fractional(fx1: f64, fy1: f64, fx2: f64, fy2: f64, width: i32, height: i32) -> Self {
        Self {
            x1: (width as f64 * fx1) as i32,
            y1: (height as f64 * fy1) as i32,
            x2: (width as f64 * fx2) as i32,
            y2: (height as f64 * fy2) as i32,
        }
        .clamped(width, height)
    }

    pub fn full(width: i32, height: i32) -> Self {
        Self {
            x1: 0,
            y1: 0,
            x2: width.max(1),
            y2: height.max(1),
        }
    }

    pub fn clamped(&self, width: i32, height: i32) -> Self {
        Self {
            x1: self.x1.clamp(0, (width - 1).max(0)),
            y1: self.y1.clamp(0, (height - 1).max(0)),
            x2: self.x2.clamp(1, width.max(1)),
            y2: self.y2.clamp(1, height.max(1)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(self.x1, self.y1, self.x2 - self.x1, self.y2 - self.y1)
    }
}

/// Resting ball position found in the early frames. Produced once per run,
/// immutable afterwards; both ROIs are derived from its center.
#[derive(Debug, Clone, Copy)]
pub struct BallCandidate {
    pub cx: i32,
    pub cy: i32,
    pub r: i32,
    pub confidence: f64,
    pub source_frame: i64,
}

/// Robust noise statistics of the ball-ROI changed-pixel fraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineStats {
    pub median: f64,
    pub mad: f64,
}

/// First persistent motion spike in the ball ROI ("ball departure").
#[derive(Debug, Clone, Copy)]
pub struct ImpactEvent {
    pub frame_index: i64,
    pub strength: f64,
}

/// Frame of maximum motion energy in the club ROI.
#[derive(Debug, Clone, Copy)]
pub struct ClubPeak {
    pub frame_index: i64,
    pub peak_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuseRule {
    MeanBallClub,
    BallPreferred,
    ClubPreferred,
}

impl FuseRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            FuseRule::MeanBallClub => "mean(ball,club)",
            FuseRule::BallPreferred => "ball_preferred",
            FuseRule::ClubPreferred => "club_preferred",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct VideoMeta {
    pub fps: f64,
    pub frame_count: i64,
    #[serde(rename = "w")]
    pub width: i32,
    #[serde(rename = "h")]
    pub height: i32,
}

/// Terminal artifact of one detector run. Everything the pipeline measured
/// is kept for auditing; downstream phase extraction consumes only
/// `impact_frame`.
#[derive(Debug, Clone)]
pub struct ImpactAnchorResult {
    pub video: String,
    pub meta: VideoMeta,
    pub candidate: Option<BallCandidate>,
    pub ball_roi: Region,
    pub club_roi: Region,
    pub baseline: BaselineStats,
    pub threshold: f64,
    pub ball_event: Option<ImpactEvent>,
    pub ball_conf: f64,
    pub club_peak: ClubPeak,
    pub club_conf: f64,
    pub impact_frame: i64,
    pub fuse_rule: FuseRule,
}

// ---------------------------------------------------------------------------
// Persisted JSON schema (the hand-off contract to phase extraction)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct BallArtifact {
    pub cx: Option<i32>,
    pub cy: Option<i32>,
    pub r: Option<i32>,
    pub detect_conf: f64,
    pub roi_box: Region,
    pub baseline: f64,
    pub baseline_mad: f64,
    pub thr_ball: f64,
    pub event_frame: Option<i64>,
    pub event_strength: f64,
    pub event_conf: f64,
}

#[derive(Debug, Serialize)]
pub struct ClubArtifact {
    pub roi_box: Region,
    pub peak_frame: i64,
    pub peak_val: f64,
    pub conf: f64,
}

#[derive(Debug, Serialize)]
pub struct ImpactArtifact {
    #[serde(rename = "P7_frame")]
    pub p7_frame: i64,
    pub fuse: String,
}

#[derive(Debug, Serialize)]
pub struct ImpactAnchorArtifact {
    pub video: String,
    pub meta: VideoMeta,
    pub ball: BallArtifact,
    pub club: ClubArtifact,
    pub impact: ImpactArtifact,
}

impl ImpactAnchorResult {
    pub fn to_artifact(&self) -> ImpactAnchorArtifact {
        ImpactAnchorArtifact {
            video: self.video.clone(),
            meta: self.meta,
            ball: BallArtifact {
                cx: self.candidate.map(|c| c.cx),
                cy: self.candidate.map(|c| c.cy),
                r: self.candidate.map(|c| c.r),
                detect_conf: self.candidate.map(|c| c.confidence).unwrap_or(0.0),
                roi_box: self.ball_roi,
                baseline: self.baseline.median,
                baseline_mad: self.baseline.mad,
                thr_ball: self.threshold,
                event_frame: self.ball_event.map(|e| e.frame_index),
                event_strength: self.ball_event.map(|e| e.strength).unwrap_or(0.0),
                event_conf: self.ball_conf,
            },
            club: ClubArtifact {
                roi_box: self.club_roi,
                peak_frame: self.club_peak.frame_index,
                peak_val: self.club_peak.peak_value,
                conf: self.club_conf,
            },
            impact: ImpactArtifact {
                p7_frame: self.impact_frame,
                fuse: self.fuse_rule.as_str().to_string(),
            },
        }
    }
}
