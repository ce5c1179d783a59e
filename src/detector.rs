// src/detector.rs
//
// One deterministic pass over a single video: ball localization, baseline
// noise estimation, the two event scans, and confidence fusion. The source
// is exclusively owned for the duration of the run; nothing is shared
// across invocations.

use crate::error::DetectError;
use crate::types::{BaselineStats, DetectorConfig, ImpactAnchorResult, Region};
use crate::video_source::VideoSource;
use crate::{ball_localizer, baseline, event_scanner, fusion};
use anyhow::Result;
use tracing::{info, warn};

// Club ROI when no ball was found: the central area where the swing happens.
const DEGRADED_CLUB_ROI: (f64, f64, f64, f64) = (0.25, 0.20, 0.75, 0.85);

pub fn run(source: &mut VideoSource, config: &DetectorConfig) -> Result<ImpactAnchorResult> {
    let meta = source.meta;
    let frame_count = meta.frame_count;

    let candidate = ball_localizer::locate(source, config)?;

    let (ball_roi, club_roi) = match candidate {
        Some(c) => {
            let ball = non_empty_or_full(
                Region::centered(c.cx, c.cy, config.ball_box, meta.width, meta.height),
                meta,
            );
            let club = non_empty_or_full(
                Region::centered(c.cx, c.cy, config.club_box, meta.width, meta.height),
                meta,
            );
            (ball, club)
        }
        None => {
            let (fx1, fy1, fx2, fy2) = DEGRADED_CLUB_ROI;
            (
                Region::full(meta.width, meta.height),
                Region::fractional(fx1, fy1, fx2, fy2, meta.width, meta.height),
            )
        }
    };

    let (stats, threshold, ball_event) = match candidate {
        Some(_) => {
            let (stats, threshold) = baseline::estimate(source, &ball_roi, config)?;
            let event = event_scanner::detect_ball_event(source, &ball_roi, threshold, config)?;
            (stats, threshold, event)
        }
        None => (BaselineStats::default(), config.threshold_floor, None),
    };

    let window = event_scanner::derive_scan_window(
        ball_event.as_ref(),
        frame_count,
        config.club_window_frames,
    );
    let (club_peak, pairs_read) =
        event_scanner::detect_club_peak(source, &club_roi, &window, config)?;

    if pairs_read == 0 && ball_event.is_none() {
        return Err(DetectError::NoMotionSignal(format!(
            "too few frames ({}) or no readable motion",
            frame_count
        ))
        .into());
    }

    let fused = fusion::fuse(ball_event.as_ref(), threshold, &club_peak, config);

    let impact_frame = fused.impact_frame.clamp(0, frame_count - 1);
    if impact_frame != fused.impact_frame {
        warn!(
            "Fused impact frame {} clamped to {}",
            fused.impact_frame, impact_frame
        );
    }

    info!(
        "Impact anchor: P7={} fuse={} ballEvent={:?} clubPeak={}",
        impact_frame,
        fused.rule.as_str(),
        ball_event.map(|e| e.frame_index),
        club_peak.frame_index
    );

    Ok(ImpactAnchorResult {
        video: source.path().to_string(),
        meta,
        candidate,
        ball_roi,
        club_roi,
        baseline: stats,
        threshold,
        ball_event,
        ball_conf: fused.ball_conf,
        club_peak,
        club_conf: fused.club_conf,
        impact_frame,
        fuse_rule: fused.rule,
    })
}

fn non_empty_or_full(region: Region, meta: crate::types::VideoMeta) -> Region {
    if region.is_empty() {
        warn!("Degenerate ROI {:?}, substituting full frame", region);
        Region::full(meta.width, meta.height)
    } else {
        region
    }
}
