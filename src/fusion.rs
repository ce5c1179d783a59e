// src/fusion.rs
//
// Reconciles the ball-departure event and the club motion peak into one
// impact-frame estimate with an explainable rule tag.

use crate::types::{ClubPeak, DetectorConfig, FuseRule, ImpactEvent};
use tracing::info;

#[derive(Debug, Clone, Copy)]
pub struct FusedImpact {
    pub impact_frame: i64,
    pub rule: FuseRule,
    pub ball_conf: f64,
    pub club_conf: f64,
}

/// How far the event strength sits above the adaptive threshold, rescaled to
/// `[0, 1]` relative to the threshold itself.
pub fn ball_confidence(event: Option<&ImpactEvent>, threshold: f64) -> f64 {
    match event {
        Some(e) => ((e.strength - threshold) / threshold.max(1e-6)).clamp(0.0, 1.0),
        None => 0.0,
    }
}

/// Fixed linear rescaling of the raw peak value; deliberately not adaptive.
pub fn club_confidence(peak: &ClubPeak, config: &DetectorConfig) -> f64 {
    ((peak.peak_value - config.club_conf_offset) / config.club_conf_span).clamp(0.0, 1.0)
}

/// Applies the fusion rules in order: agreement within `agreement_frames`
/// averages the two indices; otherwise the higher-confidence cue wins, with
/// club always preferred when the ball event is absent.
pub fn fuse(
    event: Option<&ImpactEvent>,
    threshold: f64,
    peak: &ClubPeak,
    config: &DetectorConfig,
) -> FusedImpact {
    let ball_conf = ball_confidence(event, threshold);
    let club_conf = club_confidence(peak, config);

    let (impact_frame, rule) = match event {
        Some(e) if (e.frame_index - peak.frame_index).abs() <= config.agreement_frames => {
            let mean = ((e.frame_index + peak.frame_index) as f64 / 2.0).round() as i64;
            (mean, FuseRule::MeanBallClub)
        }
        Some(e) if ball_conf >= club_conf => (e.frame_index, FuseRule::BallPreferred),
        _ => (peak.frame_index, FuseRule::ClubPreferred),
    };

    info!(
        "Fused impact frame {} via {} (ball_conf={:.2}, club_conf={:.2})",
        impact_frame,
        rule.as_str(),
        ball_conf,
        club_conf
    );

    FusedImpact {
        impact_frame,
        rule,
        ball_conf,
        club_conf,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DetectorConfig {
        DetectorConfig::default()
    }

    fn event(frame: i64, strength: f64) -> ImpactEvent {
        ImpactEvent {
            frame_index: frame,
            strength,
        }
    }

    fn peak(frame: i64, value: f64) -> ClubPeak {
        ClubPeak {
            frame_index: frame,
            peak_value: value,
        }
    }

    #[test]
    fn test_agreement_averages_and_rounds() {
        let e = event(100, 0.08);
        let p = peak(101, 0.09);
        let fused = fuse(Some(&e), 0.02, &p, &config());
        assert_eq!(fused.rule, FuseRule::MeanBallClub);
        // mean(100, 101) = 100.5 rounds away from zero
        assert_eq!(fused.impact_frame, 101);
    }

    #[test]
    fn test_agreement_boundary_is_inclusive() {
        let e = event(100, 0.08);
        let fused = fuse(Some(&e), 0.02, &peak(103, 0.09), &config());
        assert_eq!(fused.rule, FuseRule::MeanBallClub);
        let fused = fuse(Some(&e), 0.02, &peak(104, 0.09), &config());
        assert_ne!(fused.rule, FuseRule::MeanBallClub);
    }

    #[test]
    fn test_absent_ball_always_prefers_club() {
        let fused = fuse(None, 0.015, &peak(120, 0.08), &config());
        assert_eq!(fused.rule, FuseRule::ClubPreferred);
        assert_eq!(fused.impact_frame, 120);
        assert_eq!(fused.ball_conf, 0.0);
    }

    #[test]
    fn test_disagreement_picks_higher_confidence() {
        // Strong ball (4x over threshold -> conf 1.0), weak club peak.
        let e = event(90, 0.10);
        let fused = fuse(Some(&e), 0.02, &peak(140, 0.015), &config());
        assert_eq!(fused.rule, FuseRule::BallPreferred);
        assert_eq!(fused.impact_frame, 90);

        // Barely-over-threshold ball, strong club peak.
        let e = event(90, 0.021);
        let fused = fuse(Some(&e), 0.02, &peak(140, 0.2), &config());
        assert_eq!(fused.rule, FuseRule::ClubPreferred);
        assert_eq!(fused.impact_frame, 140);
    }

    #[test]
    fn test_confidences_stay_in_unit_interval() {
        let cases = [
            (Some(event(10, 0.0)), 0.0, peak(0, 0.0)),
            (Some(event(10, 1.0)), 1e-9, peak(0, 1.0)),
            (Some(event(10, -1.0)), 0.02, peak(0, -1.0)),
            (None, 0.015, peak(0, 0.5)),
        ];
        for (e, thr, p) in cases {
            let fused = fuse(e.as_ref(), thr, &p, &config());
            assert!((0.0..=1.0).contains(&fused.ball_conf));
            assert!((0.0..=1.0).contains(&fused.club_conf));
        }
    }

    #[test]
    fn test_club_confidence_rescaling_endpoints() {
        let cfg = config();
        assert_eq!(club_confidence(&peak(0, 0.005), &cfg), 0.0);
        assert_eq!(club_confidence(&peak(0, 0.20), &cfg), 1.0);
        let mid = club_confidence(&peak(0, 0.06), &cfg);
        assert!((mid - 0.5).abs() < 1e-9);
    }
}
