// src/phases.rs
//
// Anchors the P1-P9 swing phases around the impact frame with a fixed offset
// table. P7 is impact itself; the other offsets are spaced for a typical
// full swing and clamped to the video bounds.

use serde::Serialize;

pub const PHASE_OFFSETS: [i64; 9] = [-60, -45, -30, -15, 0, 10, 20, 35, 55];

#[derive(Debug, Clone, Serialize)]
pub struct PhaseFrame {
    pub p: u8,
    pub label: String,
    pub frame: i64,
}

#[derive(Debug, Serialize)]
pub struct PhaseArtifact {
    pub video: String,
    pub fps: f64,
    pub total_frames: i64,
    pub impact_frame: i64,
    pub frames: Vec<PhaseFrame>,
}

pub fn derive_phase_frames(impact_frame: i64, frame_count: i64) -> Vec<PhaseFrame> {
    let last = (frame_count - 1).max(0);
    let impact = impact_frame.clamp(0, last);

    PHASE_OFFSETS
        .iter()
        .enumerate()
        .map(|(i, offset)| {
            let p = (i + 1) as u8;
            PhaseFrame {
                p,
                label: format!("P{}", p),
                frame: (impact + offset).clamp(0, last),
            }
        })
        .collect()
}
