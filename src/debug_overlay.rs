// src/debug_overlay.rs
//
// Optional diagnostic dumps for human inspection: the key frames of a run
// annotated with both ROIs and the ball center. Purely observational; has no
// influence on the numeric result.

use crate::types::{ImpactAnchorResult, Region};
use crate::video_source::VideoSource;
use anyhow::Result;
use opencv::{
    core::{Mat, Point, Scalar, Vector},
    imgcodecs, imgproc,
    prelude::*,
};
use std::path::Path;
use tracing::{debug, warn};

pub fn save_key_frames(
    source: &mut VideoSource,
    result: &ImpactAnchorResult,
    out_dir: &Path,
) -> Result<()> {
    let dbg_dir = out_dir.join("_dbg_impact");
    std::fs::create_dir_all(&dbg_dir)?;

    let mut frames: Vec<(&str, i64)> = vec![("frame0", 0)];
    if let Some(event) = result.ball_event {
        frames.push(("ball_event", event.frame_index));
    }
    frames.push(("club_peak", result.club_peak.frame_index));
    frames.push(("impact_final", result.impact_frame));

    for (name, index) in frames {
        if let Err(e) = save_annotated(source, result, &dbg_dir, name, index) {
            warn!("Debug frame {}@{} failed: {}", name, index, e);
        }
    }
    Ok(())
}

fn save_annotated(
    source: &mut VideoSource,
    result: &ImpactAnchorResult,
    dbg_dir: &Path,
    name: &str,
    index: i64,
) -> Result<()> {
    let Some(mut vis) = source.read_bgr(index)? else {
        debug!("Debug frame {} not readable, skipping", index);
        return Ok(());
    };

    let green = Scalar::new(0.0, 255.0, 0.0, 0.0);
    let blue = Scalar::new(255.0, 0.0, 0.0, 0.0);
    let white = Scalar::new(255.0, 255.0, 255.0, 0.0);

    draw_region(&mut vis, &result.ball_roi, green)?;
    draw_region(&mut vis, &result.club_roi, blue)?;

    if let Some(c) = result.candidate {
        imgproc::circle(
            &mut vis,
            Point::new(c.cx, c.cy),
            4,
            green,
            -1,
            imgproc::LINE_8,
            0,
        )?;
    }

    imgproc::put_text(
        &mut vis,
        name,
        Point::new(20, 30),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.9,
        white,
        2,
        imgproc::LINE_8,
        false,
    )?;

    let path = dbg_dir.join(format!("{}_{:04}.png", name, index));
    imgcodecs::imwrite(&path.to_string_lossy(), &vis, &Vector::new())?;
    debug!("Saved debug frame {}", path.display());
    Ok(())
}

fn draw_region(vis: &mut Mat, region: &Region, color: Scalar) -> Result<()> {
    imgproc::rectangle(vis, region.to_rect(), color, 2, imgproc::LINE_8, 0)?;
    Ok(())
}
