// src/main.rs

mod ball_localizer;
mod baseline;
mod config;
mod debug_overlay;
mod detector;
mod error;
mod event_scanner;
mod fusion;
mod phases;
mod types;
mod video_source;

use anyhow::Result;
use phases::PhaseArtifact;
use std::path::Path;
use tracing::{error, info, warn};
use types::{Config, ImpactAnchorResult};
use video_source::VideoSource;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "impact_anchor=info".to_string()),
        )
        .init();

    info!("Impact Anchor Detector Starting");

    let config = Config::load("config.yaml")?;
    info!("Configuration loaded");
    info!(
        "Detector: early_frames={}, ball_box={}, club_box={}, mad_k={:.1}, floor={:.3}",
        config.detector.early_frame_count,
        config.detector.ball_box,
        config.detector.club_box,
        config.detector.mad_multiplier,
        config.detector.threshold_floor
    );

    let video_files = video_source::find_video_files(&config.video.input_dir)?;
    if video_files.is_empty() {
        error!("No video files found in {}", config.video.input_dir);
        std::process::exit(1);
    }

    std::fs::create_dir_all(&config.video.output_dir)?;

    let mut succeeded: usize = 0;
    let mut failed: usize = 0;
    let mut ball_found: usize = 0;

    for (idx, video_path) in video_files.iter().enumerate() {
        info!("========================================");
        info!(
            "Processing video {}/{}: {}",
            idx + 1,
            video_files.len(),
            video_path.display()
        );

        match process_video(video_path, &config) {
            Ok(result) => {
                succeeded += 1;
                if result.candidate.is_some() {
                    ball_found += 1;
                }
                info!(
                    "Video done: P7={} fuse={} ball_conf={:.2} club_conf={:.2}",
                    result.impact_frame,
                    result.fuse_rule.as_str(),
                    result.ball_conf,
                    result.club_conf
                );
            }
            Err(e) => {
                failed += 1;
                error!("Failed to process {}: {}", video_path.display(), e);
            }
        }
    }

    info!("Final Report:");
    info!("  Videos processed: {}", succeeded);
    info!("  Videos failed: {}", failed);
    info!("  Ball detected in: {}/{}", ball_found, succeeded);

    if succeeded == 0 {
        error!("All videos failed");
        std::process::exit(1);
    }

    Ok(())
}

fn process_video(video_path: &Path, config: &Config) -> Result<ImpactAnchorResult> {
    let mut source = VideoSource::open(video_path, config.detector.fps_hint)?;

    let result = detector::run(&mut source, &config.detector)?;

    // Artifacts are written only after a fully successful run; a hard
    // failure above leaves no partial JSON behind.
    write_artifacts(&result, config)?;

    if config.video.save_debug_frames {
        if let Err(e) =
            debug_overlay::save_key_frames(&mut source, &result, Path::new(&config.video.output_dir))
        {
            warn!("Debug overlay failed (result unaffected): {}", e);
        }
    }

    Ok(result)
}

fn write_artifacts(result: &ImpactAnchorResult, config: &Config) -> Result<()> {
    let stem = Path::new(&result.video)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "video".to_string());
    let out_dir = Path::new(&config.video.output_dir);

    let anchor_path = out_dir.join(format!("{}_impact_anchor.json", stem));
    let anchor_json = serde_json::to_string_pretty(&result.to_artifact())?;
    std::fs::write(&anchor_path, anchor_json)?;
    info!("Wrote {}", anchor_path.display());

    let phase_frames = phases::derive_phase_frames(result.impact_frame, result.meta.frame_count);
    let phase_artifact = PhaseArtifact {
        video: result.video.clone(),
        fps: result.meta.fps,
        total_frames: result.meta.frame_count,
        impact_frame: result.impact_frame,
        frames: phase_frames,
    };
    let phases_path = out_dir.join(format!("{}_phases.json", stem));
    std::fs::write(&phases_path, serde_json::to_string_pretty(&phase_artifact)?)?;
    info!("Wrote {}", phases_path.display());

    Ok(())
}
