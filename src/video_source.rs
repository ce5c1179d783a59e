// src/video_source.rs

use crate::error::DetectError;
use crate::types::VideoMeta;
use anyhow::Result;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.iter().any(|v| ext.eq_ignore_ascii_case(v)))
}

/// Recursively collect the video files under `input_dir`, sorted by path so
/// batch runs are deterministic.
pub fn find_video_files(input_dir: &str) -> Result<Vec<PathBuf>> {
    let mut videos: Vec<PathBuf> = WalkDir::new(input_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| is_video_file(p))
        .collect();
    videos.sort();

    info!("Found {} video files", videos.len());
    Ok(videos)
}

/// Exclusively-owned, seekable view over one video file. Seeking is not
/// thread-safe; parallel runs must each open their own source.
pub struct VideoSource {
    cap: VideoCapture,
    pub meta: VideoMeta,
    path: String,
}

impl VideoSource {
    pub fn open(path: &Path, fps_hint: f64) -> Result<Self> {
        let path_str = path.to_string_lossy().to_string();
        info!("Opening video: {}", path.display());

        let cap = VideoCapture::from_file(&path_str, videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            return Err(DetectError::VideoUnreadable(path_str).into());
        }

        let mut fps = cap.get(videoio::CAP_PROP_FPS)?;
        if fps <= 0.0 {
            fps = if fps_hint > 0.0 { fps_hint } else { 25.0 };
            warn!("Container reports no FPS, using {:.1}", fps);
        }

        let mut frame_count = cap.get(videoio::CAP_PROP_FRAME_COUNT)? as i64;
        if frame_count <= 0 {
            warn!("Container reports no frame count, probing with ffprobe");
            frame_count = probe_frame_count(&path_str, fps)
                .ok_or_else(|| DetectError::FrameCountUnknown(path_str.clone()))?;
        }

        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

        info!(
            "Video properties: {}x{} @ {:.1} FPS, {} frames",
            width, height, fps, frame_count
        );

        let mut source = Self {
            cap,
            meta: VideoMeta {
                fps,
                frame_count,
                width,
                height,
            },
            path: path_str.clone(),
        };

        // Frame 0 must be readable or the whole run is pointless.
        if source.read_bgr(0)?.is_none() {
            return Err(DetectError::VideoUnreadable(path_str).into());
        }

        Ok(source)
    }

    /// Seek to `index` and decode one BGR frame. `None` past end of stream.
    pub fn read_bgr(&mut self, index: i64) -> Result<Option<Mat>> {
        self.cap.set(videoio::CAP_PROP_POS_FRAMES, index as f64)?;

        let mut mat = Mat::default();
        if !self.cap.read(&mut mat)? || mat.empty() {
            return Ok(None);
        }
        Ok(Some(mat))
    }

    /// Seek to `index` and decode one grayscale frame.
    pub fn read_gray(&mut self, index: i64) -> Result<Option<Mat>> {
        let Some(bgr) = self.read_bgr(index)? else {
            return Ok(None);
        };
        let mut gray = Mat::default();
        imgproc::cvt_color(&bgr, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
        Ok(Some(gray))
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Ask ffprobe for the stream frame count when the container metadata is
/// missing or bogus. Falls back to duration * fps.
fn probe_frame_count(path: &str, fps: f64) -> Option<i64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-count_frames",
            "-show_entries",
            "stream=nb_read_frames,nb_frames,duration",
            "-of",
            "json",
            path,
        ])
        .output()
        .ok()?;

    if !output.status.success() {
        debug!("ffprobe exited with {}", output.status);
        return None;
    }

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).ok()?;
    let stream = parsed.get("streams")?.get(0)?;

    for key in ["nb_read_frames", "nb_frames"] {
        if let Some(n) = stream
            .get(key)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<f64>().ok())
        {
            if n > 0.0 {
                return Some(n as i64);
            }
        }
    }

    let duration = stream
        .get("duration")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<f64>().ok())?;
    if duration > 0.0 && fps > 0.0 {
        return Some((duration * fps).round() as i64);
    }
    None
}
