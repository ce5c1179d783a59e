// src/error.rs
//
// Distinguished failure kinds of one detector run. Everything else degrades
// locally (missing ball, clamped region) and never surfaces as an error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    /// Cannot open the container or read frame 0.
    #[error("cannot open or read video: {0}")]
    VideoUnreadable(String),

    /// Both the container metadata and the ffprobe fallback failed to yield
    /// a frame count.
    #[error("could not determine frame count for {0} (opencv and ffprobe both failed)")]
    FrameCountUnknown(String),

    /// Neither the ball scan nor the club scan produced anything usable.
    #[error("no motion signal: {0}")]
    NoMotionSignal(String),
}
