//! Recording parameter and result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Parameters for one per-camera encoder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Video width in pixels
    pub width: u32,
    /// Video height in pixels
    pub height: u32,
    /// Frames per second
    pub fps: f64,
    /// Target bitrate in bits per second
    pub bitrate: u32,
    /// Enable fast-start (moov before mdat)
    pub fast_start: bool,
    /// Optional title metadata
    pub title: Option<String>,
}

impl EncoderConfig {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            fps,
            bitrate: default_bitrate(width, height),
            fast_start: true,
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }
}

/// Roughly 4 bits per pixel per second at 30 fps, at least 1 Mbps
fn default_bitrate(width: u32, height: u32) -> u32 {
    (width.saturating_mul(height).saturating_mul(4)).max(1_000_000)
}

/// Statistics returned after finishing one camera's file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingStats {
    pub camera_id: String,
    /// Total number of video frames written
    pub video_frames: u64,
    /// Duration in seconds
    pub duration_secs: f64,
    /// Total bytes written to file
    pub bytes_written: u64,
    /// Ticks where the camera had no frame or the wrong size
    pub skipped_ticks: u64,
    pub output_path: String,
}

impl RecordingStats {
    /// Calculate the average bitrate achieved
    pub fn avg_bitrate(&self) -> f64 {
        if self.duration_secs > 0.0 {
            (self.bytes_written as f64 * 8.0) / self.duration_secs
        } else {
            0.0
        }
    }
}

/// Externally visible state of the recording director
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecordingStatus {
    pub active: bool,
    pub directory: Option<PathBuf>,
    pub camera_ids: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
}
