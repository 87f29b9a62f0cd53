//! MJPEG live preview framing.
//!
//! Frames are JPEG-encoded and wrapped as `multipart/x-mixed-replace`
//! parts with the boundary [`BOUNDARY`]. Serving the parts is left to the
//! caller's HTTP layer.

use crate::config::PreviewSettings;
use crate::errors::{Result, RigError};
use crate::types::{CameraFrame, PixelLayout};
use bytes::{BufMut, Bytes, BytesMut};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::time::Duration;
use tokio::time::{sleep, Instant};

pub const BOUNDARY: &str = "frame";

/// `Content-Type` header value for a preview response
pub fn content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", BOUNDARY)
}

pub fn encode_jpeg(frame: &CameraFrame, quality: u8) -> Result<Vec<u8>> {
    let color = match frame.layout {
        PixelLayout::Gray8 => ExtendedColorType::L8,
        PixelLayout::Rgb8 => ExtendedColorType::Rgb8,
    };
    let expected = (frame.width * frame.height * frame.layout.channels()) as usize;
    if frame.data.len() != expected {
        return Err(RigError::Encoding(format!(
            "Frame {} has {} bytes, expected {} for {}x{}",
            frame.id,
            frame.data.len(),
            expected,
            frame.width,
            frame.height
        )));
    }

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode(&frame.data, frame.width, frame.height, color)
        .map_err(|e| RigError::Encoding(format!("JPEG encoding failed: {}", e)))?;
    Ok(jpeg)
}

/// One multipart part: boundary line, headers, JPEG body
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        jpeg.len()
    );
    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// Paced stream of preview parts.
///
/// `source` yields the latest frame. `Ok(None)` means no frame yet and is
/// re-polled; an error (unknown camera, algorithm stopped) ends the stream.
/// Parts are spaced at the slower of the camera rate, `max_fps` and 30 Hz.
pub struct MjpegPreview<F> {
    source: F,
    settings: PreviewSettings,
    interval: Duration,
    last_part: Option<Instant>,
    last_frame_id: Option<String>,
    finished: bool,
}

impl<F> MjpegPreview<F>
where
    F: FnMut() -> Result<Option<CameraFrame>> + Send,
{
    pub fn new(source: F, settings: PreviewSettings, camera_fps: f64) -> Self {
        Self {
            source,
            interval: settings.frame_interval(camera_fps),
            settings,
            last_part: None,
            last_frame_id: None,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Wait for the next part; `None` once the stream has ended
    pub async fn next_part(&mut self) -> Option<Bytes> {
        if self.finished {
            return None;
        }
        if let Some(last) = self.last_part {
            let due = last + self.interval;
            if due > Instant::now() {
                tokio::time::sleep_until(due).await;
            }
        }

        loop {
            let frame = match (self.source)() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    sleep(self.settings.repoll_interval()).await;
                    continue;
                }
                Err(e) => {
                    log::info!("Preview ended: {}", e);
                    self.finished = true;
                    return None;
                }
            };

            // the slot has not been refreshed since the previous part
            if self.last_frame_id.as_deref() == Some(frame.id.as_str()) {
                sleep(self.settings.repoll_interval()).await;
                continue;
            }

            match encode_jpeg(&frame, self.settings.jpeg_quality) {
                Ok(jpeg) => {
                    self.last_part = Some(Instant::now());
                    self.last_frame_id = Some(frame.id);
                    return Some(multipart_part(&jpeg));
                }
                Err(e) => {
                    log::warn!("Skipping preview frame from {}: {}", frame.camera_id, e);
                    sleep(self.settings.repoll_interval()).await;
                }
            }
        }
    }
}
