//! Synthetic frames shaped like real rig output, for offline tests
//!
//! Eye cameras deliver single-channel infrared images; the world camera
//! delivers RGB.

use crate::types::{CameraFrame, PixelLayout, RawFrame};

/// Infrared eye image: dark background with a bright glint that drifts per frame
pub fn synthetic_eye_frame(frame_number: u64, width: u32, height: u32) -> RawFrame {
    let mut data = vec![24u8; (width * height) as usize];

    let cx = (width / 2 + (frame_number % 16) as u32).min(width.saturating_sub(1));
    let cy = height / 2;
    let radius = (width.min(height) / 10).max(1) as i64;
    for y in 0..height {
        for x in 0..width {
            let dx = x as i64 - cx as i64;
            let dy = y as i64 - cy as i64;
            if dx * dx + dy * dy <= radius * radius {
                data[(y * width + x) as usize] = 230;
            }
        }
    }

    RawFrame::new(data, width, height, PixelLayout::Gray8)
}

/// RGB gradient that changes every frame
pub fn synthetic_world_frame(frame_number: u64, width: u32, height: u32) -> RawFrame {
    let mut data = vec![0u8; (width * height * 3) as usize];

    let base = (frame_number % 256) as u8;
    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 3) as usize;
            data[idx] = base.wrapping_add((x % 256) as u8);
            data[idx + 1] = base.wrapping_add((y % 256) as u8);
            data[idx + 2] = base.wrapping_add(((x + y) % 256) as u8);
        }
    }

    RawFrame::new(data, width, height, PixelLayout::Rgb8)
}

/// Published frame for `camera_id`, eye-shaped for ids starting with "eye"
pub fn synthetic_camera_frame(
    camera_id: &str,
    frame_number: u64,
    width: u32,
    height: u32,
) -> CameraFrame {
    let raw = if camera_id.starts_with("eye") {
        synthetic_eye_frame(frame_number, width, height)
    } else {
        synthetic_world_frame(frame_number, width, height)
    };
    CameraFrame::new(raw, camera_id)
}

/// Characteristics of the reference headset
pub struct RigCharacteristics {
    pub eye_resolution: (u32, u32),
    pub eye_fps: f64,
    pub world_resolution: (u32, u32),
    pub world_fps: f64,
    pub eye_device_name: &'static str,
    pub world_device_name: &'static str,
}

impl Default for RigCharacteristics {
    fn default() -> Self {
        Self {
            eye_resolution: (400, 400),
            eye_fps: 60.0,
            world_resolution: (640, 480),
            world_fps: 30.0,
            eye_device_name: "Pupil Cam2 ID0",
            world_device_name: "XGIMI Camera",
        }
    }
}
