//! Core data model shared by the device registry, camera streams and the
//! recording director.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Physical-access strategy used to open a camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMethod {
    /// Generic OS capture, opened by device index
    Generic,
    /// USB Video Class capture, opened by device uid
    Uvc,
}

/// Clockwise rotation applied to every captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    Clockwise90,
    Rotate180,
    Clockwise270,
}

impl Rotation {
    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::Clockwise90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Clockwise270 => 270,
        }
    }

    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            90 => Some(Rotation::Clockwise90),
            180 => Some(Rotation::Rotate180),
            270 => Some(Rotation::Clockwise270),
            _ => None,
        }
    }
}

/// Orientation correction, applied as rotate-then-flip
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameTransform {
    pub rotation: Option<Rotation>,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

impl FrameTransform {
    pub fn rotate(rotation: Rotation) -> Self {
        Self {
            rotation: Some(rotation),
            ..Self::default()
        }
    }

    pub fn flip(horizontal: bool, vertical: bool) -> Self {
        Self {
            rotation: None,
            flip_horizontal: horizontal,
            flip_vertical: vertical,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.rotation.is_none() && !self.flip_horizontal && !self.flip_vertical
    }
}

/// Resolution and framerate of a device mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureMode {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl CaptureMode {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self { width, height, fps }
    }
}

/// Static description of one logical camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub camera_id: String,
    pub device_index: u32,
    pub display_name: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub fps: f64,
    /// FourCC hint, e.g. "MJPG"
    pub pixel_format: Option<String>,
    pub transform: FrameTransform,
    pub access_method: AccessMethod,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub serial_number: Option<String>,
    pub device_uid: Option<String>,
    pub device_address: Option<u32>,
}

impl CameraConfig {
    /// Generic-capture camera with a 640x480@30 request
    pub fn new(
        camera_id: impl Into<String>,
        device_index: u32,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            camera_id: camera_id.into(),
            device_index,
            display_name: display_name.into(),
            frame_width: 640,
            frame_height: 480,
            fps: 30.0,
            pixel_format: None,
            transform: FrameTransform::default(),
            access_method: AccessMethod::Generic,
            vendor_id: None,
            product_id: None,
            serial_number: None,
            device_uid: None,
            device_address: None,
        }
    }

    pub fn with_mode(mut self, width: u32, height: u32, fps: f64) -> Self {
        self.frame_width = width;
        self.frame_height = height;
        self.fps = fps;
        self
    }

    pub fn with_pixel_format(mut self, fourcc: impl Into<String>) -> Self {
        self.pixel_format = Some(fourcc.into());
        self
    }

    pub fn with_transform(mut self, transform: FrameTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Switch to UVC access, pinned to the identity of `device`
    pub fn with_uvc_device(mut self, device: &DeviceDescriptor) -> Self {
        self.access_method = AccessMethod::Uvc;
        self.vendor_id = Some(device.vendor_id);
        self.product_id = Some(device.product_id);
        self.device_uid = Some(device.uid.clone());
        self.device_address = Some(device.address);
        self
    }

    pub fn requested_mode(&self) -> CaptureMode {
        CaptureMode::new(self.frame_width, self.frame_height, self.fps)
    }
}

/// Physical capture device as reported by UVC enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub uid: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial: Option<String>,
    pub address: u32,
    pub name: String,
}

/// Pixel layout of frame data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelLayout {
    Gray8,
    Rgb8,
}

impl PixelLayout {
    pub fn channels(&self) -> u32 {
        match self {
            PixelLayout::Gray8 => 1,
            PixelLayout::Rgb8 => 3,
        }
    }
}

/// Decoded frame as delivered by a device handle
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
}

impl RawFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, layout: PixelLayout) -> Self {
        Self {
            data,
            width,
            height,
            layout,
        }
    }

    pub fn expected_len(&self) -> usize {
        (self.width * self.height * self.layout.channels()) as usize
    }
}

/// Frame published by a camera stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraFrame {
    pub id: String,
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub timestamp: DateTime<Utc>,
    pub camera_id: String,
}

impl CameraFrame {
    pub fn new(raw: RawFrame, camera_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            data: raw.data,
            width: raw.width,
            height: raw.height,
            layout: raw.layout,
            timestamp: Utc::now(),
            camera_id: camera_id.into(),
        }
    }

    pub fn shape(&self) -> FrameShape {
        FrameShape {
            height: self.height,
            width: self.width,
            channels: self.layout.channels(),
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Seconds since the Unix epoch at which the frame was captured
    pub fn epoch_seconds(&self) -> f64 {
        self.timestamp.timestamp_micros() as f64 / 1_000_000.0
    }
}

/// (height, width, channels) of a frame, used for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameShape {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
}

/// Point-in-time status of one camera
#[derive(Debug, Clone, Serialize)]
pub struct CameraStatus {
    pub config: CameraConfig,
    pub running: bool,
    /// Wall-clock seconds of the latest publish, 0.0 if none
    pub timestamp: f64,
}
