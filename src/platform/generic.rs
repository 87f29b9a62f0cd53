use super::{DeviceHandle, IndexedBackend};
use crate::errors::{Result, RigError};
use crate::types::{CaptureMode, PixelLayout, RawFrame};
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{
        CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
    },
    Camera,
};
use std::time::Duration;

/// Generic OS capture through nokhwa
pub struct NokhwaBackend;

impl IndexedBackend for NokhwaBackend {
    fn open_index(&self, index: u32, pixel_format: Option<&str>) -> Result<Box<dyn DeviceHandle>> {
        let format =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let camera = Camera::new(CameraIndex::Index(index), format).map_err(|e| {
            RigError::DeviceUnavailable(format!("Failed to open camera index {}: {}", index, e))
        })?;

        log::debug!("Opened camera index {} ({})", index, camera.info().human_name());
        Ok(Box::new(NokhwaHandle {
            camera,
            index,
            frame_format: frame_format(pixel_format),
            streaming: false,
        }))
    }
}

fn frame_format(fourcc: Option<&str>) -> FrameFormat {
    match fourcc.map(|s| s.to_ascii_uppercase()).as_deref() {
        Some("YUYV") => FrameFormat::YUYV,
        Some("GREY") | Some("GRAY") => FrameFormat::GRAY,
        Some("NV12") => FrameFormat::NV12,
        _ => FrameFormat::MJPEG,
    }
}

struct NokhwaHandle {
    camera: Camera,
    index: u32,
    frame_format: FrameFormat,
    streaming: bool,
}

// nokhwa's Camera holds platform handles that are not marked Send; the
// handle is only ever touched from its acquisition thread.
unsafe impl Send for NokhwaHandle {}

impl NokhwaHandle {
    fn ensure_streaming(&mut self) -> Result<()> {
        if !self.streaming {
            self.camera.open_stream().map_err(|e| {
                RigError::DeviceUnavailable(format!(
                    "Failed to start stream on camera index {}: {}",
                    self.index, e
                ))
            })?;
            self.streaming = true;
        }
        Ok(())
    }
}

impl DeviceHandle for NokhwaHandle {
    fn set_mode(&mut self, mode: CaptureMode) -> Result<CaptureMode> {
        let requested = CameraFormat::new(
            Resolution::new(mode.width, mode.height),
            self.frame_format,
            mode.fps.round().max(1.0) as u32,
        );
        let applied = self
            .camera
            .set_camera_requset(RequestedFormat::new::<RgbFormat>(
                RequestedFormatType::Closest(requested),
            ))
            .map_err(|e| {
                RigError::DeviceUnavailable(format!(
                    "Failed to set {}x{}@{} on camera index {}: {}",
                    mode.width, mode.height, mode.fps, self.index, e
                ))
            })?;

        Ok(CaptureMode::new(
            applied.resolution().width(),
            applied.resolution().height(),
            applied.frame_rate() as f64,
        ))
    }

    // nokhwa reads block until a frame arrives, so `timeout` is advisory
    fn get_frame(&mut self, _timeout: Duration) -> Result<Option<RawFrame>> {
        self.ensure_streaming()?;

        let buffer = self
            .camera
            .frame()
            .map_err(|e| {
                RigError::Capture(format!("Failed to read camera index {}: {}", self.index, e))
            })?;
        let image = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| RigError::Capture(format!("Failed to decode frame: {}", e)))?;

        let (width, height) = image.dimensions();
        Ok(Some(RawFrame::new(image.into_raw(), width, height, PixelLayout::Rgb8)))
    }

    fn close(&mut self) {
        if self.streaming {
            if let Err(e) = self.camera.stop_stream() {
                log::warn!("Failed to stop camera index {}: {}", self.index, e);
            }
            self.streaming = false;
        }
    }
}
