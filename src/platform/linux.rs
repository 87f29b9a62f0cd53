//! UVC capture through V4L2.
//!
//! USB identity (vendor, product, serial, bus and device number) is read
//! from sysfs next to each `/dev/videoN` node. The uid is `"bus:devnum"`,
//! stable while the device stays plugged into the same port.

use super::decode::{decode_buffer, SourceFormat};
use super::{DeviceHandle, UvcBackend};
use crate::errors::{Result, RigError};
use crate::types::{CaptureMode, DeviceDescriptor, RawFrame};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::frameinterval::FrameIntervalEnum;
use v4l::framesize::FrameSizeEnum;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

const BUFFER_COUNT: u32 = 4;

pub struct V4lUvcBackend;

impl V4lUvcBackend {
    /// Capture-capable nodes with a USB identity, one per physical device
    fn scan() -> Vec<(usize, DeviceDescriptor)> {
        let mut seen = BTreeSet::new();
        let mut found = Vec::new();

        for node in v4l::context::enum_devices() {
            let index = node.index();
            let device = match Device::new(index) {
                Ok(device) => device,
                Err(e) => {
                    log::debug!("Skipping /dev/video{}: {}", index, e);
                    continue;
                }
            };
            let caps = match device.query_caps() {
                Ok(caps) => caps,
                Err(e) => {
                    log::debug!("Skipping /dev/video{}: {}", index, e);
                    continue;
                }
            };
            if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
                continue;
            }

            let Some(identity) = usb_identity(index) else {
                log::debug!("Skipping /dev/video{}: not a USB device", index);
                continue;
            };
            let uid = format!("{}:{}", identity.bus, identity.address);
            if !seen.insert(uid.clone()) {
                continue;
            }

            found.push((
                index,
                DeviceDescriptor {
                    uid,
                    vendor_id: identity.vendor_id,
                    product_id: identity.product_id,
                    serial: identity.serial,
                    address: identity.address,
                    name: node.name().unwrap_or(caps.card),
                },
            ));
        }

        found
    }
}

impl UvcBackend for V4lUvcBackend {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        Ok(Self::scan().into_iter().map(|(_, d)| d).collect())
    }

    fn open(&self, uid: &str) -> Result<Box<dyn DeviceHandle>> {
        let index = Self::scan()
            .into_iter()
            .find(|(_, d)| d.uid == uid)
            .map(|(index, _)| index)
            .ok_or_else(|| RigError::DeviceUnavailable(format!("UVC device {} is gone", uid)))?;

        let device = Device::new(index).map_err(|e| {
            RigError::DeviceUnavailable(format!("Failed to open /dev/video{}: {}", index, e))
        })?;
        let format = device.format()?;

        Ok(Box::new(V4lHandle {
            device,
            stream: None,
            index,
            width: format.width,
            height: format.height,
            source: SourceFormat::from_fourcc(&format.fourcc.repr).unwrap_or(SourceFormat::Mjpeg),
        }))
    }
}

struct UsbIdentity {
    vendor_id: u16,
    product_id: u16,
    serial: Option<String>,
    bus: u32,
    address: u32,
}

fn usb_identity(index: usize) -> Option<UsbIdentity> {
    // .../usbX/X-Y/X-Y:1.0 is the interface; its parent carries the ids
    let interface = fs::canonicalize(format!("/sys/class/video4linux/video{}/device", index)).ok()?;
    let usb_device = interface.parent()?;
    let read = |name: &str| read_attr(usb_device, name);

    Some(UsbIdentity {
        vendor_id: u16::from_str_radix(&read("idVendor")?, 16).ok()?,
        product_id: u16::from_str_radix(&read("idProduct")?, 16).ok()?,
        serial: read("serial"),
        bus: read("busnum")?.parse().ok()?,
        address: read("devnum")?.parse().ok()?,
    })
}

fn read_attr(dir: &Path, name: &str) -> Option<String> {
    fs::read_to_string(dir.join(name))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

struct V4lHandle {
    device: Device,
    stream: Option<MmapStream<'static>>,
    index: usize,
    width: u32,
    height: u32,
    source: SourceFormat,
}

// The mmap arena holds raw buffer pointers; the handle never leaves its
// acquisition thread once started.
unsafe impl Send for V4lHandle {}

impl DeviceHandle for V4lHandle {
    fn set_mode(&mut self, mode: CaptureMode) -> Result<CaptureMode> {
        let mut format = self.device.format()?;
        format.width = mode.width;
        format.height = mode.height;
        format.fourcc = FourCC::new(&SourceFormat::Mjpeg.fourcc());

        let applied = self.device.set_format(&format).map_err(|e| {
            RigError::DeviceUnavailable(format!(
                "Failed to set {}x{} on /dev/video{}: {}",
                mode.width, mode.height, self.index, e
            ))
        })?;
        let params = self
            .device
            .set_params(&Parameters::with_fps(mode.fps.round().max(1.0) as u32))
            .map_err(|e| {
                RigError::DeviceUnavailable(format!(
                    "Failed to set {} fps on /dev/video{}: {}",
                    mode.fps, self.index, e
                ))
            })?;

        self.width = applied.width;
        self.height = applied.height;
        self.source = SourceFormat::from_fourcc(&applied.fourcc.repr).ok_or_else(|| {
            RigError::DeviceUnavailable(format!(
                "/dev/video{} negotiated unsupported format {}",
                self.index, applied.fourcc
            ))
        })?;

        let fps = if params.interval.numerator > 0 {
            params.interval.denominator as f64 / params.interval.numerator as f64
        } else {
            mode.fps
        };
        Ok(CaptureMode::new(applied.width, applied.height, fps))
    }

    fn supported_modes(&self) -> Vec<CaptureMode> {
        let fourcc = FourCC::new(&SourceFormat::Mjpeg.fourcc());
        let sizes = match self.device.enum_framesizes(fourcc) {
            Ok(sizes) => sizes,
            Err(e) => {
                log::debug!("Cannot list frame sizes on /dev/video{}: {}", self.index, e);
                return Vec::new();
            }
        };

        let mut modes = Vec::new();
        for size in sizes {
            let FrameSizeEnum::Discrete(discrete) = size.size else {
                continue;
            };
            let intervals = self
                .device
                .enum_frameintervals(fourcc, discrete.width, discrete.height)
                .unwrap_or_default();
            for interval in intervals {
                if let FrameIntervalEnum::Discrete(fraction) = interval.interval {
                    if fraction.numerator > 0 {
                        modes.push(CaptureMode::new(
                            discrete.width,
                            discrete.height,
                            fraction.denominator as f64 / fraction.numerator as f64,
                        ));
                    }
                }
            }
        }
        modes
    }

    fn get_frame(&mut self, timeout: Duration) -> Result<Option<RawFrame>> {
        if self.stream.is_none() {
            let mut stream =
                MmapStream::with_buffers(&self.device, Type::VideoCapture, BUFFER_COUNT)
                .map_err(|e| {
                    RigError::DeviceUnavailable(format!(
                        "Failed to start stream on /dev/video{}: {}",
                        self.index, e
                    ))
                })?;
            stream.set_timeout(timeout);
            self.stream = Some(stream);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        match stream.next() {
            Ok((buffer, meta)) => {
                let used = (meta.bytesused as usize).min(buffer.len());
                if used == 0 {
                    return Ok(None);
                }
                decode_buffer(&buffer[..used], self.source, self.width, self.height).map(Some)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(RigError::Capture(format!(
                "Read failed on /dev/video{}: {}",
                self.index, e
            ))),
        }
    }

    fn close(&mut self) {
        // dropping the stream issues STREAMOFF and unmaps the buffers
        self.stream = None;
    }
}
