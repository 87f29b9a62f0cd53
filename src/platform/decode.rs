//! Decoding of raw capture buffers into [`RawFrame`]s.

use crate::errors::{Result, RigError};
use crate::types::{PixelLayout, RawFrame};
use image::DynamicImage;

/// Buffer encodings a UVC device may deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Mjpeg,
    Yuyv,
    Grey,
}

impl SourceFormat {
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"MJPG" | b"JPEG" => Some(SourceFormat::Mjpeg),
            b"YUYV" => Some(SourceFormat::Yuyv),
            b"GREY" => Some(SourceFormat::Grey),
            _ => None,
        }
    }

    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            SourceFormat::Mjpeg => *b"MJPG",
            SourceFormat::Yuyv => *b"YUYV",
            SourceFormat::Grey => *b"GREY",
        }
    }
}

/// Decode one buffer. Luma JPEGs stay single-channel.
pub fn decode_buffer(
    data: &[u8],
    format: SourceFormat,
    width: u32,
    height: u32,
) -> Result<RawFrame> {
    match format {
        SourceFormat::Mjpeg => decode_mjpeg(data),
        SourceFormat::Yuyv => yuyv_to_rgb(data, width, height),
        SourceFormat::Grey => {
            let len = (width * height) as usize;
            if data.len() < len {
                return Err(short_buffer(len, data.len()));
            }
            Ok(RawFrame::new(data[..len].to_vec(), width, height, PixelLayout::Gray8))
        }
    }
}

fn decode_mjpeg(data: &[u8]) -> Result<RawFrame> {
    let image = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .map_err(|e| RigError::Capture(format!("Failed to decode MJPEG frame: {}", e)))?;

    Ok(match image {
        DynamicImage::ImageLuma8(gray) => {
            let (width, height) = gray.dimensions();
            RawFrame::new(gray.into_raw(), width, height, PixelLayout::Gray8)
        }
        other => {
            let rgb = other.to_rgb8();
            let (width, height) = rgb.dimensions();
            RawFrame::new(rgb.into_raw(), width, height, PixelLayout::Rgb8)
        }
    })
}

/// Packed YUYV 4:2:2 to RGB8 (BT.601, limited range)
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Result<RawFrame> {
    let pixels = (width * height) as usize;
    let needed = pixels * 2;
    if data.len() < needed {
        return Err(short_buffer(needed, data.len()));
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    for chunk in data[..needed].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_pixel(y0, u, v));
        rgb.extend_from_slice(&yuv_pixel(y1, u, v));
    }
    Ok(RawFrame::new(rgb, width, height, PixelLayout::Rgb8))
}

fn yuv_pixel(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;
    [clamp(r), clamp(g), clamp(b)]
}

fn clamp(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

fn short_buffer(expected: usize, actual: usize) -> RigError {
    RigError::Capture(format!(
        "Short frame buffer: expected {} bytes, got {}",
        expected, actual
    ))
}
