//! Deterministic frame orientation and channel normalization.
//!
//! Rotation is applied first, then horizontal flip, then vertical flip.

use crate::errors::RigError;
use crate::types::{FrameTransform, PixelLayout, RawFrame, Rotation};
use image::{imageops, DynamicImage, ImageBuffer, Luma, Pixel, Rgb};

/// Apply `transform` to a decoded frame.
pub fn apply_transform(frame: RawFrame, transform: &FrameTransform) -> Result<RawFrame, RigError> {
    if transform.is_identity() {
        return Ok(frame);
    }

    match frame.layout {
        PixelLayout::Gray8 => {
            let buffer = into_buffer::<Luma<u8>>(frame)?;
            Ok(from_buffer(orient(buffer, transform), PixelLayout::Gray8))
        }
        PixelLayout::Rgb8 => {
            let buffer = into_buffer::<Rgb<u8>>(frame)?;
            Ok(from_buffer(orient(buffer, transform), PixelLayout::Rgb8))
        }
    }
}

/// Expand single-channel frames to three channels; RGB frames pass through.
pub fn normalize_to_rgb(frame: RawFrame) -> Result<RawFrame, RigError> {
    match frame.layout {
        PixelLayout::Rgb8 => Ok(frame),
        PixelLayout::Gray8 => {
            let buffer = into_buffer::<Luma<u8>>(frame)?;
            let rgb = DynamicImage::ImageLuma8(buffer).to_rgb8();
            Ok(from_buffer(rgb, PixelLayout::Rgb8))
        }
    }
}

/// Drop the last column and/or row so both dimensions are even
pub fn crop_to_even(frame: RawFrame) -> Result<RawFrame, RigError> {
    let (width, height) = (frame.width & !1, frame.height & !1);
    if (width, height) == (frame.width, frame.height) {
        return Ok(frame);
    }

    match frame.layout {
        PixelLayout::Gray8 => {
            let buffer = into_buffer::<Luma<u8>>(frame)?;
            let cropped = imageops::crop_imm(&buffer, 0, 0, width, height).to_image();
            Ok(from_buffer(cropped, PixelLayout::Gray8))
        }
        PixelLayout::Rgb8 => {
            let buffer = into_buffer::<Rgb<u8>>(frame)?;
            let cropped = imageops::crop_imm(&buffer, 0, 0, width, height).to_image();
            Ok(from_buffer(cropped, PixelLayout::Rgb8))
        }
    }
}

fn orient<P>(buffer: ImageBuffer<P, Vec<u8>>, transform: &FrameTransform) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let mut buffer = match transform.rotation {
        None => buffer,
        Some(Rotation::Clockwise90) => imageops::rotate90(&buffer),
        Some(Rotation::Rotate180) => imageops::rotate180(&buffer),
        Some(Rotation::Clockwise270) => imageops::rotate270(&buffer),
    };

    if transform.flip_horizontal {
        imageops::flip_horizontal_in_place(&mut buffer);
    }
    if transform.flip_vertical {
        imageops::flip_vertical_in_place(&mut buffer);
    }
    buffer
}

fn into_buffer<P>(frame: RawFrame) -> Result<ImageBuffer<P, Vec<u8>>, RigError>
where
    P: Pixel<Subpixel = u8>,
{
    let expected = frame.expected_len();
    let actual = frame.data.len();
    ImageBuffer::from_raw(frame.width, frame.height, frame.data).ok_or_else(|| {
        RigError::Capture(format!(
            "Frame buffer size mismatch: expected {} bytes, got {}",
            expected, actual
        ))
    })
}

fn from_buffer<P>(buffer: ImageBuffer<P, Vec<u8>>, layout: PixelLayout) -> RawFrame
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = buffer.dimensions();
    RawFrame::new(buffer.into_raw(), width, height, layout)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker_frame(width: u32, height: u32, x: u32, y: u32) -> RawFrame {
        let mut data = vec![0u8; (width * height) as usize];
        data[(y * width + x) as usize] = 255;
        RawFrame::new(data, width, height, PixelLayout::Gray8)
    }

    fn marker_position(frame: &RawFrame) -> (u32, u32) {
        let channels = frame.layout.channels() as usize;
        let index = frame
            .data
            .chunks(channels)
            .position(|px| px[0] == 255)
            .expect("marker pixel present");
        (index as u32 % frame.width, index as u32 / frame.width)
    }

    #[test]
    fn test_rotate_90_clockwise_moves_marker() {
        let frame = marker_frame(400, 400, 10, 20);
        let out = apply_transform(frame, &FrameTransform::rotate(Rotation::Clockwise90)).unwrap();

        // (x, y) -> (H - 1 - y, x)
        assert_eq!(marker_position(&out), (400 - 1 - 20, 10));
    }

    #[test]
    fn test_rotate_changes_dimensions() {
        let frame = marker_frame(640, 480, 0, 0);
        let out = apply_transform(frame, &FrameTransform::rotate(Rotation::Clockwise270)).unwrap();
        assert_eq!((out.width, out.height), (480, 640));
        // (x, y) -> (y, W - 1 - x)
        assert_eq!(marker_position(&out), (0, 639));
    }

    #[test]
    fn test_flip_both_axes() {
        let frame = marker_frame(8, 6, 1, 2);
        let out = apply_transform(frame, &FrameTransform::flip(true, true)).unwrap();
        assert_eq!(marker_position(&out), (6, 3));
    }

    #[test]
    fn test_rotation_precedes_flip() {
        let frame = marker_frame(10, 4, 2, 1);
        let transform = FrameTransform {
            rotation: Some(Rotation::Clockwise90),
            flip_horizontal: true,
            flip_vertical: false,
        };
        let out = apply_transform(frame, &transform).unwrap();
        // rotate: (2,1) in 10x4 -> (4-1-1, 2) = (2,2) in 4x10; flip h: (4-1-2, 2)
        assert_eq!((out.width, out.height), (4, 10));
        assert_eq!(marker_position(&out), (1, 2));
    }

    #[test]
    fn test_identity_is_passthrough() {
        let frame = marker_frame(5, 5, 3, 3);
        let out = apply_transform(frame.clone(), &FrameTransform::default()).unwrap();
        assert_eq!(out.data, frame.data);
    }

    #[test]
    fn test_normalize_gray_to_rgb() {
        let frame = marker_frame(4, 2, 1, 1);
        let out = normalize_to_rgb(frame).unwrap();
        assert_eq!(out.layout, PixelLayout::Rgb8);
        assert_eq!(out.data.len(), 4 * 2 * 3);
        assert_eq!(&out.data[(4 + 1) * 3..(4 + 1) * 3 + 3], &[255, 255, 255]);
        assert_eq!(marker_position(&out), (1, 1));
    }

    #[test]
    fn test_crop_to_even_drops_last_row_and_column() {
        let frame = marker_frame(65, 49, 3, 47);
        let out = crop_to_even(normalize_to_rgb(frame).unwrap()).unwrap();
        assert_eq!((out.width, out.height, out.layout), (64, 48, PixelLayout::Rgb8));
        assert_eq!(out.data.len(), 64 * 48 * 3);
        assert_eq!(marker_position(&out), (3, 47));

        let even = marker_frame(8, 6, 0, 0);
        assert_eq!(crop_to_even(even.clone()).unwrap().data, even.data);
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let frame = RawFrame::new(vec![0; 10], 4, 4, PixelLayout::Rgb8);
        let result = apply_transform(frame, &FrameTransform::rotate(Rotation::Rotate180));
        assert!(matches!(result, Err(RigError::Capture(_))));
    }
}
