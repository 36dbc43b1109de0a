//! Decoded BGR pixel matrices and their colour conversions.

use image::{GrayImage, RgbImage};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("invalid BGR length for {width}x{height}: expected {expected}, got {actual}")]
    InvalidLength {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("frame has zero width or height")]
    Empty,
}

/// A height × width × 3 image in BGR channel order, row-major.
#[derive(Clone, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl Frame {
    /// Wrap a packed BGR buffer.
    pub fn from_bgr(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Empty);
        }
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, width, height })
    }

    /// Build a frame from an RGB image, swapping to BGR order.
    pub fn from_rgb_image(img: &RgbImage) -> Result<Self, FrameError> {
        let mut data = img.as_raw().clone();
        for px in data.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
        Self::from_bgr(img.width(), img.height(), data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw BGR bytes.
    pub fn as_bgr(&self) -> &[u8] {
        &self.data
    }

    /// Convert to an RGB image (the order the ONNX models and enhancers expect).
    pub fn to_rgb_image(&self) -> RgbImage {
        let mut data = self.data.clone();
        for px in data.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
        // Length is validated at construction.
        RgbImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    /// ITU-R 601 luma, matching the usual BGR→GRAY conversion.
    pub fn to_grayscale(&self) -> GrayImage {
        let gray: Vec<u8> = self
            .data
            .chunks_exact(3)
            .map(|px| {
                let (b, g, r) = (px[0] as f32, px[1] as f32, px[2] as f32);
                (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8
            })
            .collect();
        GrayImage::from_raw(self.width, self.height, gray)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_from_bgr_validates_length() {
        assert!(Frame::from_bgr(2, 1, vec![0; 6]).is_ok());
        let err = Frame::from_bgr(2, 1, vec![0; 5]).unwrap_err();
        assert_eq!(
            err,
            FrameError::InvalidLength { width: 2, height: 1, expected: 6, actual: 5 }
        );
        assert_eq!(Frame::from_bgr(0, 4, vec![]).unwrap_err(), FrameError::Empty);
    }

    #[test]
    fn test_rgb_roundtrip_swaps_channels() {
        let mut img = RgbImage::new(1, 1);
        img.put_pixel(0, 0, Rgb([10, 20, 30]));
        let frame = Frame::from_rgb_image(&img).unwrap();
        assert_eq!(frame.as_bgr(), &[30, 20, 10]);
        assert_eq!(frame.to_rgb_image().get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_grayscale_weights() {
        // Pure red in BGR order
        let frame = Frame::from_bgr(1, 1, vec![0, 0, 255]).unwrap();
        assert_eq!(frame.to_grayscale().get_pixel(0, 0).0[0], 76);
        let white = Frame::from_bgr(1, 1, vec![255, 255, 255]).unwrap();
        assert_eq!(white.to_grayscale().get_pixel(0, 0).0[0], 255);
    }
}
