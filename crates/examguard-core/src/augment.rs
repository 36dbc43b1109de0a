//! Synthetic lighting/focus variations for single-photo enrollment.

use crate::frame::Frame;
use image::imageops;
use image::{Rgb, RgbImage};

/// One photometric transformation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Variation {
    Brightness(f32),
    Contrast(f32),
    Sharpness(f32),
    Blur(f32),
}

/// Enrollment variant set, in generation order.
pub const DEFAULT_VARIATIONS: [Variation; 14] = [
    Variation::Brightness(0.7),
    Variation::Brightness(0.8),
    Variation::Brightness(0.9),
    Variation::Brightness(1.1),
    Variation::Brightness(1.2),
    Variation::Brightness(1.3),
    Variation::Contrast(0.8),
    Variation::Contrast(0.9),
    Variation::Contrast(1.1),
    Variation::Contrast(1.2),
    Variation::Sharpness(0.7),
    Variation::Sharpness(1.3),
    Variation::Blur(0.2),
    Variation::Blur(0.5),
];

// 3×3 smoothing kernel used as the "blurred" end of the sharpness blend.
const SMOOTH_KERNEL: [f32; 9] = [
    1.0 / 13.0, 1.0 / 13.0, 1.0 / 13.0,
    1.0 / 13.0, 5.0 / 13.0, 1.0 / 13.0,
    1.0 / 13.0, 1.0 / 13.0, 1.0 / 13.0,
];

impl Variation {
    pub fn apply(&self, img: &RgbImage) -> RgbImage {
        match *self {
            Self::Brightness(f) => blend_with(img, &RgbImage::new(img.width(), img.height()), f),
            Self::Contrast(f) => {
                let mean = grayscale_mean(img);
                let degenerate = RgbImage::from_pixel(img.width(), img.height(), Rgb([mean; 3]));
                blend_with(img, &degenerate, f)
            }
            Self::Sharpness(f) => blend_with(img, &smoothed(img), f),
            Self::Blur(radius) => imageops::blur(img, radius),
        }
    }
}

/// `degenerate + f · (img − degenerate)`, clamped to u8.
fn blend_with(img: &RgbImage, degenerate: &RgbImage, factor: f32) -> RgbImage {
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let a = img.get_pixel(x, y).0;
        let d = degenerate.get_pixel(x, y).0;
        Rgb(std::array::from_fn(|c| {
            let v = d[c] as f32 + factor * (a[c] as f32 - d[c] as f32);
            v.round().clamp(0.0, 255.0) as u8
        }))
    })
}

fn grayscale_mean(img: &RgbImage) -> u8 {
    let pixels = (img.width() as u64 * img.height() as u64).max(1);
    let sum: f64 = img
        .pixels()
        .map(|p| 0.299 * p.0[0] as f64 + 0.587 * p.0[1] as f64 + 0.114 * p.0[2] as f64)
        .sum();
    (sum / pixels as f64).round().clamp(0.0, 255.0) as u8
}

/// Smoothed copy whose one-pixel border keeps the original values.
fn smoothed(img: &RgbImage) -> RgbImage {
    let mut out = imageops::filter3x3(img, &SMOOTH_KERNEL);
    let (w, h) = img.dimensions();
    for (x, y, px) in out.enumerate_pixels_mut() {
        if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
            *px = *img.get_pixel(x, y);
        }
    }
    out
}

/// The source frame followed by up to `count` variations of it.
pub fn augment(frame: &Frame, count: usize) -> Vec<Frame> {
    let rgb = frame.to_rgb_image();
    let mut out = Vec::with_capacity(count.min(DEFAULT_VARIATIONS.len()) + 1);
    out.push(frame.clone());

    for variation in DEFAULT_VARIATIONS.iter().take(count) {
        match Frame::from_rgb_image(&variation.apply(&rgb)) {
            Ok(derived) => out.push(derived),
            Err(err) => tracing::debug!(?variation, error = %err, "dropping augmented frame"),
        }
    }

    out
}
