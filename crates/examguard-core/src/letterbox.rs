//! Letterbox resize into a square NCHW tensor, shared by SCRFD and YOLO.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;

/// Metadata for coordinate de-mapping after letterbox resize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl LetterboxInfo {
    /// Map a point from letterboxed model space back to the source frame.
    pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Resize `rgb` to fit a `size`×`size` canvas, centred, and normalize each
/// channel value with `normalize`. Padding uses `pad_value` before normalization.
pub fn letterbox_tensor(
    rgb: &RgbImage,
    size: usize,
    pad_value: f32,
    normalize: impl Fn(f32) -> f32,
) -> (Array4<f32>, LetterboxInfo) {
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);

    let new_w = ((width as f32 * scale).round() as usize).clamp(1, size);
    let new_h = ((height as f32 * scale).round() as usize).clamp(1, size);
    let pad_x = (size - new_w) as f32 / 2.0;
    let pad_y = (size - new_h) as f32 / 2.0;

    // Bilinear ("triangle") keeps edges sharp enough for small faces.
    let resized = imageops::resize(rgb, new_w as u32, new_h as u32, FilterType::Triangle);

    let pad_x_start = pad_x.floor() as usize;
    let pad_y_start = pad_y.floor() as usize;
    let pad = normalize(pad_value);

    let mut tensor = Array4::<f32>::from_elem((1, 3, size, size), pad);
    for (x, y, px) in resized.enumerate_pixels() {
        let (tx, ty) = (x as usize + pad_x_start, y as usize + pad_y_start);
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = normalize(px.0[c] as f32);
        }
    }

    (tensor, LetterboxInfo { scale, pad_x, pad_y })
}
