//! Face capability boundary: detect faces, embed detected faces.
//!
//! The engine only sees [`FaceBackend`]. Concrete backends wrap the ONNX
//! models; the unavailable backend fails closed by never seeing a face.

use crate::detector::{DetectorError, FaceDetector};
use crate::frame::Frame;
use crate::recognizer::{FaceRecognizer, RecognizerError, ARCFACE_EMBEDDING_DIM};
use crate::types::{BoundingBox, Embedding};
use image::imageops::{self, FilterType};
use image::GrayImage;
use std::sync::Mutex;
use thiserror::Error;

pub const PIXEL_PATCH_WIDTH: u32 = 8;
pub const PIXEL_PATCH_HEIGHT: u32 = 16;
pub const PIXEL_PATCH_DIM: usize = (PIXEL_PATCH_WIDTH * PIXEL_PATCH_HEIGHT) as usize;
const PIXEL_PATCH_VERSION: &str = "gray_patch_8x16";

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("face model unavailable: {0}")]
    Unavailable(String),
    #[error("model lock poisoned")]
    Poisoned,
    #[error("face crop unusable: {0}")]
    UnusableCrop(String),
}

/// Detection + embedding capability over a pretrained model.
pub trait FaceBackend: Send + Sync {
    /// Face boxes in the frame, any order.
    fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>, BackendError>;

    /// One unit-length embedding per face in `faces`.
    fn embed(&self, frame: &Frame, faces: &[BoundingBox]) -> Result<Vec<Embedding>, BackendError>;

    /// Length of the vectors this backend produces, if it produces any.
    fn dimension(&self) -> Option<usize>;

    fn name(&self) -> &'static str;
}

/// SCRFD detection + ArcFace embeddings (512-d).
pub struct ArcFaceBackend {
    detector: Mutex<FaceDetector>,
    recognizer: Mutex<FaceRecognizer>,
}

impl ArcFaceBackend {
    pub fn new(detector: FaceDetector, recognizer: FaceRecognizer) -> Self {
        Self {
            detector: Mutex::new(detector),
            recognizer: Mutex::new(recognizer),
        }
    }
}

impl FaceBackend for ArcFaceBackend {
    fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>, BackendError> {
        let mut detector = self.detector.lock().map_err(|_| BackendError::Poisoned)?;
        Ok(detector.detect(frame)?)
    }

    fn embed(&self, frame: &Frame, faces: &[BoundingBox]) -> Result<Vec<Embedding>, BackendError> {
        let rgb = frame.to_rgb_image();
        let mut recognizer = self.recognizer.lock().map_err(|_| BackendError::Poisoned)?;
        faces
            .iter()
            .map(|face| recognizer.extract(&rgb, face).map_err(BackendError::from))
            .collect()
    }

    fn dimension(&self) -> Option<usize> {
        Some(ARCFACE_EMBEDDING_DIM)
    }

    fn name(&self) -> &'static str {
        "arcface"
    }
}

/// SCRFD detection + normalized grayscale pixel patches (legacy, 128 values).
pub struct PixelPatchBackend {
    detector: Mutex<FaceDetector>,
}

impl PixelPatchBackend {
    pub fn new(detector: FaceDetector) -> Self {
        Self {
            detector: Mutex::new(detector),
        }
    }
}

impl FaceBackend for PixelPatchBackend {
    fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>, BackendError> {
        let mut detector = self.detector.lock().map_err(|_| BackendError::Poisoned)?;
        Ok(detector.detect(frame)?)
    }

    fn embed(&self, frame: &Frame, faces: &[BoundingBox]) -> Result<Vec<Embedding>, BackendError> {
        let gray = frame.to_grayscale();
        faces.iter().map(|face| pixel_patch_encoding(&gray, face)).collect()
    }

    fn dimension(&self) -> Option<usize> {
        Some(PIXEL_PATCH_DIM)
    }

    fn name(&self) -> &'static str {
        "pixel_patch"
    }
}

/// Backend used when no face model could be loaded: sees no faces.
pub struct UnavailableBackend {
    reason: String,
}

impl UnavailableBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl FaceBackend for UnavailableBackend {
    fn detect(&self, _frame: &Frame) -> Result<Vec<BoundingBox>, BackendError> {
        Ok(Vec::new())
    }

    fn embed(&self, _frame: &Frame, _faces: &[BoundingBox]) -> Result<Vec<Embedding>, BackendError> {
        Err(BackendError::Unavailable(self.reason.clone()))
    }

    fn dimension(&self) -> Option<usize> {
        None
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}

/// Crop `face` from `gray`, shrink to the patch grid, z-score and L2-normalize.
pub fn pixel_patch_encoding(gray: &GrayImage, face: &BoundingBox) -> Result<Embedding, BackendError> {
    let (fw, fh) = (gray.width() as f32, gray.height() as f32);
    let x0 = face.x.clamp(0.0, fw);
    let y0 = face.y.clamp(0.0, fh);
    let x1 = (face.x + face.width).clamp(0.0, fw);
    let y1 = (face.y + face.height).clamp(0.0, fh);

    let (w, h) = ((x1 - x0).floor() as u32, (y1 - y0).floor() as u32);
    if w == 0 || h == 0 {
        return Err(BackendError::UnusableCrop(format!(
            "box {:.0}x{:.0} at ({:.0},{:.0}) is outside the frame",
            face.width, face.height, face.x, face.y
        )));
    }

    let crop = imageops::crop_imm(gray, x0 as u32, y0 as u32, w, h).to_image();
    let patch = imageops::resize(&crop, PIXEL_PATCH_WIDTH, PIXEL_PATCH_HEIGHT, FilterType::Triangle);

    let values: Vec<f32> = patch.as_raw().iter().map(|&p| p as f32).collect();
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n).sqrt();
    if std < 1e-6 {
        return Err(BackendError::UnusableCrop("crop has no contrast".into()));
    }

    Embedding::new(
        values.iter().map(|v| (v - mean) / std).collect(),
        Some(PIXEL_PATCH_VERSION),
    )
    .l2_normalized()
    .ok_or_else(|| BackendError::UnusableCrop("zero-norm encoding".into()))
}
