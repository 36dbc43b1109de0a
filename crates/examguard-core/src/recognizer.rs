//! ArcFace (w600k_r50) embedding extraction for landmark-aligned face crops.

use crate::alignment::{align_face, ALIGNED_SIZE};
use crate::types::{BoundingBox, Embedding};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

pub const ARCFACE_EMBEDDING_DIM: usize = 512;
pub const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

/// ArcFace maps [0, 255] symmetrically onto [-1, 1].
const PIXEL_CENTER: f32 = 127.5;
const PIXEL_SCALE: f32 = 127.5;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("recognition model not found at {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face box carries no landmarks; alignment needs all five")]
    NoLandmarks,
    #[error("embedding has zero or non-finite norm")]
    DegenerateEmbedding,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    pub fn load(model_path: &str) -> Result<Self, RecognizerError> {
        if !Path::new(model_path).exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;
        tracing::info!(path = model_path, version = ARCFACE_MODEL_VERSION, "loaded ArcFace model");

        Ok(Self { session })
    }

    /// Align `face` to the 112×112 template and return its unit-length embedding.
    pub fn extract(&mut self, rgb: &RgbImage, face: &BoundingBox) -> Result<Embedding, RecognizerError> {
        let landmarks = face.landmarks.as_ref().ok_or(RecognizerError::NoLandmarks)?;
        let input = to_tensor(&align_face(rgb, landmarks));

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, values) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding output: {e}")))?;

        if values.len() != ARCFACE_EMBEDDING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "model produced {} values, want {ARCFACE_EMBEDDING_DIM}",
                values.len()
            )));
        }

        Embedding::new(values.to_vec(), Some(ARCFACE_MODEL_VERSION))
            .l2_normalized()
            .ok_or(RecognizerError::DegenerateEmbedding)
    }
}

/// NCHW float tensor of an aligned RGB crop.
fn to_tensor(aligned: &RgbImage) -> Array4<f32> {
    let side = ALIGNED_SIZE as usize;
    Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
        let value = aligned
            .get_pixel_checked(x as u32, y as u32)
            .map_or(0.0, |px| px.0[c] as f32);
        (value - PIXEL_CENTER) / PIXEL_SCALE
    })
}
