//! SCRFD (det_10g) face detection: letterboxed 640×640 input, three stride
//! levels of anchor-centre decoding, then NMS.

use crate::frame::Frame;
use crate::geometry;
use crate::letterbox::{letterbox_tensor, LetterboxInfo};
use crate::types::BoundingBox;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detection model not found at {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputIndices = (usize, usize, usize);

pub struct FaceDetector {
    session: Session,
    input_size: usize,
    confidence_threshold: f32,
    nms_threshold: f32,
    /// Per-stride output indices [(score, bbox, kps)] for strides [8, 16, 32].
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    /// Load the model and map its nine outputs to stride levels.
    pub fn load(
        model_path: &str,
        confidence_threshold: f32,
        nms_threshold: f32,
    ) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();
        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "expected score/bbox/kps outputs for 3 strides, model has {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::info!(
            path = model_path,
            confidence_threshold,
            ?stride_indices,
            "loaded SCRFD model"
        );

        Ok(Self {
            session,
            input_size: SCRFD_INPUT_SIZE,
            confidence_threshold,
            nms_threshold,
            stride_indices,
        })
    }

    /// Faces in `frame`, in frame coordinates, highest confidence first.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, DetectorError> {
        let rgb = frame.to_rgb_image();
        let (input, letterbox) = letterbox_tensor(&rgb, self.input_size, SCRFD_MEAN, |v| {
            (v - SCRFD_MEAN) / SCRFD_STD
        });

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let tensor = |idx: usize, what: &str, stride: usize| {
            outputs[idx]
                .try_extract_tensor::<f32>()
                .map(|(_, data)| data)
                .map_err(|e| DetectorError::InferenceFailed(format!("{what} at stride {stride}: {e}")))
        };

        let mut candidates = Vec::new();
        for (&stride, &(score_idx, bbox_idx, kps_idx)) in SCRFD_STRIDES.iter().zip(&self.stride_indices) {
            let level = StrideOutputs {
                scores: tensor(score_idx, "scores", stride)?,
                bboxes: tensor(bbox_idx, "bboxes", stride)?,
                kps: tensor(kps_idx, "kps", stride)?,
            };
            candidates.extend(decode_stride(
                &level,
                stride,
                self.input_size,
                &letterbox,
                self.confidence_threshold,
            ));
        }

        Ok(geometry::nms(candidates, self.nms_threshold))
    }
}

/// `(score, bbox, kps)` output positions per stride.
///
/// Uses `score_8`-style names when every one is present; otherwise assumes
/// the insightface export order: three score tensors, three bbox, three kps.
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?, find("kps", stride)?)))
        .collect();

    match named {
        Some(found) => [found[0], found[1], found[2]],
        None => {
            tracing::debug!(?names, "unnamed SCRFD outputs, mapping by position");
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

/// Raw SCRFD output slices for one stride level.
struct StrideOutputs<'a> {
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

/// Decode detections for a single stride level.
fn decode_stride(
    out: &StrideOutputs<'_>,
    stride: usize,
    input_size: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid = input_size / stride;
    let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let s = stride as f32;

    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        let score = out.scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let anchor_idx = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_cx = (anchor_idx % grid) as f32 * s;
        let anchor_cy = (anchor_idx / grid) as f32 * s;

        // bbox: [left, top, right, bottom] distances in stride units
        let bbox_off = idx * 4;
        let Some(dist) = out.bboxes.get(bbox_off..bbox_off + 4) else {
            continue;
        };
        let (x1, y1) = letterbox.unmap(anchor_cx - dist[0] * s, anchor_cy - dist[1] * s);
        let (x2, y2) = letterbox.unmap(anchor_cx + dist[2] * s, anchor_cy + dist[3] * s);

        let kps_off = idx * 10;
        let landmarks = out.kps.get(kps_off..kps_off + 10).map(|k| {
            let mut lms = [(0.0f32, 0.0f32); 5];
            for (i, lm) in lms.iter_mut().enumerate() {
                *lm = letterbox.unmap(anchor_cx + k[i * 2] * s, anchor_cy + k[i * 2 + 1] * s);
            }
            lms
        });

        detections.push(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
            landmarks,
        });
    }

    detections
}
