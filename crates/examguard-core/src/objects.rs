//! Prohibited-object detection (YOLOv8 ONNX export) and phone class resolution.

use crate::frame::Frame;
use crate::letterbox::{letterbox_tensor, LetterboxInfo};
use crate::types::{BoundingBox, ObjectDetection};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const YOLO_PAD_VALUE: f32 = 114.0;
/// Candidates below this class score are dropped before they reach the caller.
const YOLO_CANDIDATE_FLOOR: f32 = 0.05;
/// Box coordinates plus one score per class.
const YOLO_BOX_FIELDS: usize = 4;

/// Class labels that count as a phone.
const PHONE_LABELS: [&str; 4] = ["cell phone", "cellphone", "mobile phone", "phone"];

#[derive(Error, Debug)]
pub enum ObjectDetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("class list unreadable: {0}")]
    ClassList(#[from] std::io::Error),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("model lock poisoned")]
    Poisoned,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Object-detection capability: raw `(class, confidence, box)` candidates.
pub trait ObjectBackend: Send + Sync {
    fn detect_objects(&self, frame: &Frame) -> Result<Vec<ObjectDetection>, ObjectDetectorError>;

    /// Class names indexed by class id (may be empty).
    fn class_names(&self) -> &[String];
}

/// YOLOv8 detector over a COCO-style class list.
pub struct YoloObjectDetector {
    session: std::sync::Mutex<Session>,
    input_size: usize,
    classes: Vec<String>,
}

impl YoloObjectDetector {
    /// Load the ONNX model and its newline-separated class list.
    pub fn load(
        model_path: &str,
        classes_path: &str,
        input_size: usize,
    ) -> Result<Self, ObjectDetectorError> {
        if !Path::new(model_path).exists() {
            return Err(ObjectDetectorError::ModelNotFound(model_path.to_string()));
        }
        let classes = load_class_names(classes_path)?;

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            classes = classes.len(),
            input_size,
            "loaded YOLO object model"
        );

        Ok(Self {
            session: std::sync::Mutex::new(session),
            input_size,
            classes,
        })
    }
}

impl ObjectBackend for YoloObjectDetector {
    fn detect_objects(&self, frame: &Frame) -> Result<Vec<ObjectDetection>, ObjectDetectorError> {
        let rgb = frame.to_rgb_image();
        let (input, letterbox) =
            letterbox_tensor(&rgb, self.input_size, YOLO_PAD_VALUE, |v| v / 255.0);

        let mut session = self.session.lock().map_err(|_| ObjectDetectorError::Poisoned)?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ObjectDetectorError::InferenceFailed(format!("predictions: {e}")))?;
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

        parse_predictions(&dims, data, &letterbox, YOLO_CANDIDATE_FLOOR)
    }

    fn class_names(&self) -> &[String] {
        &self.classes
    }
}

/// Decode a YOLOv8 prediction tensor.
///
/// Accepts `[1, 4+C, N]` (the usual export) or `[1, N, 4+C]`; each prediction
/// is `[cx, cy, w, h, score_0 .. score_C]` in letterboxed pixel space.
fn parse_predictions(
    dims: &[usize],
    data: &[f32],
    letterbox: &LetterboxInfo,
    floor: f32,
) -> Result<Vec<ObjectDetection>, ObjectDetectorError> {
    let (a, b) = match dims {
        [1, a, b] | [a, b] => (*a, *b),
        other => {
            return Err(ObjectDetectorError::InferenceFailed(format!(
                "unexpected output shape {other:?}"
            )))
        }
    };
    if data.len() < a * b {
        return Err(ObjectDetectorError::InferenceFailed(format!(
            "output holds {} values, shape {dims:?} needs {}",
            data.len(),
            a * b
        )));
    }

    // Fewer fields than predictions means channels-first.
    let channels_first = a < b;
    let (fields, predictions) = if channels_first { (a, b) } else { (b, a) };
    if fields <= YOLO_BOX_FIELDS {
        return Err(ObjectDetectorError::InferenceFailed(format!(
            "prediction has {fields} fields, no class scores"
        )));
    }
    let at = |pred: usize, field: usize| -> f32 {
        if channels_first {
            data[field * predictions + pred]
        } else {
            data[pred * fields + field]
        }
    };

    let mut detections = Vec::new();
    for pred in 0..predictions {
        let (class_id, score) = (YOLO_BOX_FIELDS..fields)
            .map(|f| (f - YOLO_BOX_FIELDS, at(pred, f)))
            .fold((0usize, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
        if score <= floor {
            continue;
        }

        let (cx, cy, w, h) = (at(pred, 0), at(pred, 1), at(pred, 2), at(pred, 3));
        let (x1, y1) = letterbox.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.unmap(cx + w / 2.0, cy + h / 2.0);

        detections.push(ObjectDetection {
            class_id,
            bbox: BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks: None,
            },
        });
    }

    Ok(detections)
}

/// Read one class label per line, skipping blank lines.
pub fn load_class_names(path: &str) -> Result<Vec<String>, ObjectDetectorError> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Class ids whose label names a phone; `fallback` when none does.
pub fn resolve_phone_class_ids(classes: &[String], fallback: &[usize]) -> Vec<usize> {
    let ids: Vec<usize> = classes
        .iter()
        .enumerate()
        .filter(|(_, name)| PHONE_LABELS.contains(&name.to_lowercase().as_str()))
        .map(|(i, _)| i)
        .collect();

    if ids.is_empty() {
        fallback.to_vec()
    } else {
        ids
    }
}
