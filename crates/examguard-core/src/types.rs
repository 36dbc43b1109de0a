use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bounding box for a detected face or object, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Area as (bottom - top) × (right - left), clamped at zero for inverted boxes.
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Pick the largest face by area. Ties keep the earliest box.
pub fn largest_face(faces: &[BoundingBox]) -> Option<&BoundingBox> {
    faces
        .iter()
        .reduce(|best, face| if face.area() > best.area() { face } else { best })
}

/// Face embedding vector (512-dimensional for ArcFace, 128 for pixel-patch encodings).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>, model_version: Option<&str>) -> Self {
        Self {
            values,
            model_version: model_version.map(str::to_string),
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Scale to unit length. Returns `None` for zero or non-finite norms.
    pub fn l2_normalized(self) -> Option<Self> {
        let norm = self.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 || !norm.is_finite() {
            return None;
        }
        Some(Self {
            values: self.values.iter().map(|v| v / norm).collect(),
            model_version: self.model_version,
        })
    }

    /// Cosine similarity in [-1, 1].
    ///
    /// `None` when the lengths differ or either vector has zero norm.
    pub fn similarity(&self, other: &Embedding) -> Option<f32> {
        if self.values.len() != other.values.len() || self.values.is_empty() {
            return None;
        }

        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        let sim = dot / denom;
        (denom > 0.0 && sim.is_finite()).then_some(sim)
    }

    /// Pearson correlation coefficient in [-1, 1].
    ///
    /// `None` when the lengths differ or either vector is constant.
    pub fn correlation(&self, other: &Embedding) -> Option<f32> {
        let n = self.values.len();
        if n != other.values.len() || n < 2 {
            return None;
        }

        let mean_a = self.values.iter().sum::<f32>() / n as f32;
        let mean_b = other.values.iter().sum::<f32>() / n as f32;

        let mut cov = 0.0f32;
        let mut var_a = 0.0f32;
        let mut var_b = 0.0f32;
        for (a, b) in self.values.iter().zip(other.values.iter()) {
            let da = a - mean_a;
            let db = b - mean_b;
            cov += da * db;
            var_a += da * da;
            var_b += db * db;
        }

        let denom = (var_a * var_b).sqrt();
        let r = cov / denom;
        (denom > 0.0 && r.is_finite()).then_some(r.clamp(-1.0, 1.0))
    }
}

/// The persisted biometric template of one subject.
///
/// Replaced wholesale on every successful enrollment; never appended to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceTemplate {
    pub id: Uuid,
    pub embeddings: Vec<Embedding>,
    pub created_at: DateTime<Utc>,
}

impl FaceTemplate {
    pub fn new(embeddings: Vec<Embedding>) -> Self {
        Self {
            id: Uuid::new_v4(),
            embeddings,
            created_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    /// Distinct embedding lengths present, ascending.
    pub fn dimensions(&self) -> Vec<usize> {
        let mut dims: Vec<usize> = self.embeddings.iter().map(Embedding::dim).collect();
        dims.sort_unstable();
        dims.dedup();
        dims
    }

    /// Embeddings whose length matches `dim`, in template order.
    pub fn compatible(&self, dim: usize) -> impl Iterator<Item = &Embedding> {
        self.embeddings.iter().filter(move |e| e.dim() == dim)
    }
}

/// Outcome of a single verification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub matched: bool,
    /// Aggregated similarity rescaled to [0, 1].
    pub confidence: f32,
}

impl VerificationResult {
    pub const fn rejected() -> Self {
        Self {
            matched: false,
            confidence: 0.0,
        }
    }
}

/// Outcome of an enrollment call, including the user-facing message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollOutcome {
    pub success: bool,
    pub message: String,
    pub embedding_count: usize,
    pub processed_images: usize,
}

impl EnrollOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            embedding_count: 0,
            processed_images: 0,
        }
    }
}

/// A raw object-detection candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDetection {
    pub class_id: usize,
    pub bbox: BoundingBox,
}

/// Overall per-frame proctoring verdict, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProctorStatus {
    FaceMismatch,
    MultipleFaces,
    PhoneDetected,
    Safe,
    Error,
}

impl ProctorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FaceMismatch => "face_mismatch",
            Self::MultipleFaces => "multiple_faces",
            Self::PhoneDetected => "phone_detected",
            Self::Safe => "safe",
            Self::Error => "error",
        }
    }
}

/// Per-frame proctoring result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProctoringSnapshot {
    pub face_verified: bool,
    pub face_confidence: f32,
    pub face_count: usize,
    pub multiple_faces: bool,
    pub phone_count: usize,
    pub phone_detected: bool,
    pub status: ProctorStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for ProctoringSnapshot {
    fn default() -> Self {
        Self {
            face_verified: false,
            face_confidence: 0.0,
            face_count: 0,
            multiple_faces: false,
            phone_count: 0,
            phone_detected: false,
            status: ProctorStatus::Safe,
            error: None,
        }
    }
}
