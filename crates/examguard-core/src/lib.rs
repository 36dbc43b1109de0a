//! examguard-core: identity verification engine for proctored exams.
//!
//! Face detection (SCRFD) and recognition (ArcFace) run via ONNX Runtime;
//! a grayscale pixel-patch pipeline is kept as a legacy fallback. The
//! [`IdentityEngine`] builds templates from enrollment photos, verifies probe
//! images against them and collects per-frame proctoring signals, including
//! phone detection through a YOLO object model.

pub mod alignment;
pub mod augment;
pub mod backend;
pub mod config;
pub mod detector;
pub mod engine;
pub mod enroll;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod input;
pub mod letterbox;
pub mod matcher;
pub mod objects;
pub mod proctor;
pub mod recognizer;
pub mod store;
pub mod types;
pub mod verify;

use std::path::PathBuf;

pub use backend::{ArcFaceBackend, BackendError, FaceBackend, PixelPatchBackend, UnavailableBackend};
pub use config::{EngineConfig, Pipeline};
pub use detector::FaceDetector;
pub use engine::IdentityEngine;
pub use enroll::BuiltTemplate;
pub use error::EngineError;
pub use frame::Frame;
pub use input::{ImageInput, ImageSource};
pub use matcher::{EmbeddingCosineMatcher, LegacyCorrelationMatcher, Matcher};
pub use objects::{ObjectBackend, YoloObjectDetector};
pub use recognizer::FaceRecognizer;
pub use store::{MemoryTemplateStore, StoreError, TemplateStore};
pub use types::{
    BoundingBox, Embedding, EnrollOutcome, FaceTemplate, ObjectDetection, ProctorStatus,
    ProctoringSnapshot, VerificationResult,
};

/// `$XDG_DATA_HOME/examguard/models`, or `~/.local/share/examguard/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("examguard")
        .join("models")
}
