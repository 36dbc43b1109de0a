//! The identity engine: one service object owning the face backend, the
//! matcher and the optional object detector.
//!
//! Enrollment, verification and proctoring live in their own modules as
//! `impl IdentityEngine` blocks. Every public operation runs through
//! [`guarded`], so callers only ever see a safe default on failure.

use crate::backend::{BackendError, FaceBackend};
use crate::config::{EngineConfig, Pipeline};
use crate::error::EngineError;
use crate::frame::Frame;
use crate::matcher::{Aggregation, EmbeddingCosineMatcher, LegacyCorrelationMatcher, Matcher};
use crate::objects::{resolve_phone_class_ids, ObjectBackend};
use crate::types::{BoundingBox, Embedding};
use std::panic::{self, AssertUnwindSafe};

pub struct IdentityEngine {
    pub(crate) faces: Box<dyn FaceBackend>,
    pub(crate) matcher: Box<dyn Matcher>,
    pub(crate) objects: Option<Box<dyn ObjectBackend>>,
    pub(crate) phone_ids: Vec<usize>,
    pub(crate) config: EngineConfig,
}

impl IdentityEngine {
    pub fn new(faces: Box<dyn FaceBackend>, matcher: Box<dyn Matcher>, config: EngineConfig) -> Self {
        let phone_ids = config.phone_class_ids.clone();
        tracing::info!(
            backend = faces.name(),
            matcher = matcher.name(),
            "identity engine ready"
        );
        Self {
            faces,
            matcher,
            objects: None,
            phone_ids,
            config,
        }
    }

    /// Pair `faces` with the matcher belonging to `pipeline`.
    pub fn for_pipeline(pipeline: Pipeline, faces: Box<dyn FaceBackend>, config: EngineConfig) -> Self {
        let matcher: Box<dyn Matcher> = match pipeline {
            Pipeline::Embedding => Box::new(EmbeddingCosineMatcher),
            Pipeline::Legacy => Box::new(LegacyCorrelationMatcher),
        };
        Self::new(faces, matcher, config)
    }

    /// Attach a prohibited-object detector. Phone classes are resolved from
    /// its class names, falling back to the configured ids.
    pub fn with_objects(mut self, objects: Box<dyn ObjectBackend>) -> Self {
        self.phone_ids = resolve_phone_class_ids(objects.class_names(), &self.config.phone_class_ids);
        tracing::info!(phone_ids = ?self.phone_ids, "object detection enabled");
        self.objects = Some(objects);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Effective acceptance threshold: the configured override, or the
    /// matcher's own default.
    pub fn tolerance(&self) -> f32 {
        self.config
            .tolerance
            .unwrap_or_else(|| self.matcher.default_tolerance())
    }

    pub fn aggregation(&self) -> Aggregation {
        Aggregation {
            top_k: self.config.top_k,
            median_min: self.config.median_min,
            max_comparisons: self.config.max_comparisons,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.faces.name()
    }

    pub fn matcher_name(&self) -> &'static str {
        self.matcher.name()
    }

    pub fn embedding_dimension(&self) -> Option<usize> {
        self.faces.dimension()
    }

    pub fn objects_enabled(&self) -> bool {
        self.objects.is_some()
    }

    pub fn phone_class_ids(&self) -> &[usize] {
        &self.phone_ids
    }

    /// Embed the largest of `faces`.
    pub(crate) fn embed_largest(
        &self,
        frame: &Frame,
        faces: &[BoundingBox],
    ) -> Result<Embedding, EngineError> {
        let face = crate::types::largest_face(faces).ok_or(EngineError::NoFaceDetected)?;
        self.faces
            .embed(frame, std::slice::from_ref(face))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                EngineError::from(BackendError::UnusableCrop("backend returned no embedding".into()))
            })
    }

    /// Detect, then embed the largest face.
    pub(crate) fn primary_embedding(&self, frame: &Frame) -> Result<Embedding, EngineError> {
        let faces = self.faces.detect(frame)?;
        self.embed_largest(frame, &faces)
    }
}

/// Run `op`, turning both errors and panics into `fallback(err)`.
pub(crate) fn guarded<T>(
    op: impl FnOnce() -> Result<T, EngineError>,
    fallback: impl FnOnce(EngineError) -> T,
) -> T {
    match panic::catch_unwind(AssertUnwindSafe(op)) {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => fallback(err),
        Err(payload) => fallback(EngineError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
