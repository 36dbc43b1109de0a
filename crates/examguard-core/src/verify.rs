//! Verifier: one probe image against one stored template.

use crate::engine::{guarded, IdentityEngine};
use crate::error::EngineError;
use crate::frame::Frame;
use crate::input::ImageSource;
use crate::store::TemplateStore;
use crate::types::{BoundingBox, FaceTemplate, VerificationResult};

impl IdentityEngine {
    /// Compare the largest face in `probe` against `template`.
    ///
    /// A missing or empty template, a probe without faces, or a template with
    /// no embedding of the probe's length all reject with confidence 0.0.
    pub fn verify(&self, template: Option<&FaceTemplate>, probe: &Frame) -> VerificationResult {
        guarded(
            || {
                let template = usable(template)?;
                let faces = self.faces.detect(probe)?;
                self.match_faces(template, probe, &faces)
            },
            log_rejection,
        )
    }

    /// Like [`IdentityEngine::verify`], decoding the probe first.
    pub fn verify_source(&self, template: Option<&FaceTemplate>, probe: ImageSource) -> VerificationResult {
        guarded(
            || {
                let template = usable(template)?;
                let frame = probe.decode()?;
                let faces = self.faces.detect(&frame)?;
                self.match_faces(template, &frame, &faces)
            },
            log_rejection,
        )
    }

    /// Load `subject`'s template from `store` and verify against it.
    pub fn verify_subject(
        &self,
        store: &dyn TemplateStore,
        subject: &str,
        probe: ImageSource,
    ) -> VerificationResult {
        match store.load(subject) {
            Ok(template) => {
                let result = self.verify_source(template.as_ref(), probe);
                tracing::debug!(subject, matched = result.matched, confidence = result.confidence, "verified");
                result
            }
            Err(err) => {
                tracing::error!(subject, error = %err, "template load failed");
                VerificationResult::rejected()
            }
        }
    }

    /// Embed the largest of already-detected `faces` and score it.
    pub(crate) fn match_faces(
        &self,
        template: &FaceTemplate,
        frame: &Frame,
        faces: &[BoundingBox],
    ) -> Result<VerificationResult, EngineError> {
        let probe = self.embed_largest(frame, faces)?;
        Ok(self
            .matcher
            .compare(&probe, template, self.tolerance(), &self.aggregation())?)
    }
}

fn usable(template: Option<&FaceTemplate>) -> Result<&FaceTemplate, EngineError> {
    template
        .filter(|t| !t.is_empty())
        .ok_or(EngineError::NoTemplate)
}

fn log_rejection(err: EngineError) -> VerificationResult {
    if err.is_rejection() {
        tracing::debug!(error = %err, "verification rejected");
    } else {
        tracing::warn!(error = %err, "verification failed");
    }
    VerificationResult::rejected()
}
