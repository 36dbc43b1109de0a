//! Enrollment builder: photos in, one replacement template out.

use crate::augment::augment;
use crate::engine::{guarded, IdentityEngine};
use crate::error::EngineError;
use crate::frame::Frame;
use crate::input::{normalize, DecodeError, ImageInput};
use crate::store::TemplateStore;
use crate::types::{EnrollOutcome, FaceTemplate};

/// A freshly built template and the number of images that contributed to it.
#[derive(Debug, Clone)]
pub struct BuiltTemplate {
    pub template: FaceTemplate,
    pub processed_images: usize,
}

impl IdentityEngine {
    /// Build a template from `input` and store it for `subject`, replacing any
    /// previous one. Nothing is written on failure.
    pub fn enroll(
        &self,
        store: &mut dyn TemplateStore,
        subject: &str,
        input: ImageInput,
    ) -> EnrollOutcome {
        guarded(
            || {
                let built = self.build_template(input)?;
                store.save(subject, &built.template)?;

                let embedding_count = built.template.len();
                tracing::info!(
                    subject,
                    embeddings = embedding_count,
                    processed = built.processed_images,
                    "enrollment stored"
                );
                Ok(EnrollOutcome {
                    success: true,
                    message: format!(
                        "Face registered successfully with {embedding_count} encodings from {} photos",
                        built.processed_images
                    ),
                    embedding_count,
                    processed_images: built.processed_images,
                })
            },
            |err| {
                tracing::warn!(subject, error = %err, "enrollment rejected");
                EnrollOutcome::failed(failure_message(&err))
            },
        )
    }

    /// Decode, optionally augment, and embed the largest face of every sample.
    pub fn build_template(&self, input: ImageInput) -> Result<BuiltTemplate, EngineError> {
        let normalized = normalize(input);
        if normalized.frames.is_empty() {
            return Err(EngineError::InputDecode(DecodeError::Empty));
        }

        let sources = normalized.frames.len();
        let augmenting = self.config.augmentation_enabled && sources < self.config.diverse_capture_frames;
        let per_image = self.config.augmentations_per_image;
        tracing::debug!(
            sources,
            skipped = normalized.skipped,
            augmenting,
            "building template"
        );

        let samples = normalized
            .frames
            .into_iter()
            .flat_map(|frame| -> Vec<Frame> {
                if augmenting {
                    augment(&frame, per_image)
                } else {
                    vec![frame]
                }
            })
            .take(self.config.max_enroll_images);

        let mut embeddings = Vec::new();
        for (idx, sample) in samples.enumerate() {
            match self.primary_embedding(&sample) {
                Ok(embedding) => embeddings.push(embedding),
                Err(err) => tracing::debug!(sample = idx, error = %err, "sample skipped"),
            }
        }

        if embeddings.is_empty() {
            return Err(EngineError::NoFaceDetected);
        }
        let processed_images = embeddings.len();
        if processed_images < self.config.min_enroll_samples {
            return Err(EngineError::InsufficientSamples {
                accepted: processed_images,
                required: self.config.min_enroll_samples,
            });
        }

        Ok(BuiltTemplate {
            template: FaceTemplate::new(embeddings),
            processed_images,
        })
    }
}

/// User-facing reason for a failed enrollment.
fn failure_message(err: &EngineError) -> String {
    match err {
        EngineError::InputDecode(_) => "No valid images provided".to_string(),
        EngineError::NoFaceDetected => {
            "Could not extract face features. Please ensure your face is clearly visible.".to_string()
        }
        EngineError::InsufficientSamples { accepted, .. } => format!(
            "Only {accepted} valid photos captured. Please try again with better lighting and ensure multiple angles."
        ),
        other => format!("Error processing face: {other}"),
    }
}
