//! Proctoring signal collector: identity, face count and phones for one frame.

use crate::engine::IdentityEngine;
use crate::error::EngineError;
use crate::frame::Frame;
use crate::geometry::suppress;
use crate::input::ImageSource;
use crate::types::{FaceTemplate, ProctorStatus, ProctoringSnapshot, VerificationResult};
use std::panic::{self, AssertUnwindSafe};

impl IdentityEngine {
    /// Assess one monitoring frame.
    ///
    /// Never fails: a fault in any sub-check yields [`ProctorStatus::Error`]
    /// with whatever was measured before it.
    pub fn assess(&self, template: Option<&FaceTemplate>, probe: ImageSource) -> ProctoringSnapshot {
        let mut snapshot = ProctoringSnapshot::default();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.collect_signals(template, probe, &mut snapshot)
        }));

        let err = match outcome {
            Ok(Ok(())) => return snapshot,
            Ok(Err(err)) => err,
            Err(_) => EngineError::Panicked("proctoring check panicked".into()),
        };
        tracing::error!(error = %err, "proctoring check failed");
        snapshot.status = ProctorStatus::Error;
        snapshot.error = Some(err.to_string());
        snapshot
    }

    fn collect_signals(
        &self,
        template: Option<&FaceTemplate>,
        probe: ImageSource,
        snapshot: &mut ProctoringSnapshot,
    ) -> Result<(), EngineError> {
        let frame = probe.decode()?;
        let faces = self.faces.detect(&frame)?;
        snapshot.face_count = faces.len();
        snapshot.multiple_faces = faces.len() > 1;

        let verification = match template.filter(|t| !t.is_empty()) {
            None => VerificationResult::rejected(),
            Some(template) => match self.match_faces(template, &frame, &faces) {
                Ok(result) => result,
                Err(err) if err.is_rejection() => {
                    tracing::debug!(error = %err, "identity check rejected");
                    VerificationResult::rejected()
                }
                Err(err) => return Err(err),
            },
        };
        snapshot.face_verified = verification.matched;
        snapshot.face_confidence = verification.confidence;

        snapshot.phone_count = self.count_phones(&frame)?;
        snapshot.phone_detected = snapshot.phone_count > 0;

        snapshot.status = overall_status(snapshot, self.tolerance());
        tracing::debug!(
            status = snapshot.status.as_str(),
            faces = snapshot.face_count,
            phones = snapshot.phone_count,
            confidence = snapshot.face_confidence,
            "frame assessed"
        );
        Ok(())
    }

    /// Phones surviving the confidence threshold and class-agnostic NMS.
    /// Zero when no object detector is loaded.
    pub fn count_phones(&self, frame: &Frame) -> Result<usize, EngineError> {
        let Some(objects) = &self.objects else {
            return Ok(0);
        };

        let candidates: Vec<_> = objects
            .detect_objects(frame)?
            .into_iter()
            .filter(|d| d.bbox.confidence > self.config.phone_confidence)
            .collect();
        let boxes: Vec<_> = candidates.iter().map(|d| d.bbox.clone()).collect();

        Ok(suppress(&boxes, self.config.phone_nms_threshold)
            .into_iter()
            .filter(|&i| self.phone_ids.contains(&candidates[i].class_id))
            .count())
    }
}

/// Most severe condition wins: identity, extra people, phones.
pub fn overall_status(snapshot: &ProctoringSnapshot, tolerance: f32) -> ProctorStatus {
    if !snapshot.face_verified && snapshot.face_confidence < tolerance {
        ProctorStatus::FaceMismatch
    } else if snapshot.multiple_faces {
        ProctorStatus::MultipleFaces
    } else if snapshot.phone_detected {
        ProctorStatus::PhoneDetected
    } else {
        ProctorStatus::Safe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(verified: bool, confidence: f32, faces: usize, phones: usize) -> ProctoringSnapshot {
        ProctoringSnapshot {
            face_verified: verified,
            face_confidence: confidence,
            face_count: faces,
            multiple_faces: faces > 1,
            phone_count: phones,
            phone_detected: phones > 0,
            ..ProctoringSnapshot::default()
        }
    }

    #[test]
    fn test_status_priority() {
        assert_eq!(overall_status(&snapshot(false, 0.3, 2, 1), 0.8), ProctorStatus::FaceMismatch);
        assert_eq!(overall_status(&snapshot(true, 0.9, 2, 1), 0.8), ProctorStatus::MultipleFaces);
        assert_eq!(overall_status(&snapshot(true, 0.9, 1, 1), 0.8), ProctorStatus::PhoneDetected);
        assert_eq!(overall_status(&snapshot(true, 0.9, 1, 0), 0.8), ProctorStatus::Safe);
    }

    #[test]
    fn test_unverified_at_tolerance_is_not_mismatch() {
        // confidence == tolerance is neither a match (needs >) nor a mismatch (needs <)
        assert_eq!(overall_status(&snapshot(false, 0.8, 1, 0), 0.8), ProctorStatus::Safe);
    }
}
