use crate::engine::{EngineHandle, EngineSummary};
use std::future::Future;
use std::time::Duration;
use zbus::interface;

/// D-Bus interface for the ExamGuard proctoring daemon.
///
/// Bus name: org.examguard.Proctor1
/// Object path: /org/examguard/Proctor1
pub struct ProctorService {
    engine: EngineHandle,
    summary: EngineSummary,
    verify_timeout: Duration,
    enroll_timeout: Duration,
}

impl ProctorService {
    pub fn new(
        engine: EngineHandle,
        summary: EngineSummary,
        verify_timeout: Duration,
        enroll_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            summary,
            verify_timeout,
            enroll_timeout,
        }
    }
}

/// Await an engine request, bounded by `limit`.
async fn bounded<T>(
    op: &str,
    limit: Duration,
    fut: impl Future<Output = Result<T, crate::engine::EngineError>>,
) -> zbus::fdo::Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            tracing::error!(op, error = %err, "engine request failed");
            Err(zbus::fdo::Error::Failed(err.to_string()))
        }
        Err(_) => {
            tracing::warn!(op, timeout_secs = limit.as_secs(), "engine request timed out");
            Err(zbus::fdo::Error::Failed(format!(
                "{op} timed out after {}s",
                limit.as_secs()
            )))
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

#[interface(name = "org.examguard.Proctor1")]
impl ProctorService {
    /// Enroll a subject from base64 images. Replaces any existing template.
    async fn enroll(&self, subject: &str, images: Vec<String>) -> zbus::fdo::Result<(bool, String)> {
        tracing::info!(subject, images = images.len(), "enroll requested");
        let outcome = bounded(
            "enroll",
            self.enroll_timeout,
            self.engine.enroll(subject.to_string(), images),
        )
        .await?;
        Ok((outcome.success, outcome.message))
    }

    /// Verify one base64 image against the subject's template.
    async fn verify(&self, subject: &str, image: &str) -> zbus::fdo::Result<(bool, f64)> {
        tracing::info!(subject, "verify requested");
        let result = bounded(
            "verify",
            self.verify_timeout,
            self.engine.verify(subject.to_string(), image.to_string()),
        )
        .await?;
        tracing::info!(subject, matched = result.matched, confidence = result.confidence, "verify complete");
        Ok((result.matched, f64::from(result.confidence)))
    }

    /// Proctoring snapshot for one monitoring frame, as JSON.
    async fn assess(&self, subject: &str, image: &str) -> zbus::fdo::Result<String> {
        tracing::debug!(subject, "assess requested");
        let snapshot = bounded(
            "assess",
            self.verify_timeout,
            self.engine.assess(subject.to_string(), image.to_string()),
        )
        .await?;
        if snapshot.status != examguard_core::ProctorStatus::Safe {
            tracing::info!(subject, status = snapshot.status.as_str(), "proctoring flag");
        }
        to_json(&snapshot)
    }

    /// Remove the subject's template. Returns whether one existed.
    async fn clear_template(&self, subject: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(subject, "clear_template requested");
        bounded("clear_template", self.verify_timeout, self.engine.clear(subject.to_string())).await
    }

    /// Summary of the subject's stored template, as JSON.
    async fn template_info(&self, subject: &str) -> zbus::fdo::Result<String> {
        let info = bounded("template_info", self.verify_timeout, self.engine.info(subject.to_string())).await?;
        to_json(&info)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let enrolled = bounded("status", self.verify_timeout, self.engine.enrolled_count()).await?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "backend": self.summary.backend,
            "matcher": self.summary.matcher,
            "embedding_dimension": self.summary.embedding_dimension,
            "tolerance": self.summary.tolerance,
            "phone_detection": self.summary.phone_detection,
            "phone_class_ids": self.summary.phone_class_ids,
            "enrolled_subjects": enrolled,
        })
        .to_string())
    }
}
