use crate::config::Config;
use crate::store::SqliteTemplateStore;
use chrono::{DateTime, Utc};
use examguard_core::{
    ArcFaceBackend, EnrollOutcome, FaceBackend, FaceDetector, FaceRecognizer, IdentityEngine,
    ImageInput, ImageSource, Pipeline, PixelPatchBackend, ProctoringSnapshot, StoreError,
    TemplateStore, UnavailableBackend, VerificationResult, YoloObjectDetector,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("template store: {0}")]
    Store(#[from] StoreError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Stored-template summary returned by `TemplateInfo`.
#[derive(Debug, Serialize)]
pub struct TemplateInfo {
    pub subject: String,
    pub enrolled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    pub embeddings: usize,
    pub dimensions: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// What the engine was built with, fixed at startup.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSummary {
    pub backend: &'static str,
    pub matcher: &'static str,
    pub embedding_dimension: Option<usize>,
    pub tolerance: f32,
    pub phone_detection: bool,
    pub phone_class_ids: Vec<usize>,
}

impl EngineSummary {
    pub fn of(engine: &IdentityEngine) -> Self {
        Self {
            backend: engine.backend_name(),
            matcher: engine.matcher_name(),
            embedding_dimension: engine.embedding_dimension(),
            tolerance: engine.tolerance(),
            phone_detection: engine.objects_enabled(),
            phone_class_ids: engine.phone_class_ids().to_vec(),
        }
    }
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Enroll {
        subject: String,
        images: Vec<String>,
        reply: oneshot::Sender<EnrollOutcome>,
    },
    Verify {
        subject: String,
        image: String,
        reply: oneshot::Sender<VerificationResult>,
    },
    Assess {
        subject: String,
        image: String,
        reply: oneshot::Sender<ProctoringSnapshot>,
    },
    Clear {
        subject: String,
        reply: oneshot::Sender<Result<bool, StoreError>>,
    },
    Info {
        subject: String,
        reply: oneshot::Sender<Result<TemplateInfo, StoreError>>,
    },
    Count {
        reply: oneshot::Sender<Result<usize, StoreError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Build and store a template from base64 images.
    pub async fn enroll(&self, subject: String, images: Vec<String>) -> Result<EnrollOutcome, EngineError> {
        self.request(|reply| EngineRequest::Enroll { subject, images, reply })
            .await
    }

    pub async fn verify(&self, subject: String, image: String) -> Result<VerificationResult, EngineError> {
        self.request(|reply| EngineRequest::Verify { subject, image, reply })
            .await
    }

    pub async fn assess(&self, subject: String, image: String) -> Result<ProctoringSnapshot, EngineError> {
        self.request(|reply| EngineRequest::Assess { subject, image, reply })
            .await
    }

    pub async fn clear(&self, subject: String) -> Result<bool, EngineError> {
        Ok(self
            .request(|reply| EngineRequest::Clear { subject, reply })
            .await??)
    }

    pub async fn info(&self, subject: String) -> Result<TemplateInfo, EngineError> {
        Ok(self
            .request(|reply| EngineRequest::Info { subject, reply })
            .await??)
    }

    pub async fn enrolled_count(&self) -> Result<usize, EngineError> {
        Ok(self.request(|reply| EngineRequest::Count { reply }).await??)
    }
}

/// Load the face models, falling back step by step:
/// SCRFD + ArcFace, then SCRFD + pixel patches, then no face model at all.
pub fn build_identity_engine(config: &Config) -> IdentityEngine {
    let engine_config = config.engine.clone();
    let scrfd_path = config.scrfd_model_path();

    let detector = match FaceDetector::load(
        &scrfd_path,
        engine_config.detection_confidence,
        engine_config.nms_threshold,
    ) {
        Ok(detector) => Some(detector),
        Err(err) => {
            tracing::warn!(path = %scrfd_path, error = %err, "face detector unavailable; every verification will reject");
            None
        }
    };

    let (pipeline, faces): (Pipeline, Box<dyn FaceBackend>) = match (detector, engine_config.pipeline) {
        (None, pipeline) => (
            pipeline,
            Box::new(UnavailableBackend::new(format!("cannot load {scrfd_path}"))),
        ),
        (Some(detector), Pipeline::Legacy) => (Pipeline::Legacy, Box::new(PixelPatchBackend::new(detector))),
        (Some(detector), Pipeline::Embedding) => {
            let arcface_path = config.arcface_model_path();
            match FaceRecognizer::load(&arcface_path) {
                Ok(recognizer) => (
                    Pipeline::Embedding,
                    Box::new(ArcFaceBackend::new(detector, recognizer)),
                ),
                Err(err) => {
                    tracing::warn!(path = %arcface_path, error = %err, "ArcFace unavailable; using legacy pixel-patch pipeline");
                    (Pipeline::Legacy, Box::new(PixelPatchBackend::new(detector)))
                }
            }
        }
    };

    let engine = IdentityEngine::for_pipeline(pipeline, faces, engine_config);
    if !config.objects_enabled {
        tracing::info!("phone detection disabled via EXAMGUARD_OBJECTS_ENABLED=0");
        return engine;
    }

    match YoloObjectDetector::load(
        &config.yolo_model_path(),
        &config.class_names_path(),
        config.engine.object_input_size,
    ) {
        Ok(objects) => engine.with_objects(Box::new(objects)),
        Err(err) => {
            tracing::warn!(error = %err, "object model unavailable; phones will not be detected");
            engine
        }
    }
}

/// Spawn the engine on a dedicated OS thread that owns the store.
pub fn spawn_engine(engine: IdentityEngine, store: SqliteTemplateStore) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let mut worker = Worker { engine, store };

    std::thread::Builder::new()
        .name("examguard-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                worker.handle(req);
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

struct Worker {
    engine: IdentityEngine,
    store: SqliteTemplateStore,
}

impl Worker {
    fn handle(&mut self, req: EngineRequest) {
        // Send errors only mean the caller gave up (timeout); nothing to do.
        match req {
            EngineRequest::Enroll { subject, images, reply } => {
                let input = ImageInput::Batch(images.into_iter().map(ImageSource::Encoded).collect());
                let _ = reply.send(self.engine.enroll(&mut self.store, &subject, input));
            }
            EngineRequest::Verify { subject, image, reply } => {
                let result = self
                    .engine
                    .verify_subject(&self.store, &subject, ImageSource::Encoded(image));
                let _ = reply.send(result);
            }
            EngineRequest::Assess { subject, image, reply } => {
                let _ = reply.send(self.assess(&subject, image));
            }
            EngineRequest::Clear { subject, reply } => {
                let result = self.store.clear(&subject);
                if let Ok(true) = result {
                    tracing::info!(subject, "template cleared");
                }
                let _ = reply.send(result);
            }
            EngineRequest::Info { subject, reply } => {
                let _ = reply.send(self.info(subject));
            }
            EngineRequest::Count { reply } => {
                let _ = reply.send(self.store.count());
            }
        }
    }

    fn assess(&self, subject: &str, image: String) -> ProctoringSnapshot {
        match self.store.load(subject) {
            Ok(template) => self
                .engine
                .assess(template.as_ref(), ImageSource::Encoded(image)),
            Err(err) => {
                tracing::error!(subject, error = %err, "template load failed");
                ProctoringSnapshot {
                    status: examguard_core::ProctorStatus::Error,
                    error: Some(err.to_string()),
                    ..ProctoringSnapshot::default()
                }
            }
        }
    }

    fn info(&self, subject: String) -> Result<TemplateInfo, StoreError> {
        let template = self.store.load(&subject)?;
        Ok(match template {
            Some(t) => TemplateInfo {
                subject,
                enrolled: true,
                template_id: Some(t.id.to_string()),
                embeddings: t.len(),
                dimensions: t.dimensions(),
                created_at: Some(t.created_at),
            },
            None => TemplateInfo {
                subject,
                enrolled: false,
                template_id: None,
                embeddings: 0,
                dimensions: Vec::new(),
                created_at: None,
            },
        })
    }
}
