//! Engine scenarios driven through fake face and object backends.

use base64::{engine::general_purpose, Engine as _};
use examguard_core::backend::BackendError;
use examguard_core::objects::ObjectDetectorError;
use examguard_core::{
    BoundingBox, Embedding, EngineConfig, FaceBackend, FaceTemplate, Frame, IdentityEngine,
    ImageInput, ImageSource, MemoryTemplateStore, ObjectBackend, ObjectDetection, Pipeline,
    ProctorStatus, TemplateStore,
};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

const DIM: usize = 512;

fn face(width: f32, height: f32) -> BoundingBox {
    BoundingBox {
        x: 1.0,
        y: 1.0,
        width,
        height,
        confidence: 0.9,
        landmarks: None,
    }
}

fn frame(width: u32, height: u32) -> Frame {
    let data = (0..width * height * 3).map(|i| (i * 37 % 251) as u8).collect();
    Frame::from_bgr(width, height, data).unwrap()
}

/// Unit vector whose hot index is derived from `seed`.
fn hot(dim: usize, seed: usize) -> Embedding {
    let mut values = vec![0.0; dim];
    values[seed % dim] = 1.0;
    Embedding::new(values, Some("fake"))
}

/// Faces are looked up by frame size; the embedding depends only on the
/// frame width, so augmented copies of a frame embed identically.
struct FakeFaces {
    faces: HashMap<(u32, u32), Vec<BoundingBox>>,
    dim: usize,
    embedded: Arc<Mutex<Vec<BoundingBox>>>,
    unusable_crops: bool,
}

impl FakeFaces {
    fn new() -> Self {
        Self {
            faces: HashMap::new(),
            dim: DIM,
            embedded: Arc::new(Mutex::new(Vec::new())),
            unusable_crops: false,
        }
    }

    fn with(mut self, size: (u32, u32), faces: Vec<BoundingBox>) -> Self {
        self.faces.insert(size, faces);
        self
    }

    fn dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    /// Detection works but every crop is rejected by the recognizer.
    fn unusable_crops(mut self) -> Self {
        self.unusable_crops = true;
        self
    }
}

impl FaceBackend for FakeFaces {
    fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>, BackendError> {
        Ok(self
            .faces
            .get(&(frame.width(), frame.height()))
            .cloned()
            .unwrap_or_default())
    }

    fn embed(&self, frame: &Frame, faces: &[BoundingBox]) -> Result<Vec<Embedding>, BackendError> {
        if self.unusable_crops {
            return Err(BackendError::UnusableCrop("flat crop".into()));
        }
        self.embedded.lock().unwrap().extend_from_slice(faces);
        Ok(faces
            .iter()
            .map(|_| hot(self.dim, frame.width() as usize))
            .collect())
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dim)
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

struct PanickingFaces;

impl FaceBackend for PanickingFaces {
    fn detect(&self, _frame: &Frame) -> Result<Vec<BoundingBox>, BackendError> {
        panic!("detector crashed")
    }

    fn embed(&self, _frame: &Frame, _faces: &[BoundingBox]) -> Result<Vec<Embedding>, BackendError> {
        panic!("recognizer crashed")
    }

    fn dimension(&self) -> Option<usize> {
        None
    }

    fn name(&self) -> &'static str {
        "panicking"
    }
}

struct FakeObjects {
    detections: Result<Vec<ObjectDetection>, String>,
    classes: Vec<String>,
}

impl FakeObjects {
    fn returning(detections: Vec<ObjectDetection>) -> Self {
        Self {
            detections: Ok(detections),
            classes: vec!["person".into(), "cell phone".into(), "book".into()],
        }
    }

    fn failing(reason: &str) -> Self {
        Self {
            detections: Err(reason.into()),
            classes: Vec::new(),
        }
    }
}

impl ObjectBackend for FakeObjects {
    fn detect_objects(&self, _frame: &Frame) -> Result<Vec<ObjectDetection>, ObjectDetectorError> {
        self.detections
            .clone()
            .map_err(ObjectDetectorError::InferenceFailed)
    }

    fn class_names(&self) -> &[String] {
        &self.classes
    }
}

fn phone(x: f32, confidence: f32) -> ObjectDetection {
    ObjectDetection {
        class_id: 1,
        bbox: BoundingBox {
            x,
            y: 10.0,
            width: 20.0,
            height: 40.0,
            confidence,
            landmarks: None,
        },
    }
}

fn engine(faces: FakeFaces, config: EngineConfig) -> IdentityEngine {
    IdentityEngine::for_pipeline(Pipeline::Embedding, Box::new(faces), config)
}

fn frames(count: usize, size: (u32, u32)) -> ImageInput {
    ImageInput::from(vec![frame(size.0, size.1); count])
}

fn png_base64(width: u32, height: u32) -> String {
    let img = image::RgbImage::from_fn(width, height, |x, y| image::Rgb([(x * 20) as u8, (y * 20) as u8, 90]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    general_purpose::STANDARD.encode(bytes)
}

// ── enrollment ──────────────────────────────────────────────────────────────

#[test]
fn test_enroll_without_faces_fails_and_stores_nothing() {
    let engine = engine(FakeFaces::new(), EngineConfig::default());
    let mut store = MemoryTemplateStore::new();

    let outcome = engine.enroll(&mut store, "alice", frames(10, (16, 16)));

    assert!(!outcome.success);
    assert_eq!(outcome.embedding_count, 0);
    assert!(outcome.message.starts_with("Could not extract face features"));
    assert!(store.load("alice").unwrap().is_none());
}

#[test]
fn test_enroll_below_minimum_fails() {
    let faces = FakeFaces::new().with((16, 16), vec![face(10.0, 10.0)]);
    let engine = engine(faces, EngineConfig::default());
    let mut store = MemoryTemplateStore::new();

    // Three frames count as a diverse capture, so nothing is augmented.
    let outcome = engine.enroll(&mut store, "alice", frames(3, (16, 16)));

    assert!(!outcome.success);
    assert!(outcome.message.starts_with("Only 3 valid photos captured"));
    assert!(store.load("alice").unwrap().is_none());
}

#[test]
fn test_enroll_multi_frame_one_embedding_per_frame() {
    let faces = FakeFaces::new().with((16, 16), vec![face(10.0, 10.0)]);
    let engine = engine(faces, EngineConfig::default());
    let mut store = MemoryTemplateStore::new();

    let outcome = engine.enroll(&mut store, "alice", frames(9, (16, 16)));

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.embedding_count, 9);
    assert_eq!(
        outcome.message,
        "Face registered successfully with 9 encodings from 9 photos"
    );
    assert_eq!(store.load("alice").unwrap().unwrap().len(), 9);
}

#[test]
fn test_enroll_single_image_is_augmented() {
    let faces = FakeFaces::new().with((16, 16), vec![face(10.0, 10.0)]);
    let engine = engine(faces, EngineConfig::default());
    let mut store = MemoryTemplateStore::new();

    let outcome = engine.enroll(&mut store, "alice", ImageInput::from(frame(16, 16)));

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.embedding_count, 15);
}

#[test]
fn test_enroll_augmented_batch_capped() {
    let faces = FakeFaces::new().with((16, 16), vec![face(10.0, 10.0)]);
    let config = EngineConfig {
        diverse_capture_frames: 11,
        ..EngineConfig::default()
    };
    let engine = engine(faces, config);
    let mut store = MemoryTemplateStore::new();

    let outcome = engine.enroll(&mut store, "alice", frames(10, (16, 16)));

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.embedding_count, (10 * 15).min(60));
}

#[test]
fn test_enroll_augmentation_disabled() {
    let faces = FakeFaces::new().with((16, 16), vec![face(10.0, 10.0)]);
    let config = EngineConfig {
        augmentation_enabled: false,
        ..EngineConfig::default()
    };
    let engine = engine(faces, config);
    let mut store = MemoryTemplateStore::new();

    let outcome = engine.enroll(&mut store, "alice", ImageInput::from(frame(16, 16)));

    assert!(!outcome.success);
    assert!(outcome.message.starts_with("Only 1 valid photos captured"));
}

#[test]
fn test_reenroll_replaces_template() {
    let faces = FakeFaces::new().with((16, 16), vec![face(10.0, 10.0)]);
    let engine = engine(faces, EngineConfig::default());
    let mut store = MemoryTemplateStore::new();

    assert!(engine.enroll(&mut store, "alice", frames(12, (16, 16))).success);
    let first = store.load("alice").unwrap().unwrap();
    assert!(engine.enroll(&mut store, "alice", frames(8, (16, 16))).success);
    let second = store.load("alice").unwrap().unwrap();

    assert_eq!(second.len(), 8);
    assert_ne!(first.id, second.id);
}

#[test]
fn test_enroll_skips_undecodable_items() {
    let faces = FakeFaces::new().with((16, 16), vec![face(10.0, 10.0)]);
    let engine = engine(faces, EngineConfig::default());
    let mut store = MemoryTemplateStore::new();

    let mut sources: Vec<ImageSource> = (0..8).map(|_| ImageSource::Raw(frame(16, 16))).collect();
    sources.push(ImageSource::Encoded("data:image/png;base64,not base64!".into()));
    sources.push(ImageSource::Bytes(vec![1, 2, 3]));

    let outcome = engine.enroll(&mut store, "alice", ImageInput::from(sources));

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.embedding_count, 8);
}

#[test]
fn test_enroll_nothing_decodable() {
    let engine = engine(FakeFaces::new(), EngineConfig::default());
    let mut store = MemoryTemplateStore::new();

    let outcome = engine.enroll(
        &mut store,
        "alice",
        ImageInput::Single(ImageSource::Encoded(String::new())),
    );

    assert!(!outcome.success);
    assert_eq!(outcome.message, "No valid images provided");
}

#[test]
fn test_enroll_skips_frames_without_faces() {
    let faces = FakeFaces::new().with((16, 16), vec![face(10.0, 10.0)]);
    let engine = engine(faces, EngineConfig::default());
    let mut store = MemoryTemplateStore::new();

    let mut batch = vec![frame(16, 16); 8];
    batch.extend(vec![frame(12, 12); 4]);
    let outcome = engine.enroll(&mut store, "alice", ImageInput::from(batch));

    assert!(outcome.success);
    assert_eq!(outcome.embedding_count, 8);
    assert_eq!(outcome.processed_images, 8);
}

#[test]
fn test_enroll_embeds_only_largest_face() {
    let faces = FakeFaces::new().with((64, 64), vec![face(20.0, 25.0), face(40.0, 50.0)]);
    let embedded = Arc::clone(&faces.embedded);
    let engine = engine(faces, EngineConfig::default());
    let mut store = MemoryTemplateStore::new();

    let outcome = engine.enroll(&mut store, "alice", frames(9, (64, 64)));

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.embedding_count, 9);
    let embedded = embedded.lock().unwrap();
    assert_eq!(embedded.len(), 9);
    assert!(embedded.iter().all(|b| b.area() == 2000.0));
}

// ── verification ────────────────────────────────────────────────────────────

#[test]
fn test_self_match_after_single_image_enrollment() {
    let faces = FakeFaces::new().with((16, 16), vec![face(10.0, 10.0)]);
    let engine = engine(faces, EngineConfig::default());
    let mut store = MemoryTemplateStore::new();
    let probe = frame(16, 16);

    assert!(engine.enroll(&mut store, "alice", ImageInput::from(probe.clone())).success);
    let template = store.load("alice").unwrap();
    let result = engine.verify(template.as_ref(), &probe);

    assert!(result.matched);
    assert!(result.confidence >= engine.tolerance());
}

#[test]
fn test_different_face_rejected() {
    let faces = FakeFaces::new()
        .with((16, 16), vec![face(10.0, 10.0)])
        .with((20, 16), vec![face(10.0, 10.0)]);
    let engine = engine(faces, EngineConfig::default());
    let mut store = MemoryTemplateStore::new();

    assert!(engine.enroll(&mut store, "alice", ImageInput::from(frame(16, 16))).success);
    let result = engine.verify_subject(&store, "alice", ImageSource::Raw(frame(20, 16)));

    assert!(!result.matched);
    assert!((result.confidence - 0.5).abs() < 1e-6);
}

#[test]
fn test_verify_unenrolled_subject() {
    let faces = FakeFaces::new().with((16, 16), vec![face(10.0, 10.0)]);
    let engine = engine(faces, EngineConfig::default());
    let store = MemoryTemplateStore::new();

    let result = engine.verify_subject(&store, "nobody", ImageSource::Raw(frame(16, 16)));
    assert!(!result.matched);
    assert_eq!(result.confidence, 0.0);

    let empty = FaceTemplate::new(Vec::new());
    let result = engine.verify(Some(&empty), &frame(16, 16));
    assert!(!result.matched);
    assert_eq!(result.confidence, 0.0);
}

#[test]
fn test_verify_probe_without_face() {
    let engine = engine(FakeFaces::new(), EngineConfig::default());
    let template = FaceTemplate::new(vec![hot(DIM, 16); 8]);

    let result = engine.verify(Some(&template), &frame(16, 16));
    assert!(!result.matched);
    assert_eq!(result.confidence, 0.0);
}

#[test]
fn test_verify_largest_face_used() {
    let faces = FakeFaces::new().with((64, 64), vec![face(20.0, 25.0), face(40.0, 50.0)]);
    let embedded = Arc::clone(&faces.embedded);
    let engine = engine(faces, EngineConfig::default());
    let template = FaceTemplate::new(vec![hot(DIM, 64); 8]);

    let result = engine.verify(Some(&template), &frame(64, 64));

    assert!(result.matched);
    let embedded = embedded.lock().unwrap();
    assert_eq!(embedded.len(), 1);
    assert_eq!(embedded[0].area(), 2000.0);
}

#[test]
fn test_verify_dimensionality_isolation() {
    let faces = FakeFaces::new().with((16, 16), vec![face(10.0, 10.0)]);
    let engine = engine(faces, EngineConfig::default());

    // 128-d entries would score 0 against the probe; only the 512-d ones count.
    let mut mixed: Vec<Embedding> = (0..5).map(|i| hot(128, i + 40)).collect();
    mixed.extend(vec![hot(DIM, 16); 3]);
    let result = engine.verify(Some(&FaceTemplate::new(mixed)), &frame(16, 16));
    assert!(result.matched);
    assert!((result.confidence - 1.0).abs() < 1e-6);

    let legacy_only = FaceTemplate::new((0..5).map(|i| hot(128, i)).collect());
    let result = engine.verify(Some(&legacy_only), &frame(16, 16));
    assert!(!result.matched);
    assert_eq!(result.confidence, 0.0);
}

#[test]
fn test_verify_base64_data_url_probe() {
    let faces = FakeFaces::new().with((12, 10), vec![face(6.0, 6.0)]);
    let engine = engine(faces, EngineConfig::default());
    let template = FaceTemplate::new(vec![hot(DIM, 12); 8]);

    let payload = format!("data:image/png;base64,{}", png_base64(12, 10));
    let result = engine.verify_source(Some(&template), ImageSource::Encoded(payload));
    assert!(result.matched);

    let result = engine.verify_source(Some(&template), ImageSource::Encoded("%%%".into()));
    assert!(!result.matched);
    assert_eq!(result.confidence, 0.0);
}

#[test]
fn test_legacy_pipeline_tolerance() {
    let faces = FakeFaces::new().dim(128).with((16, 16), vec![face(10.0, 10.0)]);
    let engine = IdentityEngine::for_pipeline(Pipeline::Legacy, Box::new(faces), EngineConfig::default());
    assert!((engine.tolerance() - 0.60).abs() < 1e-6);
    assert_eq!(engine.matcher_name(), "legacy_correlation");
}

#[test]
fn test_panicking_backend_never_unwinds() {
    let engine = IdentityEngine::for_pipeline(
        Pipeline::Embedding,
        Box::new(PanickingFaces),
        EngineConfig::default(),
    );
    let mut store = MemoryTemplateStore::new();
    let template = FaceTemplate::new(vec![hot(DIM, 1); 8]);

    let outcome = engine.enroll(&mut store, "alice", frames(8, (8, 8)));
    assert!(!outcome.success);

    let result = engine.verify(Some(&template), &frame(8, 8));
    assert!(!result.matched);

    let snapshot = engine.assess(Some(&template), ImageSource::Raw(frame(8, 8)));
    assert_eq!(snapshot.status, ProctorStatus::Error);
    assert!(snapshot.error.is_some());
}

// ── proctoring ──────────────────────────────────────────────────────────────

#[test]
fn test_assess_safe() {
    let faces = FakeFaces::new().with((16, 16), vec![face(10.0, 10.0)]);
    let engine = engine(faces, EngineConfig::default())
        .with_objects(Box::new(FakeObjects::returning(Vec::new())));
    let template = FaceTemplate::new(vec![hot(DIM, 16); 8]);

    let snapshot = engine.assess(Some(&template), ImageSource::Raw(frame(16, 16)));

    assert_eq!(snapshot.status, ProctorStatus::Safe);
    assert!(snapshot.face_verified);
    assert_eq!(snapshot.face_count, 1);
    assert_eq!(snapshot.phone_count, 0);
    assert!(snapshot.error.is_none());
}

#[test]
fn test_assess_mismatch_outranks_phone() {
    let faces = FakeFaces::new().with((16, 16), vec![face(10.0, 10.0)]);
    let engine = engine(faces, EngineConfig::default())
        .with_objects(Box::new(FakeObjects::returning(vec![phone(10.0, 0.9)])));
    let template = FaceTemplate::new(vec![hot(DIM, 99); 8]);

    let snapshot = engine.assess(Some(&template), ImageSource::Raw(frame(16, 16)));

    assert!(snapshot.phone_detected);
    assert!(!snapshot.face_verified);
    assert_eq!(snapshot.status, ProctorStatus::FaceMismatch);
}

#[test]
fn test_assess_multiple_faces() {
    let faces = FakeFaces::new().with((32, 32), vec![face(10.0, 10.0), face(12.0, 12.0)]);
    let engine = engine(faces, EngineConfig::default())
        .with_objects(Box::new(FakeObjects::returning(vec![phone(10.0, 0.9)])));
    let template = FaceTemplate::new(vec![hot(DIM, 32); 8]);

    let snapshot = engine.assess(Some(&template), ImageSource::Raw(frame(32, 32)));

    assert_eq!(snapshot.face_count, 2);
    assert!(snapshot.multiple_faces);
    assert_eq!(snapshot.status, ProctorStatus::MultipleFaces);
}

#[test]
fn test_assess_counts_phones_after_nms() {
    let faces = FakeFaces::new().with((16, 16), vec![face(10.0, 10.0)]);
    let detections = vec![
        phone(10.0, 0.9),
        phone(11.0, 0.8),  // overlaps the first
        phone(200.0, 0.7), // separate phone
        phone(400.0, 0.3), // below threshold
        ObjectDetection {
            class_id: 0,
            ..phone(600.0, 0.95)
        },
    ];
    let engine = engine(faces, EngineConfig::default())
        .with_objects(Box::new(FakeObjects::returning(detections)));
    assert_eq!(engine.phone_class_ids(), &[1]);
    let template = FaceTemplate::new(vec![hot(DIM, 16); 8]);

    let snapshot = engine.assess(Some(&template), ImageSource::Raw(frame(16, 16)));

    assert_eq!(snapshot.phone_count, 2);
    assert_eq!(snapshot.status, ProctorStatus::PhoneDetected);
}

#[test]
fn test_assess_without_object_model() {
    let faces = FakeFaces::new().with((16, 16), vec![face(10.0, 10.0)]);
    let engine = engine(faces, EngineConfig::default());
    let template = FaceTemplate::new(vec![hot(DIM, 16); 8]);

    let snapshot = engine.assess(Some(&template), ImageSource::Raw(frame(16, 16)));

    assert!(!engine.objects_enabled());
    assert_eq!(snapshot.phone_count, 0);
    assert_eq!(snapshot.status, ProctorStatus::Safe);
}

#[test]
fn test_assess_object_failure_reports_error_with_partial_results() {
    let faces = FakeFaces::new().with((16, 16), vec![face(10.0, 10.0)]);
    let engine = engine(faces, EngineConfig::default())
        .with_objects(Box::new(FakeObjects::failing("tensor shape")));
    let template = FaceTemplate::new(vec![hot(DIM, 16); 8]);

    let snapshot = engine.assess(Some(&template), ImageSource::Raw(frame(16, 16)));

    assert_eq!(snapshot.status, ProctorStatus::Error);
    assert!(snapshot.face_verified);
    assert_eq!(snapshot.face_count, 1);
    assert!(snapshot.error.unwrap().contains("tensor shape"));
}

#[test]
fn test_assess_embedding_fault_keeps_face_count() {
    let faces = FakeFaces::new()
        .with((16, 16), vec![face(4.0, 4.0), face(6.0, 6.0)])
        .unusable_crops();
    let engine = engine(faces, EngineConfig::default());
    let template = FaceTemplate::new(vec![hot(DIM, 16); 8]);

    let snapshot = engine.assess(Some(&template), ImageSource::Raw(frame(16, 16)));

    assert_eq!(snapshot.status, ProctorStatus::Error);
    assert_eq!(snapshot.face_count, 2);
    assert!(snapshot.multiple_faces);
    assert!(!snapshot.face_verified);
    assert!(snapshot.error.unwrap().contains("flat crop"));
}

#[test]
fn test_assess_unenrolled_is_mismatch() {
    let faces = FakeFaces::new().with((16, 16), vec![face(10.0, 10.0)]);
    let engine = engine(faces, EngineConfig::default());

    let snapshot = engine.assess(None, ImageSource::Raw(frame(16, 16)));

    assert_eq!(snapshot.face_confidence, 0.0);
    assert_eq!(snapshot.status, ProctorStatus::FaceMismatch);
}

#[test]
fn test_assess_undecodable_probe() {
    let engine = engine(FakeFaces::new(), EngineConfig::default());
    let snapshot = engine.assess(None, ImageSource::Encoded("data:image/jpeg;base64,".into()));
    assert_eq!(snapshot.status, ProctorStatus::Error);
}

#[test]
fn test_snapshot_serializes_status_in_snake_case() {
    let engine = engine(FakeFaces::new(), EngineConfig::default());
    let snapshot = engine.assess(None, ImageSource::Raw(frame(16, 16)));
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["status"], "face_mismatch");
    assert!(json.get("error").is_none());
}
