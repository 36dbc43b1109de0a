//! Engine tuning knobs.

use serde::{Deserialize, Serialize};

/// Which face pipeline (backend + matcher pair) the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pipeline {
    /// SCRFD + ArcFace embeddings compared by cosine similarity.
    Embedding,
    /// Grayscale pixel patches compared by correlation.
    Legacy,
}

impl Pipeline {
    /// Acceptance threshold on the [0, 1] confidence scale.
    pub fn default_tolerance(self) -> f32 {
        match self {
            Self::Embedding => 0.80,
            Self::Legacy => 0.60,
        }
    }
}

/// Tunables for enrollment, verification and proctoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pipeline: Pipeline,
    /// Minimum face detector score.
    pub detection_confidence: f32,
    /// IoU threshold for face NMS.
    pub nms_threshold: f32,
    /// Overrides the pipeline's default tolerance when set.
    pub tolerance: Option<f32>,
    /// Number of highest similarities kept for aggregation.
    pub top_k: usize,
    /// At or above this many scores the median is used, below it the mean.
    pub median_min: usize,
    /// Upper bound on stored embeddings compared per verification.
    pub max_comparisons: usize,
    /// Enrollment fails below this many processed images.
    pub min_enroll_samples: usize,
    /// Hard ceiling on images run through detection per enrollment.
    pub max_enroll_images: usize,
    pub augmentation_enabled: bool,
    /// Captures with at least this many decoded images are not augmented.
    pub diverse_capture_frames: usize,
    /// Derived variants generated per source image when augmenting.
    pub augmentations_per_image: usize,
    /// Minimum object detector score for a phone candidate.
    pub phone_confidence: f32,
    /// IoU threshold for object NMS.
    pub phone_nms_threshold: f32,
    /// Class ids counted as phones when the class list has no phone label.
    pub phone_class_ids: Vec<usize>,
    /// Square input size of the object detection model.
    pub object_input_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pipeline: Pipeline::Embedding,
            detection_confidence: 0.5,
            nms_threshold: 0.4,
            tolerance: None,
            top_k: 7,
            median_min: 3,
            max_comparisons: 200,
            min_enroll_samples: 8,
            max_enroll_images: 60,
            augmentation_enabled: true,
            diverse_capture_frames: 2,
            augmentations_per_image: 14,
            phone_confidence: 0.4,
            phone_nms_threshold: 0.4,
            phone_class_ids: vec![67],
            object_input_size: 640,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tolerance_per_pipeline() {
        assert!((Pipeline::Embedding.default_tolerance() - 0.80).abs() < 1e-6);
        assert!((Pipeline::Legacy.default_tolerance() - 0.60).abs() < 1e-6);
        assert!(EngineConfig::default().tolerance.is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"pipeline": "legacy", "top_k": 5}"#).unwrap();
        assert_eq!(config.pipeline, Pipeline::Legacy);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.median_min, 3);
        assert_eq!(config.phone_class_ids, vec![67]);
    }
}
