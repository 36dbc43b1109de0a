use examguard_core::{EngineConfig, Pipeline};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid engine config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("unknown pipeline {0:?} (expected \"embedding\" or \"legacy\")")]
    Pipeline(String),
}

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Directory containing ONNX model files and the class list.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Serve on the system bus instead of the session bus.
    pub system_bus: bool,
    /// Timeout in seconds for verify and assess requests.
    pub verify_timeout_secs: u64,
    /// Timeout in seconds for an enroll request (augmentation makes these slow).
    pub enroll_timeout_secs: u64,
    /// Whether to load the phone detector at all.
    pub objects_enabled: bool,
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from `EXAMGUARD_*` environment variables with defaults.
    ///
    /// Engine tunables come from the TOML file named by `EXAMGUARD_CONFIG`
    /// (if any); a few of them can be overridden individually by variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let model_dir = std::env::var("EXAMGUARD_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| examguard_core::default_model_dir());

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("examguard");

        let db_path = std::env::var("EXAMGUARD_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("templates.db"));

        let mut engine = match std::env::var("EXAMGUARD_CONFIG") {
            Ok(path) => load_engine_config(Path::new(&path))?,
            Err(_) => EngineConfig::default(),
        };
        apply_env_overrides(&mut engine)?;

        Ok(Self {
            model_dir,
            db_path,
            system_bus: env_flag("EXAMGUARD_SYSTEM_BUS", false),
            verify_timeout_secs: env_u64("EXAMGUARD_VERIFY_TIMEOUT_SECS", 10),
            enroll_timeout_secs: env_u64("EXAMGUARD_ENROLL_TIMEOUT_SECS", 120),
            objects_enabled: env_flag("EXAMGUARD_OBJECTS_ENABLED", true),
            engine,
        })
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_path("det_10g.onnx")
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_path("w600k_r50.onnx")
    }

    /// Path to the YOLOv8 object model.
    pub fn yolo_model_path(&self) -> String {
        self.model_path("yolov8n.onnx")
    }

    pub fn class_names_path(&self) -> String {
        self.model_path("coco.names")
    }

    fn model_path(&self, file: &str) -> String {
        self.model_dir.join(file).to_string_lossy().into_owned()
    }
}

pub fn load_engine_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_engine_config(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn parse_engine_config(text: &str) -> Result<EngineConfig, toml::de::Error> {
    toml::from_str(text)
}

fn apply_env_overrides(engine: &mut EngineConfig) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var("EXAMGUARD_PIPELINE") {
        engine.pipeline = parse_pipeline(&value)?;
    }
    if let Some(tolerance) = env_parse::<f32>("EXAMGUARD_TOLERANCE") {
        engine.tolerance = Some(tolerance);
    }
    if let Some(confidence) = env_parse::<f32>("EXAMGUARD_DETECTION_CONFIDENCE") {
        engine.detection_confidence = confidence;
    }
    if let Some(confidence) = env_parse::<f32>("EXAMGUARD_PHONE_CONFIDENCE") {
        engine.phone_confidence = confidence;
    }
    Ok(())
}

fn parse_pipeline(value: &str) -> Result<Pipeline, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "embedding" | "arcface" => Ok(Pipeline::Embedding),
        "legacy" => Ok(Pipeline::Legacy),
        _ => Err(ConfigError::Pipeline(value.to_string())),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_parse(key).unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| v != "0").unwrap_or(default)
}
