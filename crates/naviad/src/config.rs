use navia_core::frame_loop::{LoopSettings, DEFAULT_DOWNSCALE_FACTOR};
use navia_core::objects::DEFAULT_OBJECT_CONFIDENCE;
use navia_core::types::DEFAULT_DISTANCE_THRESHOLD;
use navia_hw::speech::{DEFAULT_SPEECH_COMMAND, DEFAULT_SPEECH_RATE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Daemon configuration.
///
/// Built from defaults, then the TOML file named by `NAVIA_CONFIG` (if any),
/// then `NAVIA_*` environment variables. Later layers win.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Read frames from this image directory instead of the camera.
    pub replay_dir: Option<PathBuf>,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Directory of `<name>.jpg` gallery images.
    pub gallery_dir: PathBuf,
    /// Largest embedding distance that still counts as a match.
    pub distance_threshold: f32,
    /// Face work runs on frames shrunk by this factor.
    pub downscale_factor: u32,
    /// Number of warmup frames to discard at startup (camera AGC/AE stabilization).
    pub warmup_frames: usize,
    /// Minimum YOLO class score.
    pub object_confidence: f32,
    /// Text-to-speech program.
    pub speech_command: String,
    /// Words per minute.
    pub speech_rate: u32,
    /// Where the annotated frame is written each cycle; none disables it.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            replay_dir: None,
            model_dir: navia_core::default_model_dir(),
            gallery_dir: navia_core::default_gallery_dir(),
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            downscale_factor: DEFAULT_DOWNSCALE_FACTOR,
            warmup_frames: 4,
            object_confidence: DEFAULT_OBJECT_CONFIDENCE,
            speech_command: DEFAULT_SPEECH_COMMAND.to_string(),
            speech_rate: DEFAULT_SPEECH_RATE,
            snapshot_path: None,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_sources(&|key: &str| std::env::var(key).ok())
    }

    /// Layer the optional TOML file and environment overrides over defaults.
    pub fn from_sources(env: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match env("NAVIA_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(env);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(&mut self, env: &dyn Fn(&str) -> Option<String>) {
        if let Some(v) = env("NAVIA_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = env("NAVIA_REPLAY_DIR") {
            self.replay_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = env("NAVIA_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = env("NAVIA_GALLERY_DIR") {
            self.gallery_dir = PathBuf::from(v);
        }
        if let Some(v) = env("NAVIA_SPEECH_COMMAND") {
            self.speech_command = v;
        }
        if let Some(v) = env("NAVIA_SNAPSHOT_PATH") {
            self.snapshot_path = Some(PathBuf::from(v));
        }
        self.distance_threshold = env_f32(env, "NAVIA_DISTANCE_THRESHOLD", self.distance_threshold);
        self.downscale_factor = env_u32(env, "NAVIA_DOWNSCALE_FACTOR", self.downscale_factor).max(1);
        self.warmup_frames = env_usize(env, "NAVIA_WARMUP_FRAMES", self.warmup_frames);
        self.object_confidence = env_f32(env, "NAVIA_OBJECT_CONFIDENCE", self.object_confidence);
        self.speech_rate = env_u32(env, "NAVIA_SPEECH_RATE", self.speech_rate);
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join(navia_core::SCRFD_MODEL)
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> PathBuf {
        self.model_dir.join(navia_core::ARCFACE_MODEL)
    }

    /// Path to the YOLOv8 object model.
    pub fn yolo_model_path(&self) -> PathBuf {
        self.model_dir.join(navia_core::YOLO_MODEL)
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            gallery_dir: self.gallery_dir.clone(),
            distance_threshold: self.distance_threshold,
            downscale_factor: self.downscale_factor.max(1),
        }
    }
}

fn env_f32(env: &dyn Fn(&str) -> Option<String>, key: &str, default: f32) -> f32 {
    env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(env: &dyn Fn(&str) -> Option<String>, key: &str, default: u32) -> u32 {
    env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(env: &dyn Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
