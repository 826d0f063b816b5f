//! navia-core — perception and feedback engine.
//!
//! Recognizes gallery faces with SCRFD + ArcFace, locates obstacles with
//! YOLOv8 (all via ONNX Runtime on the CPU), and turns each camera frame into
//! at most one spoken sentence. Unknown faces can be enrolled on the spot.

pub mod alignment;
pub mod analyzer;
pub mod detector;
pub mod enrollment;
pub mod feedback;
pub mod frame_loop;
pub mod gallery;
pub mod imaging;
pub mod objects;
pub mod perception;
pub mod recognizer;
pub mod types;
pub mod zones;

pub use analyzer::OnnxFaceAnalyzer;
pub use enrollment::{Enrollment, EnrollmentEffect, EnrollmentEvent, EnrollmentState};
pub use feedback::Guidance;
pub use frame_loop::{Collaborators, Cycle, CycleReport, FrameLoop, LoopExit, LoopSettings};
pub use gallery::Gallery;
pub use objects::YoloDetector;
pub use perception::{
    Acquired, DisplayControl, EnrollmentPrompt, FaceAnalyzer, FaceAnnotation, FrameDisplay,
    FrameSource, ObjectDetector, PerceptionError, SaveDecision, Speaker,
};
pub use types::{
    BoundingBox, DetectedFace, DetectedObject, Embedding, EnrolledFace, EuclideanMatcher, Identity,
    MatchResult, Matcher,
};
pub use zones::{Zone, ZoneTally};

use std::path::PathBuf;

pub const SCRFD_MODEL: &str = "det_10g.onnx";
pub const ARCFACE_MODEL: &str = "w600k_r50.onnx";
pub const YOLO_MODEL: &str = "yolov8n.onnx";

fn data_home() -> PathBuf {
    std::env::var_os("XDG_DATA_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join("navia")
}

/// Where the ONNX models live unless configured otherwise.
pub fn default_model_dir() -> PathBuf {
    data_home().join("models")
}

/// Where gallery images live unless configured otherwise.
pub fn default_gallery_dir() -> PathBuf {
    data_home().join("faces")
}
