//! Collaborator seams of the frame loop.
//!
//! The loop only talks to cameras, models, speech, keyboard and screen
//! through these traits, so every cycle can be driven by scripted stand-ins.

use crate::types::{BoundingBox, DetectedFace, DetectedObject, Identity};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PerceptionError {
    #[error("face detector: {0}")]
    Detector(#[from] crate::detector::DetectorError),
    #[error("face recognizer: {0}")]
    Recognizer(#[from] crate::recognizer::RecognizerError),
    #[error("object detector: {0}")]
    Objects(#[from] crate::objects::ObjectDetectorError),
    #[error("frame source: {0}")]
    Source(String),
    #[error("speech: {0}")]
    Speech(String),
    #[error("input: {0}")]
    Input(#[from] std::io::Error),
    #[error("display: {0}")]
    Display(String),
}

/// What a frame source handed back.
#[derive(Debug)]
pub enum Acquired {
    Frame(RgbImage),
    /// The source has no more frames. Distinct from a failure.
    EndOfStream,
}

/// Sequential color frames (camera, replay directory, ...).
pub trait FrameSource {
    fn acquire(&mut self) -> Result<Acquired, PerceptionError>;
}

/// Face detection plus embedding extraction.
pub trait FaceAnalyzer {
    /// Faces in `image`, strongest detection first. Boxes are in `image`
    /// coordinates.
    fn analyze(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, PerceptionError>;
}

/// Labelled object detection.
pub trait ObjectDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectedObject>, PerceptionError>;
}

/// Blocking speech output: returns once the utterance has been spoken.
pub trait Speaker {
    fn say(&mut self, text: &str) -> Result<(), PerceptionError>;
}

/// User's answer to "save this face?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveDecision {
    Save,
    Skip,
}

/// Blocking interactive input for the enrollment workflow.
pub trait EnrollmentPrompt {
    /// A single discrete save/skip choice. Anything unrecognised is `Skip`.
    fn save_decision(&mut self) -> Result<SaveDecision, PerceptionError>;
    /// Free-text name entry.
    fn read_name(&mut self) -> Result<String, PerceptionError>;
}

/// A face box and the name drawn next to it, in full-frame coordinates.
#[derive(Debug, Clone)]
pub struct FaceAnnotation {
    pub bbox: BoundingBox,
    pub identity: Identity,
}

/// Whether the loop should keep going after a display step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayControl {
    Continue,
    Quit,
}

/// Shows the current frame with its annotations and reports the quit key.
pub trait FrameDisplay {
    fn present(
        &mut self,
        frame: &RgbImage,
        faces: &[FaceAnnotation],
    ) -> Result<DisplayControl, PerceptionError>;
}
