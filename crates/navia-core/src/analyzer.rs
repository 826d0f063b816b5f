//! SCRFD + ArcFace face analyzer.

use crate::detector::FaceDetector;
use crate::perception::{FaceAnalyzer, PerceptionError};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::DetectedFace;
use image::RgbImage;
use std::path::Path;

/// Detects faces with SCRFD and embeds each one with ArcFace.
pub struct OnnxFaceAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceAnalyzer {
    pub fn load(scrfd_path: &Path, arcface_path: &Path) -> Result<Self, PerceptionError> {
        let detector = FaceDetector::load(scrfd_path)?;
        let recognizer = FaceRecognizer::load(arcface_path)?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceAnalyzer for OnnxFaceAnalyzer {
    fn analyze(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, PerceptionError> {
        let boxes = self.detector.detect(image)?;

        let mut faces = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            match self.recognizer.extract(image, &bbox) {
                Ok(embedding) => faces.push(DetectedFace { bbox, embedding }),
                Err(RecognizerError::NoLandmarks) => {
                    tracing::debug!(confidence = bbox.confidence, "face without landmarks; not embedded");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(faces)
    }
}
