//! YOLOv8 obstacle detector via ONNX Runtime.
//!
//! Letterboxes the full-resolution frame to the model size, decodes the
//! `[1, 4 + classes, anchors]` output (either layout), and applies per-class
//! NMS. Boxes come back in frame coordinates with COCO labels.

use crate::imaging::{self, LetterboxInfo};
use crate::perception::{ObjectDetector, PerceptionError};
use crate::types::{BoundingBox, DetectedObject};
use image::{Rgb, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const YOLO_INPUT_SIZE: u32 = 640;
const YOLO_PAD_VALUE: u8 = 114;
pub const DEFAULT_OBJECT_CONFIDENCE: f32 = 0.25;
const YOLO_NMS_THRESHOLD: f32 = 0.45;
const YOLO_MAX_DETECTIONS: usize = 100;

/// Class names of the COCO-trained YOLOv8 models, by class index.
pub const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

#[derive(Error, Debug)]
pub enum ObjectDetectorError {
    #[error("model file not found: {0} — export yolov8n.onnx with ultralytics into the model directory")]
    ModelNotFound(String),
    #[error("unexpected YOLO output shape: {0:?}")]
    UnexpectedShape(Vec<usize>),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// YOLOv8 detector backed by an ONNX Runtime session.
pub struct YoloDetector {
    session: Session,
    confidence: f32,
}

impl YoloDetector {
    pub fn load(model_path: &Path, confidence: f32) -> Result<Self, ObjectDetectorError> {
        if !model_path.exists() {
            return Err(ObjectDetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), confidence, "loaded YOLO model");
        Ok(Self { session, confidence })
    }

    pub fn detect(&mut self, frame: &RgbImage) -> Result<Vec<DetectedObject>, ObjectDetectorError> {
        let (input, letterbox) = preprocess(frame);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ObjectDetectorError::InferenceFailed(format!("detections: {e}")))?;
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

        let objects = decode_output(data, &dims, self.confidence, &letterbox)?;
        tracing::debug!(count = objects.len(), "objects detected");
        Ok(objects)
    }
}

impl ObjectDetector for YoloDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectedObject>, PerceptionError> {
        Ok(YoloDetector::detect(self, image)?)
    }
}

/// Letterbox with YOLO gray padding, scale to [0, 1], NCHW.
fn preprocess(frame: &RgbImage) -> (Array4<f32>, LetterboxInfo) {
    let pad = Rgb([YOLO_PAD_VALUE; 3]);
    let (canvas, letterbox) = imaging::letterbox(frame, YOLO_INPUT_SIZE, pad);

    let size = YOLO_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, px) in canvas.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = px[c] as f32 / 255.0;
        }
    }
    (tensor, letterbox)
}

/// Decode raw YOLOv8 output into labelled boxes.
///
/// Accepts `[1, features, anchors]` (the ultralytics export default) and
/// `[1, anchors, features]`. Features are `cx, cy, w, h` then one score per
/// class.
fn decode_output(
    data: &[f32],
    dims: &[usize],
    confidence: f32,
    letterbox: &LetterboxInfo,
) -> Result<Vec<DetectedObject>, ObjectDetectorError> {
    let &[_, a, b] = dims else {
        return Err(ObjectDetectorError::UnexpectedShape(dims.to_vec()));
    };
    // Anchors always outnumber features.
    let transposed = a < b;
    let (num_anchors, num_feats) = if transposed { (b, a) } else { (a, b) };
    if num_feats <= 4 || data.len() < num_anchors * num_feats {
        return Err(ObjectDetectorError::UnexpectedShape(dims.to_vec()));
    }

    let value = |anchor: usize, feat: usize| {
        if transposed {
            data[feat * num_anchors + anchor]
        } else {
            data[anchor * num_feats + feat]
        }
    };

    let mut candidates = Vec::new();
    for anchor in 0..num_anchors {
        let (class_id, score) = (4..num_feats)
            .map(|f| (f - 4, value(anchor, f)))
            .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
        if score < confidence {
            continue;
        }

        let (cx, cy, w, h) = (value(anchor, 0), value(anchor, 1), value(anchor, 2), value(anchor, 3));
        let (x1, y1) = letterbox.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.unmap(cx + w / 2.0, cy + h / 2.0);

        let label = COCO_LABELS
            .get(class_id)
            .map(|l| l.to_string())
            .unwrap_or_else(|| format!("class {class_id}"));

        candidates.push(DetectedObject {
            bbox: BoundingBox {
                confidence: score,
                ..BoundingBox::new(x1, y1, x2 - x1, y2 - y1)
            },
            label,
            confidence: score,
        });
    }

    let mut kept = imaging::non_max_suppression(
        candidates,
        |o| &o.bbox,
        |a, b| a.label == b.label,
        YOLO_NMS_THRESHOLD,
    );
    kept.truncate(YOLO_MAX_DETECTIONS);
    Ok(kept)
}
