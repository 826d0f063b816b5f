use serde::{Deserialize, Serialize};
use std::fmt;

/// Euclidean acceptance threshold for a gallery match (lower = stricter).
///
/// ArcFace embeddings are L2-normalized, so `d² = 2 − 2·cos`. A match at
/// cosine ≥ 0.40 becomes `d ≤ √1.2 ≈ 1.095`.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 1.095;

/// Axis-aligned bounding box with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Box without landmarks, full confidence.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence: 1.0,
            landmarks: None,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Scale geometry (and landmarks) by `factor`, e.g. from a quarter-size
    /// detection frame back to full resolution.
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
            confidence: self.confidence,
            landmarks: self
                .landmarks
                .map(|lms| lms.map(|(lx, ly)| (lx * factor, ly * factor))),
        }
    }

    /// Intersection-over-Union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter_w = (self.right().min(other.right()) - self.x.max(other.x)).max(0.0);
        let inter_h = (self.bottom().min(other.bottom()) - self.y.max(other.y)).max(0.0);
        let inter_area = inter_w * inter_h;

        let union_area = self.width * self.height + other.width * other.height - inter_area;
        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Euclidean distance between two embeddings.
    ///
    /// Embeddings of different length are never comparable and report
    /// `f32::INFINITY`.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// An identity in the gallery: name derived from the source file stem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrolledFace {
    pub name: String,
    pub embedding: Embedding,
}

/// A face found in the downscaled frame of the current cycle.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    /// Bounding box in downscaled-frame coordinates.
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// An object found by the obstacle detector, in full-frame coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedObject {
    pub bbox: BoundingBox,
    pub label: String,
    pub confidence: f32,
}

impl DetectedObject {
    pub fn new(label: impl Into<String>, bbox: BoundingBox) -> Self {
        let confidence = bbox.confidence;
        Self {
            bbox,
            label: label.into(),
            confidence,
        }
    }

    /// Horizontal center in whole pixels: corners truncated, then halved
    /// with integer division.
    pub fn center_x(&self) -> i64 {
        let x1 = self.bbox.x as i64;
        let x2 = self.bbox.right() as i64;
        (x1 + x2).div_euclid(2)
    }
}

/// Outcome of identifying one face.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Identity {
    Known(String),
    Unknown,
}

impl Identity {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Identity::Unknown)
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Identity::Known(name) => Some(name),
            Identity::Unknown => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Known(name) => f.write_str(name),
            Identity::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub identity: Identity,
    /// Distance to the closest gallery entry, `None` for an empty gallery.
    pub distance: Option<f32>,
    /// Position of the matched entry in the gallery.
    pub gallery_index: Option<usize>,
}

impl MatchResult {
    pub fn unknown(distance: Option<f32>) -> Self {
        Self {
            identity: Identity::Unknown,
            distance,
            gallery_index: None,
        }
    }
}

/// Strategy for comparing a probe embedding against a gallery of enrolled faces.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[EnrolledFace], threshold: f32) -> MatchResult;
}

/// Euclidean-distance matcher.
///
/// Every entry within `threshold` (inclusive) is a candidate; the closest
/// candidate wins and ties keep the lowest gallery index. When nothing is
/// within threshold the face is Unknown, however close the nearest entry.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[EnrolledFace], threshold: f32) -> MatchResult {
        let mut best: Option<(usize, f32)> = None;

        for (i, face) in gallery.iter().enumerate() {
            let dist = probe.euclidean_distance(&face.embedding);
            if dist.is_nan() {
                tracing::warn!(name = %face.name, "NaN embedding distance; entry ignored");
                continue;
            }
            // Strict comparison keeps the earliest index on ties.
            if best.map_or(true, |(_, best_dist)| dist < best_dist) {
                best = Some((i, dist));
            }
        }

        match best {
            Some((idx, dist)) if dist <= threshold => MatchResult {
                identity: Identity::Known(gallery[idx].name.clone()),
                distance: Some(dist),
                gallery_index: Some(idx),
            },
            Some((_, dist)) => MatchResult::unknown(Some(dist)),
            None => MatchResult::unknown(None),
        }
    }
}
