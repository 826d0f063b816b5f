//! Headless frame display: annotated snapshots on disk plus the quit signal.

use image::Rgb;
use navia_core::imaging::{draw_box, draw_label, LABEL_HEIGHT};
use navia_core::{DisplayControl, FaceAnnotation, FrameDisplay, PerceptionError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const FACE_BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const FACE_BOX_THICKNESS: u32 = 2;
/// Gap between the name and the top of its box.
const LABEL_OFFSET: u32 = 10;

/// Writes each annotated frame to `path` (when set) and reports `Quit` once
/// `shutdown` is raised.
pub struct SnapshotDisplay {
    path: Option<PathBuf>,
    shutdown: Arc<AtomicBool>,
}

impl SnapshotDisplay {
    pub fn new(path: Option<PathBuf>, shutdown: Arc<AtomicBool>) -> Self {
        Self { path, shutdown }
    }
}

impl FrameDisplay for SnapshotDisplay {
    fn present(
        &mut self,
        frame: &image::RgbImage,
        faces: &[FaceAnnotation],
    ) -> Result<DisplayControl, PerceptionError> {
        for face in faces {
            tracing::debug!(
                identity = %face.identity,
                x = face.bbox.x,
                y = face.bbox.y,
                "face on screen"
            );
        }

        let save_result = match &self.path {
            Some(path) => annotate(frame, faces)
                .save(path)
                .map_err(|e| PerceptionError::Display(format!("{}: {e}", path.display()))),
            None => Ok(()),
        };

        // Quit must not depend on the snapshot being writable.
        if self.shutdown.load(Ordering::SeqCst) {
            if let Err(e) = save_result {
                tracing::warn!(error = %e, "snapshot not written");
            }
            return Ok(DisplayControl::Quit);
        }
        save_result.map(|()| DisplayControl::Continue)
    }
}

/// Copy of `frame` with a box and the identity name above each face.
fn annotate(frame: &image::RgbImage, faces: &[FaceAnnotation]) -> image::RgbImage {
    let mut annotated = frame.clone();
    for face in faces {
        draw_box(&mut annotated, &face.bbox, FACE_BOX_COLOR, FACE_BOX_THICKNESS);
        let left = face.bbox.x.max(0.0) as u32;
        let top = (face.bbox.y.max(0.0) as u32).saturating_sub(LABEL_OFFSET);
        let top = top.min(annotated.height().saturating_sub(LABEL_HEIGHT));
        draw_label(&mut annotated, left, top, &face.identity.to_string(), FACE_BOX_COLOR);
    }
    annotated
}
