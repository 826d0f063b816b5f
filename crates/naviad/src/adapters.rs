//! Hardware and filesystem implementations of the frame loop's collaborators.

use navia_core::{Acquired, FrameSource, PerceptionError, Speaker};
use navia_hw::{Camera, Voice};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Live frames from a V4L2 camera.
pub struct CameraSource {
    camera: Camera,
}

impl CameraSource {
    /// Wrap an opened camera, discarding `warmup_frames` first.
    pub fn new(mut camera: Camera, warmup_frames: usize) -> Self {
        if warmup_frames > 0 {
            tracing::info!(count = warmup_frames, "discarding warmup frames");
            if let Err(e) = camera.warm_up(warmup_frames) {
                tracing::warn!(error = %e, "warmup capture failed");
            }
        }
        Self { camera }
    }
}

impl FrameSource for CameraSource {
    fn acquire(&mut self) -> Result<Acquired, PerceptionError> {
        let frame = self
            .camera
            .capture_frame()
            .map_err(|e| PerceptionError::Source(e.to_string()))?;
        if frame.is_dark {
            tracing::debug!(seq = frame.sequence, "dark frame");
        }
        let image = frame
            .into_rgb_image()
            .map_err(|e| PerceptionError::Source(e.to_string()))?;
        Ok(Acquired::Frame(image))
    }
}

/// Frames read from the image files of a directory, in file-name order.
pub struct ReplaySource {
    files: VecDeque<PathBuf>,
}

impl ReplaySource {
    pub fn open(dir: &Path) -> Result<Self, PerceptionError> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image(path))
            .collect();
        files.sort();
        tracing::info!(dir = %dir.display(), frames = files.len(), "replaying image directory");
        Ok(Self {
            files: files.into(),
        })
    }
}

impl FrameSource for ReplaySource {
    fn acquire(&mut self) -> Result<Acquired, PerceptionError> {
        while let Some(path) = self.files.pop_front() {
            match image::open(&path) {
                Ok(img) => return Ok(Acquired::Frame(img.to_rgb8())),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "unreadable frame; skipping"),
            }
        }
        Ok(Acquired::EndOfStream)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png" | "bmp"))
        .unwrap_or(false)
}

/// Speech through the configured TTS program.
pub struct VoiceSpeaker {
    voice: Voice,
}

impl VoiceSpeaker {
    pub fn new(voice: Voice) -> Self {
        Self { voice }
    }
}

impl Speaker for VoiceSpeaker {
    fn say(&mut self, text: &str) -> Result<(), PerceptionError> {
        self.voice
            .say(text)
            .map_err(|e| PerceptionError::Speech(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn frame_of(acquired: Acquired) -> Option<RgbImage> {
        match acquired {
            Acquired::Frame(frame) => Some(frame),
            Acquired::EndOfStream => None,
        }
    }

    #[test]
    fn test_replay_in_name_order_then_end() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(4, 4, Rgb([200, 0, 0])).save(dir.path().join("b.png")).unwrap();
        RgbImage::from_pixel(4, 4, Rgb([0, 200, 0])).save(dir.path().join("a.png")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

        let mut source = ReplaySource::open(dir.path()).unwrap();

        let first = frame_of(source.acquire().unwrap()).unwrap();
        assert_eq!(first.get_pixel(0, 0), &Rgb([0, 200, 0]));
        let second = frame_of(source.acquire().unwrap()).unwrap();
        assert_eq!(second.get_pixel(0, 0), &Rgb([200, 0, 0]));
        assert!(matches!(source.acquire().unwrap(), Acquired::EndOfStream));
        assert!(matches!(source.acquire().unwrap(), Acquired::EndOfStream));
    }

    #[test]
    fn test_replay_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"garbage").unwrap();
        RgbImage::from_pixel(4, 4, Rgb([9, 9, 9])).save(dir.path().join("b.png")).unwrap();

        let mut source = ReplaySource::open(dir.path()).unwrap();
        let frame = frame_of(source.acquire().unwrap()).unwrap();
        assert_eq!(frame.dimensions(), (4, 4));
    }

    #[test]
    fn test_replay_missing_dir() {
        assert!(ReplaySource::open(Path::new("/nonexistent/frames")).is_err());
    }

    #[test]
    fn test_voice_speaker_reports_failure() {
        let mut speaker = VoiceSpeaker::new(Voice::new("false", 150));
        assert!(matches!(speaker.say("hi"), Err(PerceptionError::Speech(_))));
    }
}
