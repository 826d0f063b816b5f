use crate::adapters::{CameraSource, ReplaySource, VoiceSpeaker};
use crate::config::Config;
use crate::console::ConsolePrompt;
use crate::display::SnapshotDisplay;
use navia_core::frame_loop::LoopError;
use navia_core::objects::ObjectDetectorError;
use navia_core::{
    Collaborators, FrameLoop, FrameSource, LoopExit, OnnxFaceAnalyzer, PerceptionError, YoloDetector,
};
use navia_hw::{Camera, Voice};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] navia_hw::CameraError),
    #[error("face models: {0}")]
    Faces(#[from] PerceptionError),
    #[error("object model: {0}")]
    Objects(#[from] ObjectDetectorError),
    #[error("gallery: {0}")]
    Loop(#[from] LoopError),
    #[error("failed to spawn loop thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("loop thread exited")]
    ChannelClosed,
}

/// How the loop thread ended.
#[derive(Debug, Clone, Copy)]
pub struct LoopOutcome {
    pub exit: LoopExit,
    pub cycles: u64,
}

/// Handle to the loop thread.
pub struct LoopHandle {
    ready: Option<oneshot::Receiver<Result<usize, EngineError>>>,
    done: oneshot::Receiver<LoopOutcome>,
}

impl LoopHandle {
    /// Wait until the thread has opened the source and loaded every model.
    /// Returns the number of gallery identities.
    pub async fn ready(&mut self) -> Result<usize, EngineError> {
        let ready = self.ready.take().ok_or(EngineError::ChannelClosed)?;
        ready.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Wait for the loop to stop.
    pub async fn finished(self) -> Result<LoopOutcome, EngineError> {
        self.done.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the frame loop on a dedicated OS thread.
///
/// The thread opens the frame source, loads the three ONNX models and the
/// gallery, reports readiness, then runs until quit, end of stream or a
/// capture failure. Startup failures are reported through
/// [`LoopHandle::ready`].
pub fn spawn_loop(config: Config, shutdown: Arc<AtomicBool>) -> Result<LoopHandle, EngineError> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let (done_tx, done_rx) = oneshot::channel();

    std::thread::Builder::new()
        .name("navia-loop".into())
        .spawn(move || {
            let mut frame_loop = match build_loop(&config, shutdown) {
                Ok(frame_loop) => frame_loop,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(frame_loop.gallery().len()));

            tracing::info!("loop thread started");
            let (exit, cycles) = frame_loop.run();
            tracing::info!(?exit, cycles, "loop thread exiting");
            let _ = done_tx.send(LoopOutcome { exit, cycles });
        })
        .map_err(EngineError::Spawn)?;

    Ok(LoopHandle {
        ready: Some(ready_rx),
        done: done_rx,
    })
}

/// Open the source and load models synchronously (fail-fast).
fn build_loop(config: &Config, shutdown: Arc<AtomicBool>) -> Result<FrameLoop, EngineError> {
    let source: Box<dyn FrameSource> = match &config.replay_dir {
        Some(dir) => Box::new(ReplaySource::open(dir)?),
        None => {
            let camera = Camera::open(&config.camera_device)?;
            tracing::info!(
                device = %config.camera_device,
                width = camera.width,
                height = camera.height,
                fourcc = ?camera.fourcc,
                "camera opened"
            );
            Box::new(CameraSource::new(camera, config.warmup_frames))
        }
    };

    let faces = OnnxFaceAnalyzer::load(&config.scrfd_model_path(), &config.arcface_model_path())?;
    tracing::info!(dir = %config.model_dir.display(), "face models loaded");

    let objects = YoloDetector::load(&config.yolo_model_path(), config.object_confidence)?;

    let voice = Voice::new(config.speech_command.clone(), config.speech_rate);
    let io = Collaborators {
        source,
        faces: Box::new(faces),
        objects: Box::new(objects),
        speaker: Box::new(VoiceSpeaker::new(voice)),
        prompt: Box::new(ConsolePrompt::stdio()),
        display: Box::new(SnapshotDisplay::new(config.snapshot_path.clone(), shutdown)),
    };

    Ok(FrameLoop::start(config.loop_settings(), io)?)
}
