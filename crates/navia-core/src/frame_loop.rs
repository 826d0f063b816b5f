//! The perception-and-feedback loop.
//!
//! One cycle: acquire → downscale → faces + objects → match → enroll unknown
//! faces → obstacle guidance (unless an enrollment ran) → display. Everything
//! is synchronous; enrollment prompts and speech block the whole loop.

use crate::enrollment::{
    Enrollment, EnrollmentEffect, EnrollmentEvent, PendingFace, SaveRequest, UNKNOWN_PERSON_NOTICE,
};
use crate::feedback::{self, Guidance};
use crate::gallery::{Gallery, GalleryError};
use crate::imaging;
use crate::perception::{
    Acquired, DisplayControl, EnrollmentPrompt, FaceAnalyzer, FaceAnnotation, FrameDisplay,
    FrameSource, ObjectDetector, Speaker,
};
use crate::types::{
    BoundingBox, DetectedObject, Embedding, EuclideanMatcher, MatchResult, Matcher,
    DEFAULT_DISTANCE_THRESHOLD,
};
use crate::zones::ZoneTally;
use image::RgbImage;
use std::path::PathBuf;
use thiserror::Error;

/// Default shrink factor for face work.
pub const DEFAULT_DOWNSCALE_FACTOR: u32 = 4;

#[derive(Error, Debug)]
pub enum LoopError {
    #[error("gallery: {0}")]
    Gallery(#[from] GalleryError),
    #[error("face box lies outside the frame")]
    EmptyCrop,
}

/// Tunables of the loop.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub gallery_dir: PathBuf,
    pub distance_threshold: f32,
    pub downscale_factor: u32,
}

impl LoopSettings {
    pub fn new(gallery_dir: impl Into<PathBuf>) -> Self {
        Self {
            gallery_dir: gallery_dir.into(),
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            downscale_factor: DEFAULT_DOWNSCALE_FACTOR,
        }
    }
}

/// The loop's external collaborators.
pub struct Collaborators {
    pub source: Box<dyn FrameSource>,
    pub faces: Box<dyn FaceAnalyzer>,
    pub objects: Box<dyn ObjectDetector>,
    pub speaker: Box<dyn Speaker>,
    pub prompt: Box<dyn EnrollmentPrompt>,
    pub display: Box<dyn FrameDisplay>,
}

/// A face of this cycle and who it turned out to be.
#[derive(Debug, Clone)]
pub struct FaceMatch {
    pub face_index: usize,
    /// Box in downscaled-frame coordinates.
    pub bbox: BoundingBox,
    pub result: MatchResult,
}

/// What happened during one completed cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub faces: Vec<FaceMatch>,
    /// Names saved to the gallery this cycle.
    pub enrolled: Vec<String>,
    /// An enrollment ran, so obstacle feedback was suppressed.
    pub enrollment_ran: bool,
    pub guidance: Option<Guidance>,
    pub control: DisplayControl,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Quit,
    EndOfStream,
    CaptureFailed,
}

#[derive(Debug, Clone)]
pub enum Cycle {
    Completed(CycleReport),
    Stopped(LoopExit),
}

/// Owns the gallery and the enrollment workflow and drives the collaborators.
pub struct FrameLoop {
    settings: LoopSettings,
    gallery: Gallery,
    matcher: EuclideanMatcher,
    enrollment: Enrollment,
    io: Collaborators,
}

impl FrameLoop {
    pub fn new(settings: LoopSettings, gallery: Gallery, io: Collaborators) -> Self {
        Self {
            settings,
            gallery,
            matcher: EuclideanMatcher,
            enrollment: Enrollment::new(),
            io,
        }
    }

    /// Load the gallery from `settings.gallery_dir` with the loop's own
    /// face analyzer, then build the loop.
    pub fn start(settings: LoopSettings, mut io: Collaborators) -> Result<Self, LoopError> {
        let gallery = Gallery::load(&settings.gallery_dir, io.faces.as_mut())?;
        Ok(Self::new(settings, gallery, io))
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn obstacle_feedback_paused(&self) -> bool {
        self.enrollment.obstacle_feedback_paused()
    }

    /// Run cycles until quit, end of stream or capture failure.
    pub fn run(&mut self) -> (LoopExit, u64) {
        let mut cycles = 0u64;
        loop {
            match self.run_cycle() {
                Cycle::Completed(report) => {
                    cycles += 1;
                    if report.control == DisplayControl::Quit {
                        tracing::info!(cycles, "quit requested");
                        return (LoopExit::Quit, cycles);
                    }
                }
                Cycle::Stopped(exit) => {
                    tracing::info!(cycles, ?exit, "frame loop stopped");
                    return (exit, cycles);
                }
            }
        }
    }

    /// Run exactly one cycle.
    pub fn run_cycle(&mut self) -> Cycle {
        let frame = match self.io.source.acquire() {
            Ok(Acquired::Frame(frame)) => frame,
            Ok(Acquired::EndOfStream) => return Cycle::Stopped(LoopExit::EndOfStream),
            Err(e) => {
                tracing::error!(error = %e, "failed to grab frame");
                return Cycle::Stopped(LoopExit::CaptureFailed);
            }
        };

        let factor = self.settings.downscale_factor.max(1);
        let small = imaging::downscale(&frame, factor);

        let detected_faces = self.io.faces.analyze(&small).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "face analysis failed this cycle");
            Vec::new()
        });
        let objects = match self.io.objects.detect(&frame) {
            Ok(objects) => Some(objects),
            Err(e) => {
                tracing::warn!(error = %e, "object detection failed this cycle");
                None
            }
        };

        let mut faces = Vec::with_capacity(detected_faces.len());
        let mut enrolled = Vec::new();
        let mut enrollment_ran = false;

        for (face_index, face) in detected_faces.into_iter().enumerate() {
            let mut result = self.identify(&face.embedding);

            if result.identity.is_unknown() {
                enrollment_ran = true;
                let pending = PendingFace {
                    face_index,
                    bbox: face.bbox.clone(),
                };
                if let Some(name) = self.enroll(&frame, pending) {
                    enrolled.push(name);
                    result = self.identify(&face.embedding);
                }
            }

            tracing::debug!(face_index, identity = %result.identity, distance = ?result.distance, "face matched");
            faces.push(FaceMatch {
                face_index,
                bbox: face.bbox,
                result,
            });
        }

        let guidance = if enrollment_ran {
            tracing::debug!("enrollment ran; obstacle feedback suppressed this cycle");
            None
        } else {
            objects.and_then(|objects| self.obstacle_guidance(&objects, frame.width()))
        };
        if let Some(g) = &guidance {
            self.speak(&g.to_string());
        }

        let annotations: Vec<FaceAnnotation> = faces
            .iter()
            .map(|f| FaceAnnotation {
                bbox: f.bbox.scaled(factor as f32),
                identity: f.result.identity.clone(),
            })
            .collect();
        let control = self
            .io
            .display
            .present(&frame, &annotations)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "display failed this cycle");
                DisplayControl::Continue
            });

        Cycle::Completed(CycleReport {
            faces,
            enrolled,
            enrollment_ran,
            guidance,
            control,
        })
    }

    fn identify(&self, probe: &Embedding) -> MatchResult {
        self.matcher
            .compare(probe, self.gallery.faces(), self.settings.distance_threshold)
    }

    /// Zone tally and feedback decision. Always `None` while an enrollment
    /// is in progress.
    fn obstacle_guidance(&self, objects: &[DetectedObject], frame_width: u32) -> Option<Guidance> {
        if self.enrollment.obstacle_feedback_paused() {
            return None;
        }
        let tally = ZoneTally::classify(objects, frame_width);
        feedback::decide(&tally)
    }

    /// Drive the enrollment workflow for one unknown face until it is back
    /// to idle. Returns the saved name, if any.
    fn enroll(&mut self, frame: &RgbImage, pending: PendingFace) -> Option<String> {
        let mut event = EnrollmentEvent::UnknownFace(pending);
        let mut saved = None;

        loop {
            let effect = match self.enrollment.handle(event) {
                Ok(effect) => effect,
                Err(e) => {
                    tracing::warn!(error = %e, "enrollment aborted");
                    let _ = self.enrollment.handle(EnrollmentEvent::Abort);
                    return None;
                }
            };

            event = match effect {
                EnrollmentEffect::AnnounceUnknown => {
                    self.speak(UNKNOWN_PERSON_NOTICE);
                    match self.io.prompt.save_decision() {
                        Ok(decision) => EnrollmentEvent::Decision(decision),
                        Err(e) => {
                            tracing::warn!(error = %e, "no save decision; skipping");
                            EnrollmentEvent::Abort
                        }
                    }
                }
                EnrollmentEffect::PromptName => match self.io.prompt.read_name() {
                    Ok(name) => EnrollmentEvent::Name(name),
                    Err(e) => {
                        tracing::warn!(error = %e, "no name entered; skipping");
                        EnrollmentEvent::Abort
                    }
                },
                EnrollmentEffect::Persist(request) => match self.persist(frame, &request) {
                    Ok(gallery) => {
                        if gallery.get(&request.name).is_some() {
                            tracing::info!(name = %request.name, faces = gallery.len(), "face enrolled");
                            saved = Some(request.name);
                        } else {
                            tracing::warn!(name = %request.name, "saved crop has no detectable face; not enrolled");
                        }
                        self.gallery = gallery;
                        EnrollmentEvent::Finished
                    }
                    Err(e) => {
                        tracing::warn!(name = %request.name, error = %e, "enrollment failed; gallery unchanged");
                        EnrollmentEvent::Abort
                    }
                },
                EnrollmentEffect::Resume => return saved,
            };
        }
    }

    /// Save the crop and build the replacement gallery. The current gallery
    /// is untouched until the caller swaps the result in.
    fn persist(&mut self, frame: &RgbImage, request: &SaveRequest) -> Result<Gallery, LoopError> {
        let crop = imaging::crop_enrollment_face(frame, &request.face.bbox, self.settings.downscale_factor)
            .ok_or(LoopError::EmptyCrop)?;
        Gallery::write_source(&self.settings.gallery_dir, &request.name, &crop)?;
        Ok(Gallery::load(&self.settings.gallery_dir, self.io.faces.as_mut())?)
    }

    fn speak(&mut self, text: &str) {
        tracing::info!(utterance = text, "speaking");
        if let Err(e) = self.io.speaker.say(text) {
            tracing::warn!(error = %e, "speech failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::{PerceptionError, SaveDecision};
    use crate::types::{DetectedFace, EnrolledFace, Identity};
    use image::Rgb;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    struct Frames(VecDeque<RgbImage>);

    impl FrameSource for Frames {
        fn acquire(&mut self) -> Result<Acquired, PerceptionError> {
            Ok(self.0.pop_front().map_or(Acquired::EndOfStream, Acquired::Frame))
        }
    }

    struct BrokenCamera;

    impl FrameSource for BrokenCamera {
        fn acquire(&mut self) -> Result<Acquired, PerceptionError> {
            Err(PerceptionError::Source("device unplugged".into()))
        }
    }

    /// Reports the same faces for every image.
    struct SameFaces(Vec<DetectedFace>);

    impl FaceAnalyzer for SameFaces {
        fn analyze(&mut self, _: &RgbImage) -> Result<Vec<DetectedFace>, PerceptionError> {
            Ok(self.0.clone())
        }
    }

    struct SameObjects(Vec<DetectedObject>);

    impl ObjectDetector for SameObjects {
        fn detect(&mut self, _: &RgbImage) -> Result<Vec<DetectedObject>, PerceptionError> {
            Ok(self.0.clone())
        }
    }

    struct FailingObjects;

    impl ObjectDetector for FailingObjects {
        fn detect(&mut self, _: &RgbImage) -> Result<Vec<DetectedObject>, PerceptionError> {
            Err(PerceptionError::Source("model crashed".into()))
        }
    }

    #[derive(Clone, Default)]
    struct Transcript(Rc<RefCell<Vec<String>>>);

    impl Transcript {
        fn lines(&self) -> Vec<String> {
            self.0.borrow().clone()
        }
    }

    impl Speaker for Transcript {
        fn say(&mut self, text: &str) -> Result<(), PerceptionError> {
            self.0.borrow_mut().push(text.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Script {
        decisions: VecDeque<SaveDecision>,
        names: VecDeque<String>,
    }

    impl EnrollmentPrompt for Script {
        fn save_decision(&mut self) -> Result<SaveDecision, PerceptionError> {
            Ok(self.decisions.pop_front().unwrap_or(SaveDecision::Skip))
        }

        fn read_name(&mut self) -> Result<String, PerceptionError> {
            Ok(self.names.pop_front().unwrap_or_default())
        }
    }

    struct Screen {
        quit_after: Option<usize>,
        shown: usize,
    }

    impl FrameDisplay for Screen {
        fn present(&mut self, _: &RgbImage, _: &[FaceAnnotation]) -> Result<DisplayControl, PerceptionError> {
            self.shown += 1;
            Ok(match self.quit_after {
                Some(n) if self.shown >= n => DisplayControl::Quit,
                _ => DisplayControl::Continue,
            })
        }
    }

    fn object_at(label: &str, center_x: f32) -> DetectedObject {
        DetectedObject::new(label, BoundingBox::new(center_x - 10.0, 0.0, 20.0, 20.0))
    }

    fn face(values: Vec<f32>) -> DetectedFace {
        DetectedFace {
            bbox: BoundingBox::new(10.0, 10.0, 20.0, 20.0),
            embedding: Embedding::new(values),
        }
    }

    fn frames(count: usize, width: u32) -> Frames {
        Frames((0..count).map(|_| RgbImage::from_pixel(width, 200, Rgb([90, 90, 90]))).collect())
    }

    fn bob_gallery() -> Gallery {
        Gallery::new(vec![
            EnrolledFace { name: "bob".into(), embedding: Embedding::new(vec![0.3, 0.0]) },
            EnrolledFace { name: "eve".into(), embedding: Embedding::new(vec![0.9, 0.0]) },
        ])
    }

    struct Harness {
        frame_loop: FrameLoop,
        speech: Transcript,
        dir: tempfile::TempDir,
    }

    fn harness(
        source: Box<dyn FrameSource>,
        faces: Vec<DetectedFace>,
        objects: Box<dyn ObjectDetector>,
        prompt: Script,
        gallery: Gallery,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let speech = Transcript::default();
        let io = Collaborators {
            source,
            faces: Box::new(SameFaces(faces)),
            objects,
            speaker: Box::new(speech.clone()),
            prompt: Box::new(prompt),
            display: Box::new(Screen { quit_after: None, shown: 0 }),
        };
        Harness {
            frame_loop: FrameLoop::new(LoopSettings::new(dir.path()), gallery, io),
            speech,
            dir,
        }
    }

    fn completed(cycle: Cycle) -> CycleReport {
        match cycle {
            Cycle::Completed(report) => report,
            Cycle::Stopped(exit) => panic!("cycle stopped: {exit:?}"),
        }
    }

    #[test]
    fn test_known_face_and_obstacle_ahead() {
        let mut h = harness(
            Box::new(frames(1, 300)),
            vec![face(vec![0.0, 0.0])],
            Box::new(SameObjects(vec![
                object_at("chair", 50.0),
                object_at("person", 150.0),
                object_at("door", 250.0),
            ])),
            Script::default(),
            bob_gallery(),
        );

        let report = completed(h.frame_loop.run_cycle());
        assert_eq!(report.faces[0].result.identity, Identity::Known("bob".into()));
        assert!(!report.enrollment_ran);
        assert_eq!(h.speech.lines(), vec!["Obstacle ahead: person. Please stop."]);
    }

    #[test]
    fn test_unknown_face_skip_suppresses_obstacles() {
        let mut h = harness(
            Box::new(frames(1, 300)),
            vec![face(vec![5.0, 5.0])],
            Box::new(SameObjects(vec![object_at("person", 150.0)])),
            Script::default(),
            bob_gallery(),
        );

        let report = completed(h.frame_loop.run_cycle());
        assert!(report.enrollment_ran);
        assert!(report.guidance.is_none());
        assert!(report.enrolled.is_empty());
        assert_eq!(h.speech.lines(), vec![UNKNOWN_PERSON_NOTICE]);
        assert_eq!(h.frame_loop.gallery(), &bob_gallery());
        assert!(!h.frame_loop.obstacle_feedback_paused());
    }

    #[test]
    fn test_no_obstacle_feedback_across_enrollment_cycles() {
        let mut h = harness(
            Box::new(frames(5, 300)),
            vec![face(vec![5.0, 5.0])],
            Box::new(SameObjects(vec![object_at("person", 150.0), object_at("chair", 20.0)])),
            Script::default(),
            Gallery::default(),
        );

        let (exit, cycles) = h.frame_loop.run();
        assert_eq!((exit, cycles), (LoopExit::EndOfStream, 5));
        assert_eq!(h.speech.lines(), vec![UNKNOWN_PERSON_NOTICE; 5]);
    }

    #[test]
    fn test_guidance_withheld_while_enrollment_in_progress() {
        let mut h = harness(
            Box::new(frames(0, 300)),
            Vec::new(),
            Box::new(SameObjects(Vec::new())),
            Script::default(),
            Gallery::default(),
        );
        let objects = vec![object_at("person", 150.0)];
        assert!(h.frame_loop.obstacle_guidance(&objects, 300).is_some());

        h.frame_loop
            .enrollment
            .handle(EnrollmentEvent::UnknownFace(PendingFace {
                face_index: 0,
                bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            }))
            .unwrap();
        assert!(h.frame_loop.obstacle_feedback_paused());
        for _ in 0..10 {
            assert!(h.frame_loop.obstacle_guidance(&objects, 300).is_none());
        }
    }

    #[test]
    fn test_empty_name_leaves_gallery_alone() {
        let prompt = Script {
            decisions: VecDeque::from([SaveDecision::Save]),
            names: VecDeque::from(["  ".to_string()]),
        };
        let mut h = harness(
            Box::new(frames(1, 300)),
            vec![face(vec![5.0, 5.0])],
            Box::new(SameObjects(Vec::new())),
            prompt,
            Gallery::default(),
        );

        let report = completed(h.frame_loop.run_cycle());
        assert!(report.enrolled.is_empty());
        assert!(h.frame_loop.gallery().is_empty());
        assert_eq!(std::fs::read_dir(&h.frame_loop.settings.gallery_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_save_keeps_gallery() {
        let prompt = Script {
            decisions: VecDeque::from([SaveDecision::Save]),
            names: VecDeque::from(["dave".to_string()]),
        };
        let mut h = harness(
            Box::new(frames(1, 300)),
            vec![face(vec![5.0, 5.0])],
            Box::new(SameObjects(Vec::new())),
            prompt,
            bob_gallery(),
        );
        // A plain file where the gallery directory should be.
        let blocker = h.dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        h.frame_loop.settings.gallery_dir = blocker;

        let report = completed(h.frame_loop.run_cycle());
        assert!(report.enrolled.is_empty());
        assert!(report.faces[0].result.identity.is_unknown());
        assert_eq!(h.frame_loop.gallery(), &bob_gallery());
        assert!(!h.frame_loop.obstacle_feedback_paused());
    }

    #[test]
    fn test_faceless_crop_is_not_reported_enrolled() {
        /// Finds a face in the downscaled frame but not in the 200x200 crop.
        struct FrameOnly;
        impl FaceAnalyzer for FrameOnly {
            fn analyze(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, PerceptionError> {
                if image.dimensions() == (200, 200) {
                    return Ok(Vec::new());
                }
                Ok(vec![face(vec![5.0, 5.0])])
            }
        }

        let prompt = Script {
            decisions: VecDeque::from([SaveDecision::Save]),
            names: VecDeque::from(["dave".to_string()]),
        };
        let mut h = harness(
            Box::new(frames(1, 300)),
            Vec::new(),
            Box::new(SameObjects(Vec::new())),
            prompt,
            Gallery::default(),
        );
        h.frame_loop.io.faces = Box::new(FrameOnly);

        let report = completed(h.frame_loop.run_cycle());
        assert!(report.enrollment_ran);
        assert!(report.enrolled.is_empty());
        assert!(report.faces[0].result.identity.is_unknown());
        assert!(h.frame_loop.gallery().get("dave").is_none());
        assert!(h.frame_loop.settings.gallery_dir.join("dave.jpg").is_file());
        assert!(!h.frame_loop.obstacle_feedback_paused());
    }

    #[test]
    fn test_object_detector_failure_is_local() {
        let mut h = harness(
            Box::new(frames(2, 300)),
            Vec::new(),
            Box::new(FailingObjects),
            Script::default(),
            Gallery::default(),
        );

        let report = completed(h.frame_loop.run_cycle());
        assert!(report.guidance.is_none());
        assert!(matches!(h.frame_loop.run_cycle(), Cycle::Completed(_)));
        assert!(h.speech.lines().is_empty());
    }

    #[test]
    fn test_capture_failure_stops_loop() {
        let mut h = harness(
            Box::new(BrokenCamera),
            Vec::new(),
            Box::new(SameObjects(Vec::new())),
            Script::default(),
            Gallery::default(),
        );
        assert_eq!(h.frame_loop.run(), (LoopExit::CaptureFailed, 0));
    }

    #[test]
    fn test_display_quit_stops_after_cycle() {
        let mut h = harness(
            Box::new(frames(10, 300)),
            Vec::new(),
            Box::new(SameObjects(vec![object_at("door", 250.0)])),
            Script::default(),
            Gallery::default(),
        );
        h.frame_loop.io.display = Box::new(Screen { quit_after: Some(2), shown: 0 });

        assert_eq!(h.frame_loop.run(), (LoopExit::Quit, 2));
        assert_eq!(h.speech.lines(), vec!["Obstacle on the right: door. Move left."; 2]);
    }

    #[test]
    fn test_annotations_scaled_to_full_frame() {
        struct Capture(Rc<RefCell<Vec<FaceAnnotation>>>);
        impl FrameDisplay for Capture {
            fn present(&mut self, _: &RgbImage, faces: &[FaceAnnotation]) -> Result<DisplayControl, PerceptionError> {
                *self.0.borrow_mut() = faces.to_vec();
                Ok(DisplayControl::Continue)
            }
        }

        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut h = harness(
            Box::new(frames(1, 300)),
            vec![face(vec![0.0, 0.0])],
            Box::new(SameObjects(Vec::new())),
            Script::default(),
            bob_gallery(),
        );
        h.frame_loop.io.display = Box::new(Capture(seen.clone()));

        completed(h.frame_loop.run_cycle());
        let shown = seen.borrow();
        assert_eq!(shown[0].bbox, BoundingBox::new(40.0, 40.0, 80.0, 80.0));
        assert_eq!(shown[0].identity, Identity::Known("bob".into()));
    }
}
