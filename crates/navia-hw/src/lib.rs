//! navia-hw — Hardware abstraction for camera capture and speech output.
//!
//! Provides V4L2-based color camera access and a blocking text-to-speech
//! voice backed by an external synthesizer.

pub mod camera;
pub mod frame;
pub mod speech;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::Frame;
pub use speech::{SpeechError, Voice};
