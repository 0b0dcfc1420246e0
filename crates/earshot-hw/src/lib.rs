//! earshot-hw: webcam acquisition.
//!
//! V4L2 capture via the `v4l` crate, delivering packed RGB8 frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
