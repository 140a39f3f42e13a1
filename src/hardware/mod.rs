//! Camera hardware capability and frame handling.
//!
//! This module defines the device interface the session core consumes and
//! ships two implementations: a scriptable [`MockCamera`] and, with the
//! `camera` feature, a webcam backend built on `nokhwa`.

mod camera;
mod frame;
mod mock;
#[cfg(feature = "camera")]
mod webcam;

pub use camera::{
    CameraDevice, CameraParameters, DisplaySurface, FocusCallback, FocusMode, FrameCallback,
    HardwareCamera, HardwareError,
};
pub use frame::{Frame, PixelFormat};
pub use mock::{MockCamera, MockConfig, MockStats, ParameterRejection};
#[cfg(feature = "camera")]
pub use webcam::NokhwaCamera;
