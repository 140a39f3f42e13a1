//! Camera device capability.
//!
//! The session core never talks to a driver directly. It consumes a
//! [`HardwareCamera`] that hands out an exclusive [`CameraDevice`] handle,
//! which lets tests and the demo binary swap in [`MockCamera`](super::MockCamera).

use super::Frame;
use crate::geometry::Resolution;
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Clone, Error)]
pub enum HardwareError {
    /// No device could be claimed.
    #[error("no camera device could be claimed: {0}")]
    Unavailable(String),
    /// The device refused a parameter set.
    #[error("camera rejected parameters: {0}")]
    ParameterRejected(String),
    /// Any other device failure.
    #[error("camera device error: {0}")]
    Device(String),
    /// The operation needs an open device.
    #[error("camera not open")]
    NotOpen,
}

/// Focus modes a device may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusMode {
    /// Single auto-focus pass on request.
    Auto,
    /// Auto-focus tuned for close range.
    Macro,
    /// Device focuses on its own.
    Continuous,
    /// Lens cannot focus.
    Fixed,
    /// Locked at infinity.
    Infinity,
}

impl FocusMode {
    /// Modes that accept explicit auto-focus requests.
    pub fn supports_auto_focus(&self) -> bool {
        matches!(self, FocusMode::Auto | FocusMode::Macro)
    }
}

/// Device parameter set, read and written as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraParameters {
    /// Current preview stream size.
    pub preview_size: Resolution,
    /// Preview sizes the device advertises.
    pub supported_preview_sizes: Vec<Resolution>,
    /// Current focus mode.
    pub focus_mode: FocusMode,
    /// Focus modes the device advertises.
    pub supported_focus_modes: Vec<FocusMode>,
}

/// The display target a preview is drawn into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySurface {
    /// Opaque surface identifier understood by the device backend.
    pub id: u64,
    /// Surface size in screen pixels.
    pub resolution: Resolution,
}

impl DisplaySurface {
    /// Surface `id` of the given size.
    pub fn new(id: u64, resolution: Resolution) -> Self {
        Self { id, resolution }
    }
}

/// Invoked once with the next preview frame.
pub type FrameCallback = Box<dyn FnOnce(Frame) + Send>;

/// Invoked once when an auto-focus pass finishes, with its success flag.
pub type FocusCallback = Box<dyn FnOnce(bool) + Send>;

/// Factory for exclusive device handles.
pub trait HardwareCamera: Send + Sync {
    /// Claims the device.
    fn open(&self) -> Result<Box<dyn CameraDevice>, HardwareError>;
}

/// An open, exclusively owned camera device.
///
/// Callbacks may be invoked from any thread, including synchronously from
/// within the registering call.
pub trait CameraDevice: Send {
    /// Binds the preview to a display target.
    fn set_display_target(&mut self, surface: &DisplaySurface) -> Result<(), HardwareError>;

    /// Sets the display orientation in degrees.
    fn set_orientation(&mut self, degrees: u32) -> Result<(), HardwareError>;

    /// Reads the current parameter set.
    fn parameters(&self) -> Result<CameraParameters, HardwareError>;

    /// Applies a parameter set.
    fn set_parameters(&mut self, params: &CameraParameters) -> Result<(), HardwareError>;

    /// Starts streaming preview frames.
    fn start_preview(&mut self) -> Result<(), HardwareError>;

    /// Stops streaming preview frames.
    fn stop_preview(&mut self);

    /// Registers a callback for the next frame only, replacing any previous
    /// registration.
    fn request_one_shot_frame(&mut self, callback: FrameCallback);

    /// Starts an auto-focus pass.
    fn request_auto_focus(&mut self, callback: FocusCallback);

    /// Current focus mode.
    fn focus_mode(&self) -> FocusMode;

    /// Releases the device.
    fn release(self: Box<Self>);
}
