//! Exclusive device ownership, preview lifecycle and frame routing.

use super::arming::{ArmPhase, FrameArm};
use super::params::{self, Configuration};
use crate::config::FramingConfig;
use crate::focus::{FocusControl, FocusError, FocusListener, FocusScheduler, FocusState};
use crate::geometry::{self, Rect, Resolution};
use crate::hardware::{
    CameraDevice, DisplaySurface, FocusCallback, FocusMode, Frame, HardwareCamera, HardwareError,
};
use crate::sync::lock;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;

type DeviceSlot = Arc<Mutex<Option<Box<dyn CameraDevice>>>>;

/// Focus access to whatever device currently occupies the slot.
struct DevicePort {
    device: DeviceSlot,
}

impl FocusControl for DevicePort {
    fn focus_mode(&self) -> Option<FocusMode> {
        lock(&self.device).as_ref().map(|d| d.focus_mode())
    }

    fn request_auto_focus(&self, callback: FocusCallback) -> bool {
        match lock(&self.device).as_mut() {
            Some(device) => {
                device.request_auto_focus(callback);
                true
            }
            None => false,
        }
    }
}

struct SourceState {
    screen: Resolution,
    camera_resolution: Option<Resolution>,
    initialized: bool,
    previewing: bool,
    configuration: Option<Configuration>,
    framing_rect: Option<Rect>,
    framing_rect_in_preview: Option<Rect>,
    requested_manual: Option<Resolution>,
    focus: Option<FocusScheduler>,
}

impl SourceState {
    fn invalidate_rects(&mut self) {
        self.framing_rect = None;
        self.framing_rect_in_preview = None;
    }

    fn apply_manual(&mut self, size: Resolution) -> Rect {
        let rect = geometry::manual_framing_rect(self.screen, size.width, size.height);
        tracing::debug!(%rect, "manual framing rect");
        self.framing_rect = Some(rect);
        self.framing_rect_in_preview = None;
        rect
    }
}

/// Owns the camera device and everything that must follow its lifecycle.
///
/// Every method takes `&self`; the source is meant to be shared behind an
/// `Arc` between the session loop and blocking bring-up tasks. Frame and
/// focus callbacks must not call back into the source synchronously.
pub struct FrameSource {
    hardware: Arc<dyn HardwareCamera>,
    device: DeviceSlot,
    arm: Arc<Mutex<FrameArm>>,
    state: Mutex<SourceState>,
    config: FramingConfig,
    min_focus_period: Duration,
    runtime: Handle,
}

impl FrameSource {
    /// Creates a closed source for a screen of the given size.
    pub fn new(
        hardware: Arc<dyn HardwareCamera>,
        screen: Resolution,
        config: FramingConfig,
        min_focus_period: Duration,
        runtime: Handle,
    ) -> Self {
        Self {
            hardware,
            device: Arc::new(Mutex::new(None)),
            arm: Arc::new(Mutex::new(FrameArm::new())),
            state: Mutex::new(SourceState {
                screen,
                camera_resolution: None,
                initialized: false,
                previewing: false,
                configuration: None,
                framing_rect: None,
                framing_rect_in_preview: None,
                requested_manual: None,
                focus: None,
            }),
            config,
            min_focus_period,
            runtime,
        }
    }

    /// Claims the device and negotiates its parameters. No-op if already
    /// open.
    pub fn open(&self) -> Result<(), HardwareError> {
        let mut state = lock(&self.state);
        let mut slot = lock(&self.device);
        if slot.is_some() {
            return Ok(());
        }

        let mut device = self.hardware.open()?;

        if !state.initialized {
            let params = match device.parameters() {
                Ok(params) => params,
                Err(e) => {
                    device.release();
                    return Err(e);
                }
            };
            let preview = params::choose_preview_size(&params, state.screen);
            tracing::info!(screen = %state.screen, %preview, "camera resolution chosen");
            state.camera_resolution = Some(preview);
            state.initialized = true;
        }

        let mut preview = state.camera_resolution.unwrap_or(state.screen);
        let configuration = params::configure(device.as_mut(), &mut preview);
        state.camera_resolution = Some(preview);
        state.configuration = Some(configuration);
        state.invalidate_rects();
        *slot = Some(device);
        drop(slot);

        if let Some(size) = state.requested_manual.take() {
            state.apply_manual(size);
        }

        tracing::info!(?configuration, %preview, "camera opened");
        Ok(())
    }

    /// Binds the preview to a display target and applies orientation.
    ///
    /// A surface with a different size than the known screen replaces the
    /// screen resolution.
    pub fn attach_display(&self, surface: &DisplaySurface) -> Result<(), HardwareError> {
        let mut state = lock(&self.state);
        let mut slot = lock(&self.device);
        let device = slot.as_mut().ok_or(HardwareError::NotOpen)?;

        device.set_display_target(surface)?;
        if let Err(e) = device.set_orientation(self.config.orientation_degrees) {
            tracing::warn!(error = %e, "camera rejected display orientation");
        }
        drop(slot);

        if !surface.resolution.is_empty() && surface.resolution != state.screen {
            tracing::info!(
                old = %state.screen,
                new = %surface.resolution,
                "screen resolution changed"
            );
            state.screen = surface.resolution;
            state.invalidate_rects();
        }
        Ok(())
    }

    /// Starts streaming and creates the focus scheduler. No-op if already
    /// previewing.
    pub fn start_preview(&self, on_focus: FocusListener) -> Result<(), HardwareError> {
        let mut state = lock(&self.state);
        if state.previewing {
            return Ok(());
        }

        let mut slot = lock(&self.device);
        let device = slot.as_mut().ok_or(HardwareError::NotOpen)?;
        device.start_preview()?;
        drop(slot);

        state.previewing = true;
        let port = Arc::new(DevicePort {
            device: Arc::clone(&self.device),
        });
        state.focus = Some(FocusScheduler::new(
            port,
            on_focus,
            self.min_focus_period,
            self.runtime.clone(),
        ));
        tracing::info!("preview started");
        Ok(())
    }

    /// Registers `on_frame` for exactly the next preview frame.
    ///
    /// Replaces any earlier registration. Returns false if not previewing.
    pub fn request_next_frame<F>(&self, on_frame: F) -> bool
    where
        F: FnOnce(Frame) + Send + 'static,
    {
        let state = lock(&self.state);
        if !state.previewing {
            tracing::debug!("frame requested while not previewing");
            return false;
        }

        let generation = lock(&self.arm).arm(Box::new(on_frame));
        let arm = Arc::clone(&self.arm);
        let mut slot = lock(&self.device);
        match slot.as_mut() {
            Some(device) => {
                device.request_one_shot_frame(Box::new(move |frame| {
                    let on_frame = lock(&arm).fire(generation);
                    match on_frame {
                        Some(on_frame) => on_frame(frame),
                        None => tracing::trace!(sequence = frame.sequence(), "stale frame dropped"),
                    }
                }));
                true
            }
            None => {
                lock(&self.arm).disarm();
                false
            }
        }
    }

    /// Stops focus and streaming and discards any frame registration. Keeps
    /// the device claimed. Idempotent.
    pub fn stop_preview(&self) {
        let mut state = lock(&self.state);
        self.stop_locked(&mut state);
    }

    fn stop_locked(&self, state: &mut SourceState) {
        if let Some(mut focus) = state.focus.take() {
            focus.stop();
        }
        lock(&self.arm).disarm();
        if state.previewing {
            if let Some(device) = lock(&self.device).as_mut() {
                device.stop_preview();
            }
            state.previewing = false;
            tracing::info!("preview stopped");
        }
    }

    /// Releases the device. Stops preview first if needed. Idempotent.
    pub fn close(&self) {
        let mut state = lock(&self.state);
        self.stop_locked(&mut state);
        state.invalidate_rects();

        let device = lock(&self.device).take();
        if let Some(device) = device {
            device.release();
            tracing::info!("camera closed");
        }
    }

    /// Whether the device is currently claimed.
    pub fn is_open(&self) -> bool {
        lock(&self.device).is_some()
    }

    /// Whether preview is streaming.
    pub fn is_previewing(&self) -> bool {
        lock(&self.state).previewing
    }

    /// Outcome of parameter negotiation on the last open.
    pub fn configuration(&self) -> Option<Configuration> {
        lock(&self.state).configuration
    }

    /// Known screen resolution.
    pub fn screen_resolution(&self) -> Resolution {
        lock(&self.state).screen
    }

    /// Preview stream resolution, once the device has been opened.
    pub fn camera_resolution(&self) -> Option<Resolution> {
        lock(&self.state).camera_resolution
    }

    /// Framing rectangle in screen coordinates.
    ///
    /// `None` while closed or before both resolutions are known.
    pub fn framing_rect(&self) -> Option<Rect> {
        let mut state = lock(&self.state);
        if !self.is_open() {
            return None;
        }
        self.framing_rect_locked(&mut state)
    }

    fn framing_rect_locked(&self, state: &mut SourceState) -> Option<Rect> {
        if let Some(rect) = state.framing_rect {
            return Some(rect);
        }
        state.camera_resolution?;
        let rect = geometry::framing_rect(state.screen, &self.config.bounds);
        tracing::debug!(%rect, "calculated framing rect");
        state.framing_rect = Some(rect);
        Some(rect)
    }

    /// Framing rectangle projected into preview-frame coordinates.
    pub fn framing_rect_in_preview(&self) -> Option<Rect> {
        let mut state = lock(&self.state);
        if !self.is_open() {
            return None;
        }
        if let Some(rect) = state.framing_rect_in_preview {
            return Some(rect);
        }
        let rect = self.framing_rect_locked(&mut state)?;
        let camera = state.camera_resolution?;
        let projected = rect.project(state.screen, camera).clamp_to(camera);
        state.framing_rect_in_preview = Some(projected);
        Some(projected)
    }

    /// Sets an explicit framing size, centered and clamped to the screen.
    ///
    /// Applied immediately once the device has been opened; otherwise kept
    /// and applied on the next open. Returns the rectangle if applied now.
    pub fn set_manual_framing_rect(&self, width: u32, height: u32) -> Option<Rect> {
        let mut state = lock(&self.state);
        let size = Resolution::new(width, height);
        if state.initialized && self.is_open() {
            Some(state.apply_manual(size))
        } else {
            tracing::debug!(%size, "manual framing rect deferred until open");
            state.requested_manual = Some(size);
            None
        }
    }

    /// Issues a single focus request. Returns false if not previewing.
    pub fn request_focus(&self) -> bool {
        let state = lock(&self.state);
        match state.focus.as_ref() {
            Some(focus) => {
                focus.request_once();
                true
            }
            None => false,
        }
    }

    /// Starts periodic focus on the running preview.
    ///
    /// Returns `Ok(false)` if not previewing or the device cannot
    /// auto-focus.
    pub fn start_periodic_focus(&self, period: Duration) -> Result<bool, FocusError> {
        let mut state = lock(&self.state);
        match state.focus.as_mut() {
            Some(focus) => focus.start_periodic(period),
            None if period < self.min_focus_period => Err(FocusError::InvalidPeriod {
                requested_ms: period.as_millis() as u64,
                minimum_ms: self.min_focus_period.as_millis() as u64,
            }),
            None => Ok(false),
        }
    }

    /// Stops periodic focus. Idempotent.
    pub fn stop_periodic_focus(&self) {
        if let Some(focus) = lock(&self.state).focus.as_mut() {
            focus.stop();
        }
    }

    /// Focus scheduler state, if previewing.
    pub fn focus_state(&self) -> Option<FocusState> {
        lock(&self.state).focus.as_ref().map(|f| f.state())
    }

    /// Phase of the one-shot frame registration.
    pub fn frame_phase(&self) -> ArmPhase {
        lock(&self.arm).phase()
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("FrameSource")
            .field("screen", &state.screen)
            .field("camera_resolution", &state.camera_resolution)
            .field("previewing", &state.previewing)
            .field("configuration", &state.configuration)
            .finish()
    }
}
