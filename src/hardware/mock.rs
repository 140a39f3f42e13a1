//! Scriptable mock camera.
//!
//! Generates synthetic (or caller-supplied) frames and records every
//! interaction so lifecycle properties can be asserted: handles opened vs.
//! released, preview starts, focus and frame requests.

use super::camera::{
    CameraDevice, CameraParameters, DisplaySurface, FocusCallback, FocusMode, FrameCallback,
    HardwareCamera, HardwareError,
};
use super::{Frame, PixelFormat};
use crate::geometry::Resolution;
use crate::sync::lock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// How the mock device reacts to `set_parameters`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterRejection {
    /// Accept everything.
    Never,
    /// Reject the first attempt after each open, accept the rest.
    FirstAttempt,
    /// Reject everything.
    Always,
}

/// Behaviour of the mock camera.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Whether `open` succeeds.
    pub available: bool,
    /// Focus mode reported by the device.
    pub focus_mode: FocusMode,
    /// Parameter rejection behaviour.
    pub reject_parameters: ParameterRejection,
    /// Complete focus requests immediately with this result; `None` leaves
    /// them pending until [`MockCamera::complete_focus`].
    pub focus_result: Option<bool>,
    /// Deliver requested frames immediately while previewing; otherwise they
    /// wait for [`MockCamera::deliver_frame`].
    pub auto_deliver_frames: bool,
    /// Default preview size.
    pub preview_size: Resolution,
    /// Advertised preview sizes.
    pub supported_preview_sizes: Vec<Resolution>,
    /// Size the device really uses regardless of what is requested.
    pub forced_preview_size: Option<Resolution>,
    /// Make `start_preview` fail after the device was opened.
    pub fail_start_preview: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            available: true,
            focus_mode: FocusMode::Auto,
            reject_parameters: ParameterRejection::Never,
            focus_result: Some(true),
            auto_deliver_frames: true,
            preview_size: Resolution::new(640, 480),
            supported_preview_sizes: vec![Resolution::new(640, 480), Resolution::new(1280, 720)],
            forced_preview_size: None,
            fail_start_preview: false,
        }
    }
}

/// Counters describing everything the mock has been asked to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockStats {
    /// Successful `open` calls.
    pub opens: u64,
    /// Devices released.
    pub releases: u64,
    /// Preview starts.
    pub preview_starts: u64,
    /// Preview stops of a streaming device.
    pub preview_stops: u64,
    /// Auto-focus requests.
    pub focus_requests: u64,
    /// One-shot frame registrations.
    pub frame_requests: u64,
    /// Frames handed to a registration.
    pub frames_delivered: u64,
    /// Parameter sets accepted.
    pub parameter_sets: u64,
    /// Parameter sets rejected.
    pub parameter_rejections: u64,
}

impl MockStats {
    /// Handles opened and not yet released.
    pub fn open_handles(&self) -> u64 {
        self.opens.saturating_sub(self.releases)
    }
}

#[derive(Default)]
struct Counters {
    opens: AtomicU64,
    releases: AtomicU64,
    preview_starts: AtomicU64,
    preview_stops: AtomicU64,
    focus_requests: AtomicU64,
    frame_requests: AtomicU64,
    frames_delivered: AtomicU64,
    parameter_sets: AtomicU64,
    parameter_rejections: AtomicU64,
}

struct Shared {
    config: Mutex<MockConfig>,
    counters: Counters,
    previewing: AtomicBool,
    sequence: AtomicU64,
    image: Mutex<Option<(Vec<u8>, Resolution)>>,
    pending_frame: Mutex<Option<FrameCallback>>,
    pending_focus: Mutex<Vec<FocusCallback>>,
    current_preview_size: Mutex<Resolution>,
}

impl Shared {
    fn next_frame(&self) -> Frame {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some((pixels, size)) = lock(&self.image).as_ref() {
            return Frame::gray(pixels.clone(), size.width, size.height, sequence);
        }

        let size = *lock(&self.current_preview_size);
        let len = PixelFormat::Nv21.buffer_len(size.width, size.height);
        // Deterministic pattern, not a decodable code.
        let pixels: Vec<u8> = (0..len)
            .map(|i| ((i as u64 ^ sequence) % 256) as u8)
            .collect();
        Frame::new(pixels, size.width, size.height, PixelFormat::Nv21, sequence)
    }
}

/// Mock camera for tests and the demo binary.
///
/// Cloning yields another handle to the same simulated device.
#[derive(Clone)]
pub struct MockCamera {
    shared: Arc<Shared>,
}

impl MockCamera {
    /// Mock camera with the default behaviour.
    pub fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    /// Mock camera behaving as `config` describes.
    pub fn with_config(config: MockConfig) -> Self {
        let preview_size = config.preview_size;
        Self {
            shared: Arc::new(Shared {
                config: Mutex::new(config),
                counters: Counters::default(),
                previewing: AtomicBool::new(false),
                sequence: AtomicU64::new(0),
                image: Mutex::new(None),
                pending_frame: Mutex::new(None),
                pending_focus: Mutex::new(Vec::new()),
                current_preview_size: Mutex::new(preview_size),
            }),
        }
    }

    /// Serves the given greyscale image as every subsequent frame.
    pub fn set_image(&self, pixels: Vec<u8>, size: Resolution) {
        *lock(&self.shared.image) = Some((pixels, size));
    }

    /// Reverts to synthetic frames.
    pub fn clear_image(&self) {
        *lock(&self.shared.image) = None;
    }

    /// Changes whether `open` succeeds.
    pub fn set_available(&self, available: bool) {
        lock(&self.shared.config).available = available;
    }

    /// Changes how focus requests complete.
    pub fn set_focus_result(&self, result: Option<bool>) {
        lock(&self.shared.config).focus_result = result;
    }

    /// Changes whether `start_preview` fails.
    pub fn set_fail_start_preview(&self, fail: bool) {
        lock(&self.shared.config).fail_start_preview = fail;
    }

    /// Snapshot of the interaction counters.
    pub fn stats(&self) -> MockStats {
        let c = &self.shared.counters;
        MockStats {
            opens: c.opens.load(Ordering::SeqCst),
            releases: c.releases.load(Ordering::SeqCst),
            preview_starts: c.preview_starts.load(Ordering::SeqCst),
            preview_stops: c.preview_stops.load(Ordering::SeqCst),
            focus_requests: c.focus_requests.load(Ordering::SeqCst),
            frame_requests: c.frame_requests.load(Ordering::SeqCst),
            frames_delivered: c.frames_delivered.load(Ordering::SeqCst),
            parameter_sets: c.parameter_sets.load(Ordering::SeqCst),
            parameter_rejections: c.parameter_rejections.load(Ordering::SeqCst),
        }
    }

    /// Returns true while the simulated device streams preview.
    pub fn is_previewing(&self) -> bool {
        self.shared.previewing.load(Ordering::SeqCst)
    }

    /// Fires the pending one-shot frame registration with a generated frame.
    ///
    /// Like real drivers, a registration made before `stop_preview` can
    /// still fire afterwards. Returns false if nothing was registered.
    pub fn deliver_frame(&self) -> bool {
        let frame = self.shared.next_frame();
        self.deliver(frame)
    }

    /// Fires the pending one-shot frame registration with `frame`.
    pub fn deliver(&self, frame: Frame) -> bool {
        let callback = lock(&self.shared.pending_frame).take();
        match callback {
            Some(callback) => {
                self.shared
                    .counters
                    .frames_delivered
                    .fetch_add(1, Ordering::SeqCst);
                callback(frame);
                true
            }
            None => false,
        }
    }

    /// Completes every pending focus request. Returns how many completed.
    pub fn complete_focus(&self, success: bool) -> usize {
        let pending = std::mem::take(&mut *lock(&self.shared.pending_focus));
        let count = pending.len();
        for callback in pending {
            callback(success);
        }
        count
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCamera")
            .field("stats", &self.stats())
            .finish()
    }
}

impl HardwareCamera for MockCamera {
    fn open(&self) -> Result<Box<dyn CameraDevice>, HardwareError> {
        let config = lock(&self.shared.config).clone();
        if !config.available {
            return Err(HardwareError::Unavailable("mock camera disabled".into()));
        }

        self.shared.counters.opens.fetch_add(1, Ordering::SeqCst);
        *lock(&self.shared.current_preview_size) = config.preview_size;
        tracing::info!(preview = %config.preview_size, "MockCamera opened");

        Ok(Box::new(MockDevice {
            shared: Arc::clone(&self.shared),
            params: CameraParameters {
                preview_size: config.preview_size,
                supported_preview_sizes: config.supported_preview_sizes.clone(),
                focus_mode: config.focus_mode,
                supported_focus_modes: vec![config.focus_mode],
            },
            rejection: config.reject_parameters,
            forced_preview_size: config.forced_preview_size,
            attempts: 0,
            previewing: false,
        }))
    }
}

struct MockDevice {
    shared: Arc<Shared>,
    params: CameraParameters,
    rejection: ParameterRejection,
    forced_preview_size: Option<Resolution>,
    attempts: u32,
    previewing: bool,
}

impl CameraDevice for MockDevice {
    fn set_display_target(&mut self, surface: &DisplaySurface) -> Result<(), HardwareError> {
        tracing::debug!(surface = surface.id, "MockCamera display attached");
        Ok(())
    }

    fn set_orientation(&mut self, degrees: u32) -> Result<(), HardwareError> {
        tracing::debug!(degrees, "MockCamera orientation set");
        Ok(())
    }

    fn parameters(&self) -> Result<CameraParameters, HardwareError> {
        Ok(self.params.clone())
    }

    fn set_parameters(&mut self, params: &CameraParameters) -> Result<(), HardwareError> {
        self.attempts += 1;
        let counters = &self.shared.counters;
        let reject = match self.rejection {
            ParameterRejection::Never => false,
            ParameterRejection::FirstAttempt => self.attempts == 1,
            ParameterRejection::Always => true,
        };
        if reject {
            counters.parameter_rejections.fetch_add(1, Ordering::SeqCst);
            return Err(HardwareError::ParameterRejected(format!(
                "mock rejected attempt {}",
                self.attempts
            )));
        }

        counters.parameter_sets.fetch_add(1, Ordering::SeqCst);
        self.params = params.clone();
        if let Some(forced) = self.forced_preview_size {
            self.params.preview_size = forced;
        }
        *lock(&self.shared.current_preview_size) = self.params.preview_size;
        Ok(())
    }

    fn start_preview(&mut self) -> Result<(), HardwareError> {
        if lock(&self.shared.config).fail_start_preview {
            return Err(HardwareError::Device("mock preview failed to start".into()));
        }
        self.previewing = true;
        self.shared.previewing.store(true, Ordering::SeqCst);
        self.shared
            .counters
            .preview_starts
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop_preview(&mut self) {
        if self.previewing {
            self.previewing = false;
            self.shared.previewing.store(false, Ordering::SeqCst);
            self.shared
                .counters
                .preview_stops
                .fetch_add(1, Ordering::SeqCst);
        }
    }

    fn request_one_shot_frame(&mut self, callback: FrameCallback) {
        self.shared
            .counters
            .frame_requests
            .fetch_add(1, Ordering::SeqCst);
        let auto = lock(&self.shared.config).auto_deliver_frames;
        if auto && self.previewing {
            let frame = self.shared.next_frame();
            self.shared
                .counters
                .frames_delivered
                .fetch_add(1, Ordering::SeqCst);
            callback(frame);
        } else {
            *lock(&self.shared.pending_frame) = Some(callback);
        }
    }

    fn request_auto_focus(&mut self, callback: FocusCallback) {
        self.shared
            .counters
            .focus_requests
            .fetch_add(1, Ordering::SeqCst);
        let result = lock(&self.shared.config).focus_result;
        match result {
            Some(success) => callback(success),
            None => lock(&self.shared.pending_focus).push(callback),
        }
    }

    fn focus_mode(&self) -> FocusMode {
        self.params.focus_mode
    }

    fn release(self: Box<Self>) {
        if self.previewing {
            self.shared.previewing.store(false, Ordering::SeqCst);
        }
        self.shared.counters.releases.fetch_add(1, Ordering::SeqCst);
        tracing::info!("MockCamera closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_camera_lifecycle() {
        let camera = MockCamera::new();
        let mut device = camera.open().unwrap();
        assert_eq!(camera.stats().open_handles(), 1);

        device.start_preview().unwrap();
        assert!(camera.is_previewing());

        device.stop_preview();
        device.release();

        let stats = camera.stats();
        assert_eq!(stats.open_handles(), 0);
        assert_eq!(stats.preview_starts, 1);
        assert_eq!(stats.preview_stops, 1);
    }

    #[test]
    fn test_open_unavailable() {
        let camera = MockCamera::new();
        camera.set_available(false);
        assert!(matches!(camera.open(), Err(HardwareError::Unavailable(_))));
        assert_eq!(camera.stats().opens, 0);
    }

    #[test]
    fn test_manual_frame_delivery_fires_once() {
        let camera = MockCamera::with_config(MockConfig {
            auto_deliver_frames: false,
            ..Default::default()
        });
        let mut device = camera.open().unwrap();
        device.start_preview().unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        device.request_one_shot_frame(Box::new(move |frame| {
            tx.send(frame.sequence()).unwrap();
        }));

        assert!(camera.deliver_frame());
        assert!(!camera.deliver_frame());
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_start_preview_failure_keeps_device_idle() {
        let camera = MockCamera::with_config(MockConfig {
            fail_start_preview: true,
            ..Default::default()
        });
        let mut device = camera.open().unwrap();
        assert!(matches!(device.start_preview(), Err(HardwareError::Device(_))));
        assert!(!camera.is_previewing());
        assert_eq!(camera.stats().preview_starts, 0);

        camera.set_fail_start_preview(false);
        device.start_preview().unwrap();
        assert!(camera.is_previewing());
    }

    #[test]
    fn test_first_attempt_rejection() {
        let camera = MockCamera::with_config(MockConfig {
            reject_parameters: ParameterRejection::FirstAttempt,
            ..Default::default()
        });
        let mut device = camera.open().unwrap();
        let params = device.parameters().unwrap();

        assert!(device.set_parameters(&params).is_err());
        assert!(device.set_parameters(&params).is_ok());
    }
}
