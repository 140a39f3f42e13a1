//! Webcam backend using `nokhwa`.
//!
//! Requires the `camera` feature. The `nokhwa` camera lives on a dedicated
//! device thread and is driven through a command channel, so the handle
//! handed to the session is `Send` regardless of the platform backend.
//!
//! Webcams expose no focus trigger. Every focus request completes
//! successfully at once, so periodic focus acts as a capture clock.

use super::camera::{
    CameraDevice, CameraParameters, DisplaySurface, FocusCallback, FocusMode, FrameCallback,
    HardwareCamera, HardwareError,
};
use super::Frame;
use crate::geometry::Resolution;
use nokhwa::pixel_format::LumaFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use std::sync::mpsc;
use std::thread::JoinHandle;

/// A webcam opened by index.
#[derive(Debug, Clone)]
pub struct NokhwaCamera {
    index: u32,
}

impl NokhwaCamera {
    /// Camera at the given platform index.
    pub fn new(index: u32) -> Self {
        Self { index }
    }
}

enum Command {
    StartPreview(mpsc::Sender<Result<(), HardwareError>>),
    StopPreview,
    Frame(FrameCallback),
    SetResolution(Resolution, mpsc::Sender<Result<Resolution, HardwareError>>),
    Release,
}

impl HardwareCamera for NokhwaCamera {
    fn open(&self) -> Result<Box<dyn CameraDevice>, HardwareError> {
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let index = self.index;

        let thread = std::thread::Builder::new()
            .name(format!("camera-device-{index}"))
            .spawn(move || device_thread(index, command_rx, ready_tx))
            .map_err(|e| HardwareError::Device(e.to_string()))?;

        let resolution = match ready_rx.recv() {
            Ok(result) => result?,
            Err(_) => {
                return Err(HardwareError::Unavailable(
                    "camera thread exited during open".into(),
                ))
            }
        };

        tracing::info!(index, %resolution, "webcam opened");
        Ok(Box::new(WebcamDevice {
            commands: command_tx,
            thread: Some(thread),
            resolution,
        }))
    }
}

fn device_thread(
    index: u32,
    commands: mpsc::Receiver<Command>,
    ready: mpsc::Sender<Result<Resolution, HardwareError>>,
) {
    let requested = RequestedFormat::new::<LumaFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
    let mut camera = match nokhwa::Camera::new(CameraIndex::Index(index), requested) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready.send(Err(HardwareError::Unavailable(e.to_string())));
            return;
        }
    };
    let res = camera.resolution();
    if ready
        .send(Ok(Resolution::new(res.width(), res.height())))
        .is_err()
    {
        return;
    }

    let mut sequence = 0u64;
    let mut pending: Option<FrameCallback> = None;

    let mut capture = |camera: &mut nokhwa::Camera, callback: FrameCallback| {
        let res = camera.resolution();
        let mut data = vec![0u8; (res.width() as usize) * (res.height() as usize)];
        match camera.write_frame_to_buffer::<LumaFormat>(&mut data) {
            Ok(()) => {
                sequence += 1;
                callback(Frame::gray(data, res.width(), res.height(), sequence));
            }
            Err(e) => tracing::warn!(error = %e, "webcam frame capture failed"),
        }
    };

    while let Ok(command) = commands.recv() {
        match command {
            Command::StartPreview(reply) => {
                let result = camera
                    .open_stream()
                    .map_err(|e| HardwareError::Device(e.to_string()));
                let started = result.is_ok();
                let _ = reply.send(result);
                if started {
                    if let Some(callback) = pending.take() {
                        capture(&mut camera, callback);
                    }
                }
            }
            Command::StopPreview => {
                if camera.is_stream_open() {
                    if let Err(e) = camera.stop_stream() {
                        tracing::warn!(error = %e, "failed to stop webcam stream");
                    }
                }
            }
            Command::Frame(callback) => {
                if camera.is_stream_open() {
                    capture(&mut camera, callback);
                } else {
                    pending = Some(callback);
                }
            }
            Command::SetResolution(size, reply) => {
                let result = camera
                    .set_resolution(nokhwa::utils::Resolution::new(size.width, size.height))
                    .map(|()| {
                        let res = camera.resolution();
                        Resolution::new(res.width(), res.height())
                    })
                    .map_err(|e| HardwareError::ParameterRejected(e.to_string()));
                let _ = reply.send(result);
            }
            Command::Release => break,
        }
    }

    if camera.is_stream_open() {
        let _ = camera.stop_stream();
    }
    tracing::info!(index, "webcam closed");
}

struct WebcamDevice {
    commands: mpsc::Sender<Command>,
    thread: Option<JoinHandle<()>>,
    resolution: Resolution,
}

impl WebcamDevice {
    fn send(&self, command: Command) -> Result<(), HardwareError> {
        self.commands
            .send(command)
            .map_err(|_| HardwareError::Device("camera thread is gone".into()))
    }
}

impl CameraDevice for WebcamDevice {
    fn set_display_target(&mut self, surface: &DisplaySurface) -> Result<(), HardwareError> {
        tracing::debug!(surface = surface.id, "webcam preview has no display target");
        Ok(())
    }

    fn set_orientation(&mut self, _degrees: u32) -> Result<(), HardwareError> {
        Ok(())
    }

    fn parameters(&self) -> Result<CameraParameters, HardwareError> {
        Ok(CameraParameters {
            preview_size: self.resolution,
            supported_preview_sizes: vec![self.resolution],
            focus_mode: FocusMode::Auto,
            supported_focus_modes: vec![FocusMode::Auto],
        })
    }

    fn set_parameters(&mut self, params: &CameraParameters) -> Result<(), HardwareError> {
        if params.preview_size == self.resolution {
            return Ok(());
        }
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(Command::SetResolution(params.preview_size, reply_tx))?;
        let actual = reply_rx
            .recv()
            .map_err(|_| HardwareError::Device("camera thread is gone".into()))??;
        self.resolution = actual;
        Ok(())
    }

    fn start_preview(&mut self) -> Result<(), HardwareError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(Command::StartPreview(reply_tx))?;
        reply_rx
            .recv()
            .map_err(|_| HardwareError::Device("camera thread is gone".into()))?
    }

    fn stop_preview(&mut self) {
        let _ = self.send(Command::StopPreview);
    }

    fn request_one_shot_frame(&mut self, callback: FrameCallback) {
        if let Err(e) = self.send(Command::Frame(callback)) {
            tracing::warn!(error = %e, "dropping frame request");
        }
    }

    fn request_auto_focus(&mut self, callback: FocusCallback) {
        callback(true);
    }

    fn focus_mode(&self) -> FocusMode {
        FocusMode::Auto
    }

    fn release(self: Box<Self>) {
        drop(self);
    }
}

impl Drop for WebcamDevice {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
