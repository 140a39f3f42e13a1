//! The session event loop.
//!
//! Commands from the [`CameraSession`](super::CameraSession) handle and
//! events from hardware callbacks and the decode pipeline are handled here,
//! one at a time. Events carry the preview epoch they were produced in, so
//! anything left over from a torn-down preview is ignored.

use super::render::Renderer;
use super::stats::SessionCounters;
use super::{SessionError, SessionState};
use crate::config::{MissPolicy, SessionConfig};
use crate::decode::{DecodePipeline, DecodeRequest, DecodeSink, ResultPoint, TaskId, TaskStatus};
use crate::focus::FocusListener;
use crate::geometry::Rect;
use crate::hardware::{DisplaySurface, Frame, HardwareError};
use crate::source::FrameSource;
use image::GrayImage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

type Reply<T> = oneshot::Sender<T>;

pub(crate) enum Command {
    Resume(Reply<Result<(), SessionError>>),
    Pause(Reply<()>),
    SurfaceReady(DisplaySurface, Reply<Result<(), SessionError>>),
    SurfaceDestroyed(Reply<()>),
    RequestDecode(Reply<Result<(), SessionError>>),
    StartPeriodicFocus(Duration, Reply<Result<bool, SessionError>>),
    StopPeriodicFocus(Reply<()>),
    SetManualFramingRect(u32, u32, Reply<Option<Rect>>),
}

pub(crate) enum Event {
    Focus { epoch: u64, success: bool },
    Frame { epoch: u64, frame: Frame },
    Miss(TaskId),
}

/// Forwards pipeline output to the renderer and misses back to the loop.
pub(crate) struct SessionSink {
    pub(crate) renderer: Arc<dyn Renderer>,
    pub(crate) events: mpsc::UnboundedSender<Event>,
    pub(crate) counters: Arc<SessionCounters>,
}

impl DecodeSink for SessionSink {
    fn on_progress(&self, snapshot: &GrayImage) {
        self.renderer.on_capture_preview(snapshot);
    }

    fn on_result(&self, text: &str) {
        self.counters.result();
        self.renderer.on_decode_result(text);
    }

    fn on_result_point(&self, point: ResultPoint) {
        self.renderer.on_possible_result_point(point);
    }

    fn on_miss(&self, task: TaskId) {
        self.counters.miss();
        let _ = self.events.send(Event::Miss(task));
    }

    fn on_finished(&self, _task: TaskId, status: TaskStatus) {
        self.counters.decode_finished(status);
    }
}

pub(crate) struct SessionLoop {
    pub(crate) source: Arc<FrameSource>,
    pub(crate) pipeline: DecodePipeline,
    pub(crate) renderer: Arc<dyn Renderer>,
    pub(crate) config: SessionConfig,
    pub(crate) state: watch::Sender<SessionState>,
    pub(crate) events_tx: mpsc::UnboundedSender<Event>,
    pub(crate) counters: Arc<SessionCounters>,
    pub(crate) surface: Option<DisplaySurface>,
    pub(crate) focus_period: Option<Duration>,
    pub(crate) epoch: u64,
    /// Last submitted task and the epoch its frame was captured in.
    pub(crate) decoding: Option<(TaskId, u64)>,
}

impl SessionLoop {
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("session loop cancelled");
                    break;
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
        }

        self.teardown().await;
        self.pipeline.shutdown();
        self.set_state(SessionState::Closed);
        tracing::debug!("session loop stopped");
    }

    fn current(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::info!(from = %previous, to = %next, "session state changed");
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Resume(reply) => {
                let _ = reply.send(self.resume().await);
            }
            Command::Pause(reply) => {
                self.teardown().await;
                self.set_state(SessionState::Paused);
                let _ = reply.send(());
            }
            Command::SurfaceReady(surface, reply) => {
                let _ = reply.send(self.surface_ready(surface).await);
            }
            Command::SurfaceDestroyed(reply) => {
                self.surface = None;
                if self.current() == SessionState::Previewing {
                    self.teardown().await;
                    self.set_state(SessionState::Opening);
                }
                let _ = reply.send(());
            }
            Command::RequestDecode(reply) => {
                let result = if self.current() == SessionState::Previewing && self.source.request_focus() {
                    Ok(())
                } else {
                    Err(SessionError::NotPreviewing)
                };
                let _ = reply.send(result);
            }
            Command::StartPeriodicFocus(period, reply) => {
                self.focus_period = Some(period);
                let result = if self.current() == SessionState::Previewing {
                    self.source.start_periodic_focus(period).map_err(SessionError::from)
                } else {
                    Ok(false)
                };
                let _ = reply.send(result);
            }
            Command::StopPeriodicFocus(reply) => {
                self.focus_period = None;
                self.source.stop_periodic_focus();
                let _ = reply.send(());
            }
            Command::SetManualFramingRect(width, height, reply) => {
                let rect = self.source.set_manual_framing_rect(width, height);
                if let Some(rect) = rect {
                    self.renderer.on_framing_rect_ready(rect);
                }
                let _ = reply.send(rect);
            }
        }
    }

    async fn resume(&mut self) -> Result<(), SessionError> {
        match self.current() {
            SessionState::Opening | SessionState::Previewing => Ok(()),
            SessionState::Closed | SessionState::Paused => {
                self.set_state(SessionState::Opening);
                match self.surface.clone() {
                    Some(surface) => self.bring_up(surface).await,
                    None => {
                        tracing::debug!("waiting for display surface");
                        Ok(())
                    }
                }
            }
        }
    }

    async fn surface_ready(&mut self, surface: DisplaySurface) -> Result<(), SessionError> {
        self.surface = Some(surface.clone());
        match self.current() {
            SessionState::Opening => self.bring_up(surface).await,
            SessionState::Previewing => {
                let source = Arc::clone(&self.source);
                let attached =
                    tokio::task::spawn_blocking(move || source.attach_display(&surface)).await;
                match attached {
                    Ok(result) => result.map_err(SessionError::from),
                    Err(e) => Err(HardwareError::Device(format!("display attach panicked: {e}")).into()),
                }
            }
            SessionState::Closed | SessionState::Paused => Ok(()),
        }
    }

    /// Opens the device and starts preview on the blocking pool.
    async fn bring_up(&mut self, surface: DisplaySurface) -> Result<(), SessionError> {
        self.epoch += 1;
        let epoch = self.epoch;
        let events = self.events_tx.clone();
        let on_focus: FocusListener = Arc::new(move |success| {
            let _ = events.send(Event::Focus { epoch, success });
        });

        let source = Arc::clone(&self.source);
        let opened = tokio::task::spawn_blocking(move || {
            source.open()?;
            let started = source
                .attach_display(&surface)
                .and_then(|()| source.start_preview(on_focus));
            if started.is_err() {
                source.close();
            }
            started
        })
        .await
        .unwrap_or_else(|e| Err(HardwareError::Device(format!("camera bring-up panicked: {e}"))));

        if let Err(e) = opened {
            tracing::warn!(error = %e, "camera bring-up failed");
            self.set_state(SessionState::Closed);
            return Err(e.into());
        }

        self.set_state(SessionState::Previewing);
        self.on_preview_started();
        Ok(())
    }

    fn on_preview_started(&mut self) {
        match self.focus_period {
            Some(period) => match self.source.start_periodic_focus(period) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!("device cannot auto-focus periodically, requesting once");
                    self.source.request_focus();
                }
                Err(e) => tracing::warn!(error = %e, "periodic focus not started"),
            },
            None if self.config.focus.focus_on_start => {
                self.source.request_focus();
            }
            None => {}
        }

        if let Some(rect) = self.source.framing_rect() {
            self.renderer.on_framing_rect_ready(rect);
        }
    }

    /// Cancels decoding and releases the device. Safe in any state.
    async fn teardown(&mut self) {
        self.epoch += 1;
        self.pipeline.cancel();
        let source = Arc::clone(&self.source);
        if let Err(e) = tokio::task::spawn_blocking(move || source.close()).await {
            tracing::warn!(error = %e, "camera close panicked");
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Focus { epoch, success } => {
                self.counters.focus(success);
                if !self.is_live(epoch) {
                    return;
                }
                if success {
                    self.capture_next_frame();
                } else {
                    tracing::debug!("focus pass failed");
                }
            }
            Event::Frame { epoch, frame } => {
                self.counters.frame_captured();
                if !self.is_live(epoch) {
                    tracing::trace!(sequence = frame.sequence(), "frame from stale preview dropped");
                    return;
                }
                self.submit(frame, epoch);
            }
            Event::Miss(task) => {
                let live = matches!(
                    self.decoding,
                    Some((id, epoch)) if id == task && self.is_live(epoch)
                );
                if !live {
                    tracing::trace!(%task, "miss from stale preview dropped");
                    return;
                }
                tracing::trace!(%task, policy = ?self.config.scan.on_miss, "handling miss");
                match self.config.scan.on_miss {
                    MissPolicy::Wait => {}
                    MissPolicy::Refocus => {
                        self.source.request_focus();
                    }
                    MissPolicy::Recapture => self.capture_next_frame(),
                }
            }
        }
    }

    fn is_live(&self, epoch: u64) -> bool {
        epoch == self.epoch && self.current() == SessionState::Previewing
    }

    fn capture_next_frame(&self) {
        let events = self.events_tx.clone();
        let epoch = self.epoch;
        let armed = self.source.request_next_frame(move |frame| {
            let _ = events.send(Event::Frame { epoch, frame });
        });
        if !armed {
            tracing::debug!("frame not requested, preview stopped");
        }
    }

    fn submit(&mut self, frame: Frame, epoch: u64) {
        let crop = self.source.framing_rect_in_preview().map(|rect| {
            match self.source.camera_resolution() {
                Some(camera) if camera != frame.resolution() => {
                    rect.project(camera, frame.resolution())
                }
                _ => rect,
            }
        });
        let task = self.pipeline.submit(DecodeRequest::new(frame, crop));
        self.decoding = Some((task, epoch));
        self.counters.decode_submitted();
        tracing::trace!(%task, ?crop, "frame submitted for decoding");
    }
}
