use super::event_loop::{Command, SessionLoop, SessionSink};
use super::render::Renderer;
use super::stats::{SessionCounters, SessionStats};
use super::{SessionError, SessionState};
use crate::config::SessionConfig;
use crate::decode::{DecodePipeline, Decoder};
use crate::focus::FocusError;
use crate::geometry::{Rect, Resolution};
use crate::hardware::{DisplaySurface, HardwareCamera};
use crate::source::FrameSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a running scanning session.
///
/// Every method is forwarded to the session's event loop and resolves once
/// the loop has handled it. Dropping the handle stops the loop, which
/// releases the camera.
pub struct CameraSession {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
    counters: Arc<SessionCounters>,
    source: Arc<FrameSource>,
    min_focus_period: Duration,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CameraSession {
    /// Starts a session on the current tokio runtime.
    ///
    /// The session starts `Closed`; call [`resume`](Self::resume) and
    /// provide a surface to start scanning.
    pub fn spawn(
        hardware: Arc<dyn HardwareCamera>,
        screen: Resolution,
        decoder: Arc<dyn Decoder>,
        renderer: Arc<dyn Renderer>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        config.validate()?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Closed);
        let counters = Arc::new(SessionCounters::default());
        let cancel = CancellationToken::new();

        let source = Arc::new(FrameSource::new(
            hardware,
            screen,
            config.framing.clone(),
            config.focus.min_period(),
            runtime.clone(),
        ));
        let sink = SessionSink {
            renderer: Arc::clone(&renderer),
            events: events_tx.clone(),
            counters: Arc::clone(&counters),
        };
        let pipeline = DecodePipeline::new(decoder, Arc::new(sink), config.decode.clone(), &runtime);

        let focus_period = (config.focus.period_ms > 0)
            .then(|| Duration::from_millis(config.focus.period_ms));
        let min_focus_period = config.focus.min_period();
        let session_loop = SessionLoop {
            source: Arc::clone(&source),
            pipeline,
            renderer,
            config,
            state: state_tx,
            events_tx,
            counters: Arc::clone(&counters),
            surface: None,
            focus_period,
            epoch: 0,
            decoding: None,
        };
        let task = runtime.spawn(session_loop.run(commands_rx, events_rx, cancel.clone()));
        tracing::debug!(%screen, "camera session spawned");

        Ok(Self {
            commands: commands_tx,
            state: state_rx,
            counters,
            source,
            min_focus_period,
            cancel,
            task: Some(task),
        })
    }

    async fn call<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)
    }

    /// Moves towards `Previewing`. Opens the camera once a surface is
    /// available. No-op while opening or previewing.
    pub async fn resume(&self) -> Result<(), SessionError> {
        self.call(Command::Resume).await?
    }

    /// Cancels decoding, stops preview and releases the camera.
    pub async fn pause(&self) -> Result<(), SessionError> {
        self.call(Command::Pause).await
    }

    /// A display surface became available.
    pub async fn surface_ready(&self, surface: DisplaySurface) -> Result<(), SessionError> {
        self.call(|reply| Command::SurfaceReady(surface, reply)).await?
    }

    /// The display surface went away. Releases the camera until the next
    /// surface arrives.
    pub async fn surface_destroyed(&self) -> Result<(), SessionError> {
        self.call(Command::SurfaceDestroyed).await
    }

    /// Triggers one focus pass, and thus one capture and decode.
    pub async fn request_decode(&self) -> Result<(), SessionError> {
        self.call(Command::RequestDecode).await?
    }

    /// Focuses every `period_ms` while previewing.
    ///
    /// The period is remembered and re-applied whenever preview starts.
    /// Returns whether periodic focus is running right now.
    pub async fn start_periodic_focus(&self, period_ms: u64) -> Result<bool, SessionError> {
        let period = Duration::from_millis(period_ms);
        if period < self.min_focus_period {
            return Err(FocusError::InvalidPeriod {
                requested_ms: period_ms,
                minimum_ms: self.min_focus_period.as_millis() as u64,
            }
            .into());
        }
        self.call(|reply| Command::StartPeriodicFocus(period, reply))
            .await?
    }

    /// Stops periodic focus and forgets the period.
    pub async fn stop_periodic_focus(&self) -> Result<(), SessionError> {
        self.call(Command::StopPeriodicFocus).await
    }

    /// Sets an explicit framing size. Returns the rectangle if it could be
    /// applied now; otherwise it is applied when the camera next opens.
    pub async fn set_manual_framing_rect(
        &self,
        width: u32,
        height: u32,
    ) -> Result<Option<Rect>, SessionError> {
        self.call(|reply| Command::SetManualFramingRect(width, height, reply))
            .await
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Counters so far.
    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot()
    }

    /// Current framing rectangle in screen coordinates.
    pub fn framing_rect(&self) -> Option<Rect> {
        self.source.framing_rect()
    }

    /// Stops the loop and waits until the camera has been released.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "session loop panicked");
            }
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession")
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::MockCamera;

    struct NullRenderer;

    impl Renderer for NullRenderer {
        fn on_decode_result(&self, _text: &str) {}
    }

    fn spawn(camera: &MockCamera, config: SessionConfig) -> Result<CameraSession, SessionError> {
        CameraSession::spawn(
            Arc::new(camera.clone()),
            Resolution::new(1280, 720),
            Arc::new(|_: &crate::decode::LuminanceSource<'_>| -> Option<String> { None }),
            Arc::new(NullRenderer),
            config,
        )
    }

    #[test]
    fn test_spawn_requires_runtime() {
        let result = spawn(&MockCamera::new(), SessionConfig::default());
        assert!(matches!(result, Err(SessionError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_spawn_rejects_invalid_config() {
        let mut config = SessionConfig::default();
        config.framing.orientation_degrees = 45;
        let result = spawn(&MockCamera::new(), config);
        assert!(matches!(result, Err(SessionError::Config(_))));
    }

    #[tokio::test]
    async fn test_short_period_rejected_synchronously() {
        let session = spawn(&MockCamera::new(), SessionConfig::default()).unwrap();
        let result = session.start_periodic_focus(20).await;
        assert!(matches!(
            result,
            Err(SessionError::Focus(FocusError::InvalidPeriod {
                requested_ms: 20,
                minimum_ms: 100
            }))
        ));
    }

    #[tokio::test]
    async fn test_request_decode_requires_preview() {
        let session = spawn(&MockCamera::new(), SessionConfig::default()).unwrap();
        assert!(matches!(
            session.request_decode().await,
            Err(SessionError::NotPreviewing)
        ));
    }

    #[tokio::test]
    async fn test_resume_without_surface_waits() {
        let camera = MockCamera::new();
        let session = spawn(&camera, SessionConfig::default()).unwrap();

        session.resume().await.unwrap();
        assert_eq!(session.state(), SessionState::Opening);
        assert_eq!(camera.stats().opens, 0);
    }

    #[tokio::test]
    async fn test_shutdown_releases_camera() {
        let camera = MockCamera::new();
        let session = spawn(&camera, SessionConfig::default()).unwrap();
        session
            .surface_ready(DisplaySurface::new(1, Resolution::new(1280, 720)))
            .await
            .unwrap();
        session.resume().await.unwrap();
        assert_eq!(session.state(), SessionState::Previewing);

        session.shutdown().await;
        assert_eq!(camera.stats().open_handles(), 0);
    }
}
