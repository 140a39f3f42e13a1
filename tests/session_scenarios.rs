//! End-to-end session scenarios against the mock camera.

use camera_scan::config::{MissPolicy, SessionConfig};
use camera_scan::decode::{Decoder, LuminanceSource, ResultPoint};
use camera_scan::hardware::{Frame, MockCamera, MockConfig, ParameterRejection};
use camera_scan::{
    CameraSession, DisplaySurface, HardwareError, Rect, Renderer, Resolution, SessionError,
    SessionState,
};
use image::GrayImage;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const SCREEN: Resolution = Resolution::new(640, 480);

fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
enum Rendered {
    Rect(Rect),
    Preview,
    Result(String),
    Point,
}

struct RecordingRenderer(mpsc::UnboundedSender<Rendered>);

impl Renderer for RecordingRenderer {
    fn on_framing_rect_ready(&self, rect: Rect) {
        let _ = self.0.send(Rendered::Rect(rect));
    }

    fn on_capture_preview(&self, _snapshot: &GrayImage) {
        let _ = self.0.send(Rendered::Preview);
    }

    fn on_decode_result(&self, text: &str) {
        let _ = self.0.send(Rendered::Result(text.to_string()));
    }

    fn on_possible_result_point(&self, _point: ResultPoint) {
        let _ = self.0.send(Rendered::Point);
    }
}

/// Reads a frame whose pixels are all 200 as "HELLO".
fn hello_decoder() -> Arc<dyn Decoder> {
    Arc::new(|source: &LuminanceSource<'_>| -> Option<String> {
        (source.get(0, 0) == 200).then(|| "HELLO".to_string())
    })
}

/// Decodes a frame to its first pixel as a character; `b'A'` frames block
/// until released.
struct GatedDecoder {
    started: mpsc::UnboundedSender<u8>,
    release: Mutex<std::sync::mpsc::Receiver<()>>,
}

impl Decoder for GatedDecoder {
    fn decode(&self, source: &LuminanceSource<'_>) -> Option<String> {
        let tag = source.get(0, 0);
        let _ = self.started.send(tag);
        if tag == b'A' {
            let release = self.release.lock().unwrap();
            let _ = release.recv_timeout(Duration::from_secs(5));
        }
        Some((tag as char).to_string())
    }
}

struct Harness {
    camera: MockCamera,
    session: CameraSession,
    rendered: mpsc::UnboundedReceiver<Rendered>,
}

impl Harness {
    fn new(camera: MockCamera, decoder: Arc<dyn Decoder>, config: SessionConfig) -> Self {
        init_test_tracing();
        let (tx, rendered) = mpsc::unbounded_channel();
        let session = CameraSession::spawn(
            Arc::new(camera.clone()),
            SCREEN,
            decoder,
            Arc::new(RecordingRenderer(tx)),
            config,
        )
        .unwrap();
        Self {
            camera,
            session,
            rendered,
        }
    }

    async fn start(&self) {
        self.session
            .surface_ready(DisplaySurface::new(7, SCREEN))
            .await
            .unwrap();
        self.session.resume().await.unwrap();
        assert_eq!(self.session.state(), SessionState::Previewing);
    }

    /// Waits for the next decode result, skipping other renderer calls.
    async fn next_result(&mut self) -> Option<String> {
        let wait = async {
            while let Some(rendered) = self.rendered.recv().await {
                if let Rendered::Result(text) = rendered {
                    return Some(text);
                }
            }
            None
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .ok()
            .flatten()
    }

    fn drain(&mut self) -> Vec<Rendered> {
        let mut out = Vec::new();
        while let Ok(rendered) = self.rendered.try_recv() {
            out.push(rendered);
        }
        out
    }
}

fn uniform_image(camera: &MockCamera, value: u8) {
    camera.set_image(vec![value; SCREEN.area()], SCREEN);
}

fn tagged_frame(tag: u8, sequence: u64) -> Frame {
    Frame::gray(vec![tag; SCREEN.area()], SCREEN.width, SCREEN.height, sequence)
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn happy_path_decodes_once() {
    let camera = MockCamera::new();
    uniform_image(&camera, 200);
    let mut h = Harness::new(camera, hello_decoder(), SessionConfig::default());

    h.start().await;
    assert_eq!(h.next_result().await.as_deref(), Some("HELLO"));

    // Waiting policy without periodic focus: nothing else is captured.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!h
        .drain()
        .iter()
        .any(|r| matches!(r, Rendered::Result(_))));

    let stats = h.session.stats();
    assert_eq!(stats.results, 1);
    assert_eq!(stats.frames_captured, 1);
    assert_eq!(stats.decodes_completed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn framing_rect_reported_on_preview_start() {
    let camera = MockCamera::new();
    let mut h = Harness::new(camera, hello_decoder(), SessionConfig::default());
    h.start().await;

    let expected = h.session.framing_rect().unwrap();
    assert_eq!(expected.width(), 400);
    assert_eq!(expected.height(), 300);
    assert_eq!(h.rendered.recv().await, Some(Rendered::Rect(expected)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn no_code_found_reports_nothing() {
    let camera = MockCamera::new();
    uniform_image(&camera, 0);
    let mut h = Harness::new(camera, hello_decoder(), SessionConfig::default());

    h.start().await;
    let session = &h.session;
    assert!(eventually(|| session.stats().misses == 1).await);

    let rendered = h.drain();
    assert!(rendered.contains(&Rendered::Preview));
    assert!(!rendered.iter().any(|r| matches!(r, Rendered::Result(_))));
    assert_eq!(h.session.stats().results, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn newer_frame_supersedes_running_decode() {
    let camera = MockCamera::with_config(MockConfig {
        auto_deliver_frames: false,
        ..Default::default()
    });
    let (started_tx, mut started) = mpsc::unbounded_channel();
    let (release, release_rx) = std::sync::mpsc::channel();
    let decoder = GatedDecoder {
        started: started_tx,
        release: Mutex::new(release_rx),
    };
    let mut h = Harness::new(camera, Arc::new(decoder), SessionConfig::default());
    h.start().await;

    // Focus on start armed a frame; feed frame A and let it block.
    let camera = h.camera.clone();
    assert!(eventually(|| camera.deliver(tagged_frame(b'A', 1))).await);
    assert_eq!(started.recv().await, Some(b'A'));

    // Frame B arrives while A is still decoding.
    h.session.request_decode().await.unwrap();
    assert!(eventually(|| camera.deliver(tagged_frame(b'B', 2))).await);
    let session = &h.session;
    assert!(eventually(|| session.stats().decodes_cancelled == 1).await);
    release.send(()).unwrap();

    assert_eq!(h.next_result().await.as_deref(), Some("B"));
    assert_eq!(started.recv().await, Some(b'B'));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!h
        .drain()
        .iter()
        .any(|r| matches!(r, Rendered::Result(_))));
    let stats = h.session.stats();
    assert_eq!(stats.results, 1);
    assert_eq!(stats.decodes_submitted, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resume_and_pause_are_idempotent() {
    let h = Harness::new(MockCamera::new(), hello_decoder(), SessionConfig::default());
    h.start().await;
    h.session.resume().await.unwrap();
    assert_eq!(h.camera.stats().opens, 1);
    assert_eq!(h.camera.stats().preview_starts, 1);

    h.session.pause().await.unwrap();
    h.session.pause().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Paused);
    let stats = h.camera.stats();
    assert_eq!(stats.releases, 1);
    assert_eq!(stats.open_handles(), 0);

    h.session.resume().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Previewing);
    assert_eq!(h.camera.stats().opens, 2);
    assert_eq!(h.camera.stats().open_handles(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pause_before_surface_never_opens() {
    let h = Harness::new(MockCamera::new(), hello_decoder(), SessionConfig::default());
    h.session.resume().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Opening);

    h.session.pause().await.unwrap();
    h.session
        .surface_ready(DisplaySurface::new(1, SCREEN))
        .await
        .unwrap();

    assert_eq!(h.session.state(), SessionState::Paused);
    assert_eq!(h.camera.stats().opens, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pause_stops_periodic_focus() {
    let h = Harness::new(MockCamera::new(), hello_decoder(), SessionConfig::default());

    // Remembered before preview, applied when it starts.
    assert!(!h.session.start_periodic_focus(100).await.unwrap());
    h.start().await;

    let camera = h.camera.clone();
    assert!(eventually(|| camera.stats().focus_requests >= 3).await);

    h.session.pause().await.unwrap();
    let after_pause = camera.stats().focus_requests;
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(camera.stats().focus_requests, after_pause);
    assert_eq!(camera.stats().open_handles(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn periodic_focus_survives_pause_resume() {
    let h = Harness::new(MockCamera::new(), hello_decoder(), SessionConfig::default());
    h.start().await;
    assert!(h.session.start_periodic_focus(100).await.unwrap());

    h.session.pause().await.unwrap();
    h.session.resume().await.unwrap();
    let resumed_at = h.camera.stats().focus_requests;

    let camera = h.camera.clone();
    assert!(eventually(|| camera.stats().focus_requests >= resumed_at + 2).await);

    h.session.stop_periodic_focus().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stopped_at = camera.stats().focus_requests;
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(camera.stats().focus_requests, stopped_at);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn surface_destroyed_releases_camera() {
    let h = Harness::new(MockCamera::new(), hello_decoder(), SessionConfig::default());
    h.start().await;

    h.session.surface_destroyed().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Opening);
    assert_eq!(h.camera.stats().open_handles(), 0);

    h.session
        .surface_ready(DisplaySurface::new(8, SCREEN))
        .await
        .unwrap();
    assert_eq!(h.session.state(), SessionState::Previewing);
    assert_eq!(h.camera.stats().opens, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unavailable_camera_returns_to_closed() {
    let camera = MockCamera::new();
    camera.set_available(false);
    let h = Harness::new(camera, hello_decoder(), SessionConfig::default());

    h.session
        .surface_ready(DisplaySurface::new(1, SCREEN))
        .await
        .unwrap();
    let result = h.session.resume().await;
    assert!(matches!(
        result,
        Err(SessionError::Hardware(HardwareError::Unavailable(_)))
    ));
    assert_eq!(h.session.state(), SessionState::Closed);

    h.camera.set_available(true);
    h.session.resume().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Previewing);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn preview_start_failure_releases_camera() {
    let camera = MockCamera::with_config(MockConfig {
        fail_start_preview: true,
        ..Default::default()
    });
    let h = Harness::new(camera, hello_decoder(), SessionConfig::default());
    assert!(!h.session.start_periodic_focus(100).await.unwrap());

    h.session
        .surface_ready(DisplaySurface::new(1, SCREEN))
        .await
        .unwrap();
    let result = h.session.resume().await;
    assert!(matches!(
        result,
        Err(SessionError::Hardware(HardwareError::Device(_)))
    ));
    assert_eq!(h.session.state(), SessionState::Closed);
    let stats = h.camera.stats();
    assert_eq!(stats.opens, 1);
    assert_eq!(stats.open_handles(), 0);
    assert!(!h.camera.is_previewing());

    // No focus timer outlives the failed bring-up.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.camera.stats().focus_requests, 0);

    h.camera.set_fail_start_preview(false);
    h.session.resume().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Previewing);
    assert_eq!(h.camera.stats().open_handles(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_focus_captures_nothing() {
    let camera = MockCamera::with_config(MockConfig {
        focus_result: Some(false),
        ..Default::default()
    });
    uniform_image(&camera, 200);
    let mut h = Harness::new(camera, hello_decoder(), SessionConfig::default());

    h.start().await;
    let session = &h.session;
    assert!(eventually(|| session.stats().focus_failures >= 1).await);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stats = h.session.stats();
    assert_eq!(stats.frames_captured, 0);
    assert_eq!(stats.decodes_submitted, 0);
    assert_eq!(h.camera.stats().frame_requests, 0);
    assert!(!h
        .drain()
        .iter()
        .any(|r| matches!(r, Rendered::Result(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn capture_waits_for_focus_completion() {
    let camera = MockCamera::with_config(MockConfig {
        focus_result: None,
        ..Default::default()
    });
    uniform_image(&camera, 200);
    let mut h = Harness::new(camera, hello_decoder(), SessionConfig::default());

    h.start().await;
    let camera = h.camera.clone();
    assert!(eventually(|| camera.stats().focus_requests == 1).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(camera.stats().frame_requests, 0);
    assert_eq!(h.session.stats().frames_captured, 0);

    assert_eq!(camera.complete_focus(true), 1);
    assert_eq!(h.next_result().await.as_deref(), Some("HELLO"));
    let stats = h.session.stats();
    assert_eq!(stats.focus_successes, 1);
    assert_eq!(stats.frames_captured, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn safe_mode_fallback_still_scans() {
    let camera = MockCamera::with_config(MockConfig {
        reject_parameters: ParameterRejection::FirstAttempt,
        ..Default::default()
    });
    uniform_image(&camera, 200);
    let mut h = Harness::new(camera, hello_decoder(), SessionConfig::default());

    h.start().await;
    assert_eq!(h.next_result().await.as_deref(), Some("HELLO"));
    assert_eq!(h.camera.stats().parameter_rejections, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn manual_framing_rect_deferred_until_open() {
    let mut h = Harness::new(MockCamera::new(), hello_decoder(), SessionConfig::default());

    assert_eq!(h.session.set_manual_framing_rect(200, 100).await.unwrap(), None);
    h.start().await;

    let expected = Rect::centered(SCREEN, 200, 100);
    assert_eq!(h.session.framing_rect(), Some(expected));
    assert_eq!(h.rendered.recv().await, Some(Rendered::Rect(expected)));

    let applied = h.session.set_manual_framing_rect(5000, 50).await.unwrap();
    assert_eq!(applied, Some(Rect::new(0, 215, 640, 265)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recapture_policy_keeps_capturing() {
    let camera = MockCamera::new();
    uniform_image(&camera, 0);
    let mut config = SessionConfig::default();
    config.scan.on_miss = MissPolicy::Recapture;
    let h = Harness::new(camera, hello_decoder(), config);

    h.start().await;
    let session = &h.session;
    assert!(eventually(|| session.stats().frames_captured >= 3).await);
    // Only the start-up focus pass was issued.
    assert_eq!(h.camera.stats().focus_requests, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_releases_everything() {
    let camera = MockCamera::new();
    let h = Harness::new(camera.clone(), hello_decoder(), SessionConfig::default());
    h.start().await;
    assert!(h.session.start_periodic_focus(100).await.unwrap());

    h.session.shutdown().await;
    assert_eq!(camera.stats().open_handles(), 0);
    assert!(!camera.is_previewing());

    let requests = camera.stats().focus_requests;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(camera.stats().focus_requests, requests);
}
