//! Camera Scan CLI
//!
//! Runs a scanning session against the mock camera (optionally serving an
//! image file as every frame) or, with the `camera` feature, a real webcam,
//! and prints every decoded code.

use camera_scan::{
    config::FileConfig,
    hardware::{HardwareCamera, MockCamera, MockConfig},
    metrics::{MetricsRegistry, MetricsSnapshot},
    CameraSession, DisplaySurface, QrDecoder, Rect, Renderer, Resolution,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Periodic focus interval used when neither the config nor the command
/// line sets one.
const DEFAULT_PERIOD_MS: u64 = 1000;

#[derive(Debug, Parser)]
#[command(name = "camera-scan", version, about = "Scan codes from a live camera feed")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve this image (PNG or JPEG) from the mock camera
    #[arg(short, long, conflicts_with = "device")]
    image: Option<PathBuf>,

    /// Webcam index to open instead of the mock camera
    #[arg(short, long)]
    device: Option<u32>,

    /// Periodic focus interval in milliseconds
    #[arg(short, long)]
    period_ms: Option<u64>,

    /// Screen size used for the framing rectangle, as WIDTHxHEIGHT
    #[arg(long, default_value = "1280x720", value_parser = parse_resolution)]
    screen: Resolution,

    /// Give up after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Print Prometheus metrics on exit
    #[arg(long)]
    print_metrics: bool,
}

fn parse_resolution(s: &str) -> Result<Resolution, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    let width = w.trim().parse().map_err(|e| format!("invalid width: {e}"))?;
    let height = h.trim().parse().map_err(|e| format!("invalid height: {e}"))?;
    Ok(Resolution::new(width, height))
}

/// Prints results with a timestamp and forwards them to the main loop.
struct ConsoleRenderer {
    results: mpsc::UnboundedSender<String>,
}

impl Renderer for ConsoleRenderer {
    fn on_framing_rect_ready(&self, rect: Rect) {
        info!(%rect, "framing rect ready");
    }

    fn on_decode_result(&self, text: &str) {
        let now = chrono::Local::now();
        println!("[{}] {}", now.format("%H:%M:%S%.3f"), text);
        let _ = self.results.send(text.to_string());
    }
}

fn open_hardware(args: &Args) -> Result<Arc<dyn HardwareCamera>, String> {
    #[cfg(feature = "camera")]
    if let Some(index) = args.device {
        info!(index, "using webcam");
        return Ok(Arc::new(camera_scan::hardware::NokhwaCamera::new(index)));
    }
    #[cfg(not(feature = "camera"))]
    if args.device.is_some() {
        return Err("webcam support requires the `camera` feature".into());
    }

    let camera = match &args.image {
        Some(path) => {
            let image = image::open(path)
                .map_err(|e| format!("failed to load {}: {e}", path.display()))?
                .to_luma8();
            let size = Resolution::new(image.width(), image.height());
            info!(path = %path.display(), %size, "serving image from mock camera");
            let camera = MockCamera::with_config(MockConfig {
                preview_size: size,
                supported_preview_sizes: vec![size],
                ..Default::default()
            });
            camera.set_image(image.into_raw(), size);
            camera
        }
        None => {
            info!("using synthetic mock camera frames");
            MockCamera::new()
        }
    };
    Ok(Arc::new(camera))
}

async fn run(args: Args, config: FileConfig, cancel: CancellationToken) -> Result<u64, String> {
    let hardware = open_hardware(&args)?;
    let (results_tx, mut results) = mpsc::unbounded_channel();
    let period_ms = args
        .period_ms
        .or((config.session.focus.period_ms > 0).then_some(config.session.focus.period_ms))
        .unwrap_or(DEFAULT_PERIOD_MS);

    let session = CameraSession::spawn(
        hardware,
        args.screen,
        Arc::new(QrDecoder::new()),
        Arc::new(ConsoleRenderer {
            results: results_tx,
        }),
        config.session.clone(),
    )
    .map_err(|e| e.to_string())?;

    session
        .surface_ready(DisplaySurface::new(1, args.screen))
        .await
        .map_err(|e| e.to_string())?;
    session.resume().await.map_err(|e| e.to_string())?;
    let periodic = session
        .start_periodic_focus(period_ms)
        .await
        .map_err(|e| e.to_string())?;
    info!(period_ms, periodic, "scanning");

    let registry = MetricsRegistry::new().map_err(|e| e.to_string())?;

    #[cfg(feature = "metrics")]
    let metrics_state = if config.output.metrics_port > 0 {
        let server = camera_scan::metrics::MetricsServer::new(
            camera_scan::metrics::MetricsServerConfig::with_port(config.output.metrics_port),
            MetricsRegistry::new().map_err(|e| e.to_string())?,
        );
        let state = server.state();
        let shutdown = cancel.child_token();
        tokio::spawn(async move {
            if let Err(e) = server.run(shutdown).await {
                warn!(error = %e, "metrics server stopped");
            }
        });
        Some(state)
    } else {
        None
    };

    let deadline = args.timeout_secs.map(Duration::from_secs);
    let timeout = async {
        match deadline {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(timeout);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    let mut decoded = 0u64;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("interrupted");
                break;
            }
            _ = &mut timeout => {
                warn!("timed out");
                break;
            }
            Some(_) = results.recv() => {
                decoded += 1;
                if config.output.stop_on_result {
                    break;
                }
            }
            _ = ticker.tick() => {
                let snapshot = MetricsSnapshot::from_session(&session);
                registry.update(&snapshot);
                #[cfg(feature = "metrics")]
                if let Some(state) = &metrics_state {
                    state.read().await.update(&snapshot);
                }
            }
        }
    }

    if let Err(e) = session.pause().await {
        warn!(error = %e, "pause failed");
    }
    registry.update(&MetricsSnapshot::from_session(&session));
    let stats = session.stats();
    session.shutdown().await;

    info!(
        decoded,
        focus = stats.focus_successes,
        frames = stats.frames_captured,
        cancelled = stats.decodes_cancelled,
        "session finished"
    );
    if args.print_metrics {
        match registry.encode() {
            Ok(text) => print!("{text}"),
            Err(e) => warn!(error = %e, "failed to encode metrics"),
        }
    }
    Ok(decoded)
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Camera Scan v{}", camera_scan::VERSION);

    let config = match &args.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config: {e}");
                std::process::exit(1);
            }
        },
        None => FileConfig::default(),
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || on_interrupt.cancel()) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {e}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(run(args, config, cancel)) {
        Ok(0) => std::process::exit(2),
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
