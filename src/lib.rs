//! Camera Scan Library
//!
//! Drives a live camera preview and continuously tries to decode a code
//! (QR by default) from its frames, reporting the framing rectangle,
//! capture snapshots and results to a renderer.
//!
//! # Architecture
//!
//! ```text
//! surface ready → session opens source → preview
//!                                           ↓
//!                 focus scheduler → focus pass → one-shot frame
//!                                                      ↓
//!              renderer ← result ← decode pipeline (newest frame wins)
//! ```
//!
//! # Design Principles
//!
//! - **Leak-free lifecycle**: open/close and preview start/stop are
//!   idempotent; pausing mid-resume never leaves the camera claimed
//! - **One timer**: restarting periodic focus replaces the old timer
//! - **Newest frame wins**: a new frame cancels the decode of a stale one,
//!   whose results are never delivered
//! - **Swappable collaborators**: camera, decoder and renderer are traits
//!
//! # Example
//!
//! ```no_run
//! use camera_scan::{
//!     CameraSession, DisplaySurface, MockCamera, QrDecoder, Renderer, Resolution,
//!     SessionConfig,
//! };
//! use std::sync::Arc;
//!
//! struct Print;
//!
//! impl Renderer for Print {
//!     fn on_decode_result(&self, text: &str) {
//!         println!("{text}");
//!     }
//! }
//!
//! # async fn run() -> Result<(), camera_scan::SessionError> {
//! let screen = Resolution::new(1280, 720);
//! let session = CameraSession::spawn(
//!     Arc::new(MockCamera::new()),
//!     screen,
//!     Arc::new(QrDecoder::new()),
//!     Arc::new(Print),
//!     SessionConfig::default(),
//! )?;
//!
//! session.surface_ready(DisplaySurface::new(1, screen)).await?;
//! session.resume().await?;
//! session.start_periodic_focus(1500).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod config;
pub mod decode;
pub mod focus;
pub mod geometry;
pub mod hardware;
pub mod metrics;
pub mod session;
pub mod source;

mod sync;

// Re-export commonly used types at crate root
pub use config::{FileConfig, MissPolicy, SessionConfig};
#[cfg(feature = "qr")]
pub use decode::QrDecoder;
pub use decode::{DecodePipeline, Decoder, LuminanceSource, ResultPoint};
pub use focus::{FocusError, FocusScheduler};
pub use geometry::{Rect, Resolution};
pub use hardware::{
    CameraDevice, DisplaySurface, Frame, HardwareCamera, HardwareError, MockCamera, PixelFormat,
};
pub use session::{CameraSession, Renderer, SessionError, SessionState};
pub use source::FrameSource;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
