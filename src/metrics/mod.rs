//! Prometheus metrics for scanning sessions.
//!
//! # Metrics Exposed
//!
//! - `camera_scan_session_state` - 0=closed, 1=opening, 2=previewing, 3=paused
//! - `camera_scan_focus_completions_total` / `camera_scan_focus_failures_total`
//! - `camera_scan_frames_captured_total` - one-shot frames delivered
//! - `camera_scan_decodes_{submitted,cancelled,completed,failed}_total`
//! - `camera_scan_results_total` - codes decoded
//! - `camera_scan_misses_total` - completed decodes without a code
//!
//! With the `metrics` feature, [`MetricsServer`] serves them over HTTP.
//!
//! # Example
//!
//! ```no_run
//! use camera_scan::metrics::{MetricsRegistry, MetricsSnapshot};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! registry.update(&MetricsSnapshot::default());
//! println!("{}", registry.encode().unwrap());
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};
