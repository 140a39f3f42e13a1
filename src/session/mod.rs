//! Scanning session orchestration.
//!
//! A [`CameraSession`] ties the frame source, the focus scheduler and the
//! decode pipeline together behind a small command API. All coordination
//! runs on one event-loop task; hardware bring-up and teardown run on the
//! blocking pool.

mod camera_session;
mod event_loop;
mod render;
mod stats;

pub use camera_session::CameraSession;
pub use render::Renderer;
pub use stats::SessionStats;

use crate::config::ConfigError;
use crate::focus::FocusError;
use crate::hardware::HardwareError;
use serde::Serialize;
use thiserror::Error;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No device held.
    #[default]
    Closed,
    /// Resumed, waiting for a display surface or for bring-up to finish.
    Opening,
    /// Device open and preview streaming.
    Previewing,
    /// Paused by the caller; device released.
    Paused,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Previewing => "previewing",
            Self::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// Errors returned by [`CameraSession`].
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// Camera failure.
    #[error(transparent)]
    Hardware(#[from] HardwareError),
    /// Invalid focus request.
    #[error(transparent)]
    Focus(#[from] FocusError),
    /// Invalid session configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Spawned outside a tokio runtime.
    #[error("a camera session must be created inside a tokio runtime")]
    NoRuntime,
    /// The operation needs a running preview.
    #[error("preview is not running")]
    NotPreviewing,
    /// The session loop has stopped.
    #[error("session has shut down")]
    Closed,
}
