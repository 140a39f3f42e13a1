//! Frame decoding.
//!
//! The [`DecodePipeline`] owns at most one active [`DecodeRequest`] at a
//! time. Each submission supersedes the previous one, and only the current
//! task may deliver to the [`DecodeSink`].

mod decoder;
mod luminance;
mod pipeline;

pub use decoder::{Decoder, ResultPoint};
#[cfg(feature = "qr")]
pub use decoder::QrDecoder;
pub use luminance::LuminanceSource;
pub use pipeline::{DecodePipeline, DecodeRequest, DecodeSink, TaskId, TaskStatus};

use crate::geometry::Rect;
use thiserror::Error;

/// Reasons a decode task did not produce an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The buffer is shorter than the luma plane.
    #[error("frame buffer too short: expected {expected} luma bytes, got {actual}")]
    InvalidFrame {
        /// Luma bytes the frame size requires.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },
    /// The crop rectangle lies outside the frame.
    #[error("crop {0} does not intersect the frame")]
    EmptyCrop(Rect),
    /// The task was superseded or cancelled.
    #[error("decode cancelled")]
    Cancelled,
}
