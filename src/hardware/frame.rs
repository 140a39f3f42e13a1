//! Frame type representing one preview image delivered by the device.

use crate::geometry::Resolution;
use std::time::Instant;

/// Pixel layout of a preview buffer.
///
/// Every supported layout starts with a full-resolution luma plane, which is
/// all the decoder needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit greyscale, one byte per pixel.
    Gray8,
    /// Luma plane followed by interleaved VU at quarter resolution.
    Nv21,
    /// Planar Y, U, V with quarter-resolution chroma.
    Yuv420p,
}

impl PixelFormat {
    /// Expected buffer length for a frame of this format.
    pub fn buffer_len(&self, width: u32, height: u32) -> usize {
        let luma = (width as usize) * (height as usize);
        match self {
            PixelFormat::Gray8 => luma,
            PixelFormat::Nv21 | PixelFormat::Yuv420p => luma + luma / 2,
        }
    }
}

/// A single preview frame from the camera.
#[derive(Clone)]
pub struct Frame {
    /// Raw pixel data in `format` layout.
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
    /// Capture timestamp.
    timestamp: Instant,
    /// Monotonic sequence number assigned by the device.
    sequence: u64,
}

impl Frame {
    /// Creates a new frame.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, format: PixelFormat, sequence: u64) -> Self {
        Self {
            pixels,
            width,
            height,
            format,
            timestamp: Instant::now(),
            sequence,
        }
    }

    /// Creates a greyscale frame.
    pub fn gray(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self::new(pixels, width, height, PixelFormat::Gray8, sequence)
    }

    /// Returns the raw pixel buffer.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Frame width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Width and height together.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Pixel layout of the buffer.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// When the frame was captured.
    #[inline]
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Capture sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the luma plane, or `None` if the buffer is too short.
    pub fn luma(&self) -> Option<&[u8]> {
        self.pixels.get(..self.resolution().area())
    }

    /// Validates that the pixel buffer size matches dimensions and format.
    pub fn is_valid(&self) -> bool {
        !self.resolution().is_empty()
            && self.pixels.len() >= self.format.buffer_len(self.width, self.height)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("sequence", &self.sequence)
            .field("pixel_bytes", &self.pixels.len())
            .finish()
    }
}
