//! Decoder capability and the built-in QR decoder.

use super::LuminanceSource;

/// A point of interest reported while decoding, in crop coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultPoint {
    /// Horizontal position.
    pub x: f32,
    /// Vertical position.
    pub y: f32,
}

impl ResultPoint {
    /// Point at `(x, y)`.
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Turns luminance into decoded text.
///
/// Implementations are called from the blocking pool, one call at a time
/// per pipeline.
pub trait Decoder: Send + Sync {
    /// Decodes `source`, returning the text if a code was found.
    fn decode(&self, source: &LuminanceSource<'_>) -> Option<String>;

    /// Like [`decode`](Self::decode), reporting candidate points to `hints`
    /// as they are found.
    fn decode_with_hints(
        &self,
        source: &LuminanceSource<'_>,
        hints: &mut dyn FnMut(ResultPoint),
    ) -> Option<String> {
        let _ = hints;
        self.decode(source)
    }
}

impl<F> Decoder for F
where
    F: Fn(&LuminanceSource<'_>) -> Option<String> + Send + Sync,
{
    fn decode(&self, source: &LuminanceSource<'_>) -> Option<String> {
        self(source)
    }
}

/// QR decoder backed by `rqrr`.
#[cfg(feature = "qr")]
#[derive(Debug, Default, Clone, Copy)]
pub struct QrDecoder;

#[cfg(feature = "qr")]
impl QrDecoder {
    /// Creates a QR decoder.
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "qr")]
impl Decoder for QrDecoder {
    fn decode(&self, source: &LuminanceSource<'_>) -> Option<String> {
        self.decode_with_hints(source, &mut |_| {})
    }

    fn decode_with_hints(
        &self,
        source: &LuminanceSource<'_>,
        hints: &mut dyn FnMut(ResultPoint),
    ) -> Option<String> {
        let start = std::time::Instant::now();
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            source.width() as usize,
            source.height() as usize,
            |x, y| source.get(x as u32, y as u32),
        );
        let grids = prepared.detect_grids();
        tracing::trace!(
            grids = grids.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "QR grid detection complete"
        );

        for grid in &grids {
            for corner in &grid.bounds {
                hints(ResultPoint::new(corner.x as f32, corner.y as f32));
            }
            match grid.decode() {
                Ok((meta, content)) => {
                    tracing::debug!(version = meta.version.0, len = content.len(), "decoded QR code");
                    return Some(content);
                }
                Err(e) => tracing::debug!(error = ?e, "failed to decode QR grid"),
            }
        }
        None
    }
}
