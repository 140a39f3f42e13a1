use crate::decode::ResultPoint;
use crate::geometry::Rect;
use image::GrayImage;

/// Where a session reports what it sees.
///
/// Calls arrive from the session loop and from the decode worker, never
/// concurrently for the same decode. Implementations must not block.
pub trait Renderer: Send + Sync {
    /// The framing rectangle, in screen coordinates, is known or changed.
    fn on_framing_rect_ready(&self, rect: Rect) {
        let _ = rect;
    }

    /// Snapshot of the frame currently being decoded.
    fn on_capture_preview(&self, snapshot: &GrayImage) {
        let _ = snapshot;
    }

    /// A code was decoded.
    fn on_decode_result(&self, text: &str);

    /// A candidate point of a code, in crop coordinates.
    fn on_possible_result_point(&self, point: ResultPoint) {
        let _ = point;
    }
}
