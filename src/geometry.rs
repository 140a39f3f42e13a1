//! Screen/preview geometry and the framing rectangle.
//!
//! The framing rectangle is the scan target drawn on screen. It is sized
//! relative to the screen, clamped to configured bounds and centered. The
//! same rectangle is projected into preview pixel coordinates to crop frames
//! before decoding.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A width/height pair in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Resolution {
    /// Creates a resolution.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of pixels.
    #[inline]
    pub fn area(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Returns true if either dimension is zero.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An axis-aligned rectangle. `right` and `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub left: u32,
    /// Top edge.
    pub top: u32,
    /// Right edge (exclusive).
    pub right: u32,
    /// Bottom edge (exclusive).
    pub bottom: u32,
}

impl Rect {
    /// Creates a rectangle from its edges.
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Creates a rectangle of the given size centered inside `outer`.
    pub fn centered(outer: Resolution, width: u32, height: u32) -> Self {
        let left = outer.width.saturating_sub(width) / 2;
        let top = outer.height.saturating_sub(height) / 2;
        Self::new(left, top, left + width, top + height)
    }

    /// Width of the rectangle.
    #[inline]
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    /// Height of the rectangle.
    #[inline]
    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// Returns true if the rectangle covers no pixels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Intersects the rectangle with `[0, bounds)`.
    pub fn clamp_to(&self, bounds: Resolution) -> Self {
        Self {
            left: self.left.min(bounds.width),
            top: self.top.min(bounds.height),
            right: self.right.min(bounds.width),
            bottom: self.bottom.min(bounds.height),
        }
    }

    /// Scales the rectangle from `from` coordinates into `to` coordinates.
    ///
    /// Each edge is scaled independently per axis, matching how the preview
    /// stream relates to the screen.
    pub fn project(&self, from: Resolution, to: Resolution) -> Self {
        if from.is_empty() {
            return Self::default();
        }
        let sx = |v: u32| (u64::from(v) * u64::from(to.width) / u64::from(from.width)) as u32;
        let sy = |v: u32| (u64::from(v) * u64::from(to.height) / u64::from(from.height)) as u32;
        Self {
            left: sx(self.left),
            top: sy(self.top),
            right: sx(self.right),
            bottom: sy(self.bottom),
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rect({}, {} - {}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Per-axis bounds for the automatically sized framing rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramingBounds {
    /// Minimum width in screen pixels.
    pub min_width: u32,
    /// Minimum height in screen pixels.
    pub min_height: u32,
    /// Maximum width in screen pixels.
    pub max_width: u32,
    /// Maximum height in screen pixels.
    pub max_height: u32,
}

impl Default for FramingBounds {
    fn default() -> Self {
        Self {
            min_width: 240,
            min_height: 240,
            max_width: 1200, // 5/8 * 1920
            max_height: 675, // 5/8 * 1080
        }
    }
}

/// Target 5/8 of `resolution`, clamped to `[min, max]`.
fn desired_dimension(resolution: u32, min: u32, max: u32) -> u32 {
    let dim = (u64::from(resolution) * 5 / 8) as u32;
    dim.clamp(min, max.max(min))
}

/// Computes the automatic framing rectangle for a screen.
///
/// Never wider or taller than the screen itself.
pub fn framing_rect(screen: Resolution, bounds: &FramingBounds) -> Rect {
    let width = desired_dimension(screen.width, bounds.min_width, bounds.max_width)
        .min(screen.width);
    let height = desired_dimension(screen.height, bounds.min_height, bounds.max_height)
        .min(screen.height);
    Rect::centered(screen, width, height)
}

/// Computes a caller-requested framing rectangle, clamped to the screen and
/// centered.
pub fn manual_framing_rect(screen: Resolution, width: u32, height: u32) -> Rect {
    Rect::centered(screen, width.min(screen.width), height.min(screen.height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_framing_rect_full_hd() {
        let rect = framing_rect(Resolution::new(1080, 1920), &FramingBounds::default());
        // 5/8 * 1080 = 675 fits the width bounds, height clamps to 675
        assert_eq!(rect.width(), 675);
        assert_eq!(rect.height(), 675);
        assert_eq!(rect.left, (1080 - 675) / 2);
        assert_eq!(rect.top, (1920 - 675) / 2);
    }

    #[test]
    fn test_framing_rect_small_screen_uses_minimum() {
        let rect = framing_rect(Resolution::new(320, 320), &FramingBounds::default());
        assert_eq!(rect.width(), 240);
        assert_eq!(rect.height(), 240);
        assert_eq!(rect.left, 40);
    }

    #[test]
    fn test_framing_rect_never_exceeds_tiny_screen() {
        let rect = framing_rect(Resolution::new(100, 50), &FramingBounds::default());
        assert_eq!(rect, Rect::new(0, 0, 100, 50));
    }

    #[test]
    fn test_manual_rect_larger_than_screen() {
        let screen = Resolution::new(720, 1280);
        let rect = manual_framing_rect(screen, 5000, 9000);
        assert_eq!(rect, Rect::new(0, 0, 720, 1280));
    }

    #[test]
    fn test_manual_rect_recentered() {
        let rect = manual_framing_rect(Resolution::new(800, 600), 400, 200);
        assert_eq!(rect, Rect::new(200, 200, 600, 400));
    }

    #[test]
    fn test_projection_into_preview() {
        let screen = Resolution::new(1000, 500);
        let preview = Resolution::new(500, 1000);
        let rect = Rect::new(100, 100, 300, 200).project(screen, preview);
        assert_eq!(rect, Rect::new(50, 200, 150, 400));
    }

    #[test]
    fn test_clamp_to_bounds() {
        let rect = Rect::new(10, 10, 700, 500).clamp_to(Resolution::new(640, 480));
        assert_eq!(rect, Rect::new(10, 10, 640, 480));
        assert!(Rect::new(700, 0, 800, 10)
            .clamp_to(Resolution::new(640, 480))
            .is_empty());
    }

    proptest! {
        #[test]
        fn prop_framing_rect_within_bounds_and_centered(w in 480u32..4096, h in 480u32..4096) {
            let bounds = FramingBounds::default();
            let screen = Resolution::new(w, h);
            let rect = framing_rect(screen, &bounds);

            prop_assert!(rect.width() >= bounds.min_width && rect.width() <= bounds.max_width);
            prop_assert!(rect.height() >= bounds.min_height && rect.height() <= bounds.max_height);

            let left_margin = i64::from(rect.left);
            let right_margin = i64::from(w) - i64::from(rect.right);
            let top_margin = i64::from(rect.top);
            let bottom_margin = i64::from(h) - i64::from(rect.bottom);
            prop_assert!((left_margin - right_margin).abs() <= 1);
            prop_assert!((top_margin - bottom_margin).abs() <= 1);
        }

        #[test]
        fn prop_manual_rect_inside_screen(w in 1u32..4096, h in 1u32..4096, rw in 0u32..8192, rh in 0u32..8192) {
            let rect = manual_framing_rect(Resolution::new(w, h), rw, rh);
            prop_assert!(rect.right <= w);
            prop_assert!(rect.bottom <= h);
            prop_assert_eq!(rect.width(), rw.min(w));
            prop_assert_eq!(rect.height(), rh.min(h));
        }
    }
}
