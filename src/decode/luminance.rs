//! Cropped, zero-copy view over a frame's luma plane.

use super::DecodeError;
use crate::geometry::{Rect, Resolution};
use image::{imageops, GrayImage};

/// Luminance of a rectangular region of a frame.
///
/// Borrows the luma plane; nothing is copied until [`matrix`](Self::matrix)
/// or [`to_image`](Self::to_image) is called.
#[derive(Debug, Clone, Copy)]
pub struct LuminanceSource<'a> {
    data: &'a [u8],
    data_width: u32,
    crop: Rect,
}

impl<'a> LuminanceSource<'a> {
    /// Wraps `data` as a `data_width` x `data_height` plane cropped to `crop`.
    ///
    /// The crop is clamped to the plane. Fails if the buffer is too short or
    /// the clamped crop is empty.
    pub fn new(
        data: &'a [u8],
        data_width: u32,
        data_height: u32,
        crop: Rect,
    ) -> Result<Self, DecodeError> {
        let plane = Resolution::new(data_width, data_height);
        if plane.is_empty() || data.len() < plane.area() {
            return Err(DecodeError::InvalidFrame {
                expected: plane.area(),
                actual: data.len(),
            });
        }
        let crop = crop.clamp_to(plane);
        if crop.is_empty() {
            return Err(DecodeError::EmptyCrop(crop));
        }
        Ok(Self {
            data,
            data_width,
            crop,
        })
    }

    /// Wraps the whole plane.
    pub fn full(data: &'a [u8], width: u32, height: u32) -> Result<Self, DecodeError> {
        Self::new(data, width, height, Rect::new(0, 0, width, height))
    }

    /// Width of the cropped region.
    #[inline]
    pub fn width(&self) -> u32 {
        self.crop.width()
    }

    /// Height of the cropped region.
    #[inline]
    pub fn height(&self) -> u32 {
        self.crop.height()
    }

    /// Crop rectangle in frame coordinates.
    pub fn crop(&self) -> Rect {
        self.crop
    }

    /// Row `y` of the cropped region.
    ///
    /// # Panics
    ///
    /// If `y >= height()`.
    #[inline]
    pub fn row(&self, y: u32) -> &'a [u8] {
        assert!(y < self.height(), "row {y} out of range");
        let start = (self.crop.top + y) as usize * self.data_width as usize + self.crop.left as usize;
        &self.data[start..start + self.width() as usize]
    }

    /// Luminance at `(x, y)` relative to the crop.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.row(y)[x as usize]
    }

    /// Copies the cropped region row by row.
    pub fn matrix(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width() as usize * self.height() as usize);
        for y in 0..self.height() {
            out.extend_from_slice(self.row(y));
        }
        out
    }

    /// Copies the cropped region into an image.
    pub fn to_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width(), self.height(), |x, y| {
            image::Luma([self.get(x, y)])
        })
    }

    /// Renderable snapshot: the centered square of the crop, rotated by
    /// `rotation` degrees (0, 90, 180 or 270).
    pub fn snapshot(&self, rotation: u32) -> GrayImage {
        let side = self.width().min(self.height());
        let square = Rect::centered(Resolution::new(self.width(), self.height()), side, side);
        let image = GrayImage::from_fn(side, side, |x, y| {
            image::Luma([self.get(square.left + x, square.top + y)])
        });
        match rotation % 360 {
            90 => imageops::rotate90(&image),
            180 => imageops::rotate180(&image),
            270 => imageops::rotate270(&image),
            _ => image,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 4x3 plane where each pixel is `10 * y + x`.
    fn plane() -> Vec<u8> {
        (0..3u8)
            .flat_map(|y| (0..4u8).map(move |x| 10 * y + x))
            .collect()
    }

    #[test]
    fn test_rows_respect_crop() {
        let data = plane();
        let source = LuminanceSource::new(&data, 4, 3, Rect::new(1, 1, 3, 3)).unwrap();

        assert_eq!(source.width(), 2);
        assert_eq!(source.height(), 2);
        assert_eq!(source.row(0), &[11, 12]);
        assert_eq!(source.row(1), &[21, 22]);
        assert_eq!(source.matrix(), vec![11, 12, 21, 22]);
    }

    #[test]
    fn test_crop_clamped_to_plane() {
        let data = plane();
        let source = LuminanceSource::new(&data, 4, 3, Rect::new(2, 0, 100, 100)).unwrap();
        assert_eq!(source.crop(), Rect::new(2, 0, 4, 3));
        assert_eq!(source.get(1, 2), 23);
    }

    #[test]
    fn test_short_buffer_rejected() {
        let data = vec![0u8; 5];
        assert!(matches!(
            LuminanceSource::full(&data, 4, 3),
            Err(DecodeError::InvalidFrame {
                expected: 12,
                actual: 5
            })
        ));
    }

    #[test]
    fn test_crop_outside_plane_rejected() {
        let data = plane();
        assert!(matches!(
            LuminanceSource::new(&data, 4, 3, Rect::new(10, 10, 20, 20)),
            Err(DecodeError::EmptyCrop(_))
        ));
    }

    #[test]
    fn test_nv21_chroma_ignored() {
        // Luma plane followed by a half-size chroma plane.
        let mut data = plane();
        data.extend(std::iter::repeat(255).take(6));
        let source = LuminanceSource::full(&data, 4, 3).unwrap();
        assert_eq!(source.matrix(), plane());
    }

    #[test]
    fn test_snapshot_is_centered_square() {
        let data = plane();
        let source = LuminanceSource::full(&data, 4, 3).unwrap();

        let snapshot = source.snapshot(0);
        assert_eq!(snapshot.dimensions(), (3, 3));
        // Square starts at x = 0 because (4 - 3) / 2 = 0.
        assert_eq!(snapshot.get_pixel(0, 0).0, [0]);
        assert_eq!(snapshot.get_pixel(2, 2).0, [22]);
    }

    #[test]
    fn test_snapshot_rotation() {
        let data = plane();
        let source = LuminanceSource::new(&data, 4, 3, Rect::new(0, 0, 2, 2)).unwrap();

        let rotated = source.snapshot(90);
        // Clockwise: the bottom-left pixel moves to the top-left.
        assert_eq!(rotated.get_pixel(0, 0).0, [10]);
        assert_eq!(rotated.get_pixel(1, 0).0, [0]);
    }

    #[test]
    fn test_to_image_matches_matrix() {
        let data = plane();
        let source = LuminanceSource::new(&data, 4, 3, Rect::new(1, 0, 4, 2)).unwrap();
        assert_eq!(source.to_image().into_raw(), source.matrix());
    }
}
