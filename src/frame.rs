use std::sync::Arc;

use image::{ImageBuffer, Rgba, RgbaImage};

use crate::error::FrameError;

/// Channel order of a 4-byte pixel.
///
/// Camera capture typically delivers BGRA; decoded image files are RGBA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelLayout {
    #[default]
    Rgba,
    Bgra,
}

impl PixelLayout {
    /// Read (R, G, B) from the first three bytes of a pixel.
    #[inline]
    pub fn rgb(self, pixel: &[u8]) -> (u8, u8, u8) {
        match self {
            PixelLayout::Rgba => (pixel[0], pixel[1], pixel[2]),
            PixelLayout::Bgra => (pixel[2], pixel[1], pixel[0]),
        }
    }
}

/// One timestamped video frame.
///
/// The pixel buffer is shared (`Arc`) so a frame can be handed to the
/// pipeline worker and the replay buffer without copying pixels.
///
/// # Layout
/// - 4 bytes per pixel, channel order given by [`PixelLayout`]
/// - rows may be padded: pixel `(x, y)` starts at `y * bytes_per_row + x * 4`
/// - `timestamp` is in seconds and strictly increasing per source
#[derive(Debug, Clone)]
pub struct Frame {
    data: Arc<[u8]>,
    width: u32,
    height: u32,
    bytes_per_row: usize,
    layout: PixelLayout,
    timestamp: f64,
}

impl Frame {
    /// Wrap a raw pixel buffer, validating its geometry.
    pub fn new(
        data: impl Into<Arc<[u8]>>,
        width: u32,
        height: u32,
        bytes_per_row: usize,
        layout: PixelLayout,
        timestamp: f64,
    ) -> Result<Self, FrameError> {
        let data = data.into();

        if width == 0 || height == 0 {
            return Err(FrameError::EmptyDimensions { width, height });
        }
        let packed_row = width as usize * 4;
        if bytes_per_row < packed_row {
            return Err(FrameError::StrideTooShort {
                width,
                bytes_per_row,
            });
        }
        let required = bytes_per_row
            .checked_mul(height as usize - 1)
            .and_then(|rows| rows.checked_add(packed_row))
            .ok_or(FrameError::GeometryOverflow {
                height,
                bytes_per_row,
            })?;
        if data.len() < required {
            return Err(FrameError::BufferTooSmall {
                required,
                actual: data.len(),
            });
        }
        if !timestamp.is_finite() {
            return Err(FrameError::InvalidTimestamp(timestamp));
        }

        Ok(Self {
            data,
            width,
            height,
            bytes_per_row,
            layout,
            timestamp,
        })
    }

    /// Wrap a decoded RGBA image (tightly packed rows).
    pub fn from_rgba_image(image: RgbaImage, timestamp: f64) -> Result<Self, FrameError> {
        let (width, height) = image.dimensions();
        Self::new(
            image.into_raw(),
            width,
            height,
            width as usize * 4,
            PixelLayout::Rgba,
            timestamp,
        )
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Bytes of row `y`, without trailing padding.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.bytes_per_row;
        &self.data[start..start + self.width as usize * 4]
    }

    /// (R, G, B) at pixel `(x, y)`.
    #[inline]
    pub fn rgb_at(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let offset = x as usize * 4;
        self.layout.rgb(&self.row(y)[offset..offset + 4])
    }

    /// Decode into an owned RGBA image, dropping row padding.
    ///
    /// BGRA input has B and R swapped back; alpha is preserved.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut pixels = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in 0..self.height {
            let row = self.row(y);
            match self.layout {
                PixelLayout::Rgba => pixels.extend_from_slice(row),
                PixelLayout::Bgra => {
                    for chunk in row.chunks_exact(4) {
                        pixels.extend_from_slice(&[chunk[2], chunk[1], chunk[0], chunk[3]]);
                    }
                }
            }
        }

        // Buffer length is exactly width * height * 4 by construction.
        ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(self.width, self.height, pixels)
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_short_buffer() {
        let err = Frame::new(vec![0u8; 10], 2, 2, 8, PixelLayout::Rgba, 0.0).unwrap_err();
        assert_eq!(
            err,
            FrameError::BufferTooSmall {
                required: 16,
                actual: 10
            }
        );
    }

    #[test]
    fn test_rejects_bad_geometry() {
        assert!(matches!(
            Frame::new(vec![0u8; 16], 0, 2, 8, PixelLayout::Rgba, 0.0),
            Err(FrameError::EmptyDimensions { .. })
        ));
        assert!(matches!(
            Frame::new(vec![0u8; 16], 2, 2, 4, PixelLayout::Rgba, 0.0),
            Err(FrameError::StrideTooShort { .. })
        ));
        assert!(matches!(
            Frame::new(vec![0u8; 16], 2, 2, 8, PixelLayout::Rgba, f64::NAN),
            Err(FrameError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_rejects_overflowing_stride() {
        assert_eq!(
            Frame::new(vec![0u8; 16], 1, 3, usize::MAX, PixelLayout::Rgba, 0.0).unwrap_err(),
            FrameError::GeometryOverflow {
                height: 3,
                bytes_per_row: usize::MAX
            }
        );

        // Would wrap to a small size without the overflow check
        let stride = 1usize << (usize::BITS - 1);
        assert!(matches!(
            Frame::new(vec![0u8; 16], 1, 3, stride, PixelLayout::Rgba, 0.0),
            Err(FrameError::GeometryOverflow { .. })
        ));
    }

    #[test]
    fn test_bgra_channel_order() {
        // One BGRA pixel: B=10, G=20, R=30, A=255
        let frame = Frame::new(vec![10, 20, 30, 255], 1, 1, 4, PixelLayout::Bgra, 0.0).unwrap();
        assert_eq!(frame.rgb_at(0, 0), (30, 20, 10));

        let image = frame.to_rgba_image();
        assert_eq!(image.get_pixel(0, 0), &Rgba([30, 20, 10, 255]));
    }

    #[test]
    fn test_padded_rows() {
        // 1x2 frame with 4 bytes of padding per row
        let data = vec![
            1, 2, 3, 255, 0, 0, 0, 0, //
            4, 5, 6, 255, 0, 0, 0, 0,
        ];
        let frame = Frame::new(data, 1, 2, 8, PixelLayout::Rgba, 1.5).unwrap();
        assert_eq!(frame.rgb_at(0, 1), (4, 5, 6));

        let image = frame.to_rgba_image();
        assert_eq!(image.dimensions(), (1, 2));
        assert_eq!(image.get_pixel(0, 1), &Rgba([4, 5, 6, 255]));
    }
}
