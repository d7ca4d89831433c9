use image::RgbImage;
use serde::Deserialize;

/// An axis-aligned rectangle in frame coordinates.
///
/// `x`/`y` are the top-left corner; the rectangle covers
/// `x..x + width` horizontally and `y..y + height` vertically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Number of pixels covered.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    /// Returns true if the rectangle lies entirely inside a `width` x `height` frame.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width as u64 && self.bottom() <= height as u64
    }

    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && (px as u64) < self.right() && py >= self.y && (py as u64) < self.bottom()
    }

    /// Returns true if `other` lies entirely inside this rectangle.
    pub fn covers(&self, other: &Region) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// One still capture of the monitored screen area.
///
/// Pixels are always stored as 8-bit RGB, whatever the capture backend
/// delivered, so consecutive frames can be compared directly.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbImage,
    /// Unix millis at which the capture was taken.
    captured_at_ms: i64,
}

impl Frame {
    pub fn new(image: RgbImage, captured_at_ms: i64) -> Self {
        Self {
            image,
            captured_at_ms,
        }
    }

    /// Build a frame from a tightly packed RGBA buffer, dropping the alpha channel.
    pub fn from_rgba(
        width: u32,
        height: u32,
        rgba: &[u8],
        captured_at_ms: i64,
    ) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(FrameError::BufferSize {
                got: rgba.len(),
                expected,
            });
        }

        let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
        for px in rgba.chunks_exact(4) {
            rgb.extend_from_slice(&px[..3]);
        }

        let image = RgbImage::from_raw(width, height, rgb).ok_or(FrameError::BufferSize {
            got: rgba.len(),
            expected,
        })?;
        Ok(Self::new(image, captured_at_ms))
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn captured_at_ms(&self) -> i64 {
        self.captured_at_ms
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("pixel buffer has {got} bytes, expected {expected}")]
    BufferSize { got: usize, expected: usize },
}
