//! In-memory RGBA raster shared by every pipeline stage.
//!
//! A [`Raster`] is always 8-bit RGBA with `len(buffer) == width * height * 4`.
//! The invariant is enforced on construction, so stages that receive a
//! raster never need to re-check it. Rasters are moved from stage to stage,
//! never shared.

use image::RgbaImage;

/// Decoded pixel grid in RGBA byte layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    image: RgbaImage,
}

impl Raster {
    /// Build a raster from raw RGBA bytes.
    ///
    /// Returns `None` when the buffer length does not match `width * height * 4`.
    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)?;
        if pixels.len() != expected {
            return None;
        }
        RgbaImage::from_raw(width, height, pixels).map(|image| Self { image })
    }

    /// A raster filled with a single color.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, image::Rgba(rgba)),
        }
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

    /// Number of pixels (`width * height`).
    pub fn area(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// The raw RGBA buffer, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.image
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.image.get_pixel(x, y).0
    }

    /// True when every pixel has alpha 255.
    pub fn is_opaque(&self) -> bool {
        self.as_bytes().chunks_exact(4).all(|px| px[3] == 255)
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }
}

impl From<RgbaImage> for Raster {
    fn from(image: RgbaImage) -> Self {
        Self { image }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_accepts_exact_buffer() {
        let raster = Raster::from_raw(2, 3, vec![0; 24]).unwrap();
        assert_eq!(raster.dimensions(), (2, 3));
        assert_eq!(raster.area(), 6);
    }

    #[test]
    fn from_raw_rejects_short_buffer() {
        assert!(Raster::from_raw(2, 3, vec![0; 23]).is_none());
    }

    #[test]
    fn from_raw_rejects_long_buffer() {
        assert!(Raster::from_raw(2, 3, vec![0; 25]).is_none());
    }

    #[test]
    fn filled_is_opaque_when_alpha_is_max() {
        assert!(Raster::filled(4, 4, [10, 20, 30, 255]).is_opaque());
        assert!(!Raster::filled(4, 4, [10, 20, 30, 254]).is_opaque());
    }

    #[test]
    fn pixel_reads_row_major() {
        let mut bytes = vec![0; 16];
        // (1, 1) is the fourth pixel
        bytes[12..16].copy_from_slice(&[1, 2, 3, 4]);
        let raster = Raster::from_raw(2, 2, bytes).unwrap();
        assert_eq!(raster.pixel(1, 1), [1, 2, 3, 4]);
    }
}
