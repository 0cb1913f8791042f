//! Shared test utilities: synthetic rasters and in-memory fixtures.
//!
//! Everything here is generated on the fly so tests never depend on files
//! checked into the repository.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let png = png_bytes(&gradient_raster(64, 48));
//! let zip = zip_bytes(&[("a.png", png.as_slice()), ("notes.txt", b"hi".as_slice())]);
//! ```

use crate::imaging::Raster;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use std::io::{Cursor, Write};
use zip::ZipWriter;
use zip::write::FileOptions;

// =========================================================================
// Rasters
// =========================================================================

fn ramp(value: u32, extent: u32) -> u8 {
    if extent <= 1 {
        0
    } else {
        (value * 255 / (extent - 1)) as u8
    }
}

/// Opaque gradient: red follows x, green follows y, blue is constant.
pub fn gradient_raster(width: u32, height: u32) -> Raster {
    let mut bytes = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            bytes.extend_from_slice(&[ramp(x, width), ramp(y, height), 128, 255]);
        }
    }
    Raster::from_raw(width, height, bytes).unwrap()
}

/// Opaque disc of radius `min(width, height) / 3` centered on a flat background.
pub fn disc_on_background(width: u32, height: u32, bg: [u8; 3], fg: [u8; 3]) -> Raster {
    let radius = (width.min(height) / 3) as f32;
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let mut bytes = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            let [r, g, b] = if dx * dx + dy * dy <= radius * radius {
                fg
            } else {
                bg
            };
            bytes.extend_from_slice(&[r, g, b, 255]);
        }
    }
    Raster::from_raw(width, height, bytes).unwrap()
}

// =========================================================================
// Encoded fixtures
// =========================================================================

/// Plain (unoptimized) RGBA PNG of `raster`.
pub fn png_bytes(raster: &Raster) -> Vec<u8> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(
            raster.as_bytes(),
            raster.width(),
            raster.height(),
            ExtendedColorType::Rgba8,
        )
        .unwrap();
    out
}

/// Baseline JPEG of an RGB gradient.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([ramp(x, width), ramp(y, height), 128])
    });
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 90)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    out
}

/// In-memory ZIP of `(name, bytes)` entries, stored in the given order.
///
/// Names ending in `/` become directory entries.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default();
    for (name, bytes) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}
