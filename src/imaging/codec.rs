//! Decode arbitrary input bytes into a [`Raster`], encode a raster to PNG.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Sniff format | `image::ImageReader::with_guessed_format` (magic bytes) |
//! | Header / dimensions | `ImageReader::into_dimensions` (no pixel decode) |
//! | Decode | `ImageReader::decode` under `image::Limits` |
//! | Encode | `image::codecs::png::PngEncoder` (adaptive filters) |
//! | Optimize | `oxipng::optimize_from_memory`, reductions disabled |
//!
//! Decoding reads the header first so oversized images are rejected before
//! any pixel buffer is allocated. Output PNGs are always 8-bit RGBA, and
//! re-encoding is lossless: `decode(encode_png(r))` yields `r` exactly.

use super::params::OptimizationLevel;
use super::raster::Raster;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, ImageError, ImageFormat, ImageReader};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid image data: {0}")]
    InvalidFormat(String),
    #[error("truncated or corrupt image data: {0}")]
    Truncated(String),
    #[error("image is {width}x{height}, over the {limit}-pixel ceiling")]
    TooLarge { width: u32, height: u32, limit: u64 },
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("cannot encode an empty {0}x{1} raster")]
    EmptyRaster(u32, u32),
    #[error("PNG encode failed: {0}")]
    Png(#[from] ImageError),
    #[error("PNG optimization failed: {0}")]
    Optimize(String),
}

/// Ceilings applied while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Maximum `width * height` accepted.
    pub max_pixels: u64,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_pixels: 100_000_000,
        }
    }
}

/// Identify the container format from magic bytes.
pub fn sniff_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

fn is_eof(err: &ImageError) -> bool {
    matches!(err, ImageError::IoError(io) if io.kind() == std::io::ErrorKind::UnexpectedEof)
}

fn reader(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, DecodeError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DecodeError::InvalidFormat(e.to_string()))?;
    if reader.format().is_none() {
        return Err(DecodeError::InvalidFormat(
            "unrecognized file signature".to_string(),
        ));
    }
    Ok(reader)
}

/// Decode image bytes into an RGBA raster.
///
/// Failure mapping:
/// - empty input, unknown signature, unreadable header, zero dimensions → `InvalidFormat`
/// - header cut short, or pixel data that fails after a valid header → `Truncated`
/// - `width * height` above `limits.max_pixels` → `TooLarge`
pub fn decode(bytes: &[u8], limits: &DecodeLimits) -> Result<Raster, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::InvalidFormat("empty input".to_string()));
    }

    let (width, height) = reader(bytes)?.into_dimensions().map_err(|e| {
        if is_eof(&e) {
            DecodeError::Truncated(e.to_string())
        } else {
            DecodeError::InvalidFormat(e.to_string())
        }
    })?;

    if width == 0 || height == 0 {
        return Err(DecodeError::InvalidFormat(format!(
            "zero dimension ({width}x{height})"
        )));
    }
    let pixels = width as u64 * height as u64;
    if pixels > limits.max_pixels {
        return Err(DecodeError::TooLarge {
            width,
            height,
            limit: limits.max_pixels,
        });
    }

    let mut reader = reader(bytes)?;
    let mut decode_limits = image::Limits::default();
    // Enough for a 16-bit RGBA buffer plus the RGBA8 conversion.
    decode_limits.max_alloc = Some(pixels.saturating_mul(12).max(1 << 20));
    reader.limits(decode_limits);

    let image = reader.decode().map_err(|e| match e {
        ImageError::Limits(_) => DecodeError::TooLarge {
            width,
            height,
            limit: limits.max_pixels,
        },
        other => DecodeError::Truncated(other.to_string()),
    })?;

    Ok(Raster::from(image.into_rgba8()))
}

/// Encode a raster as an optimized 8-bit RGBA PNG.
///
/// Output is deterministic for a given raster and level.
pub fn encode_png(raster: &Raster, level: OptimizationLevel) -> Result<Vec<u8>, EncodeError> {
    let (width, height) = raster.dimensions();
    if width == 0 || height == 0 {
        return Err(EncodeError::EmptyRaster(width, height));
    }

    let (compression, filter) = if level.value() == 0 {
        (CompressionType::Fast, FilterType::Sub)
    } else {
        (CompressionType::Best, FilterType::Adaptive)
    };

    let mut buffer = Vec::new();
    PngEncoder::new_with_quality(Cursor::new(&mut buffer), compression, filter).write_image(
        raster.as_bytes(),
        width,
        height,
        ExtendedColorType::Rgba8,
    )?;

    if level.value() == 0 {
        return Ok(buffer);
    }
    optimize(&buffer, level)
}

/// Lossless recompression that keeps the RGBA8 color type and every pixel value.
fn optimize(png: &[u8], level: OptimizationLevel) -> Result<Vec<u8>, EncodeError> {
    let mut opts = oxipng::Options::from_preset(level.value());
    opts.bit_depth_reduction = false;
    opts.color_type_reduction = false;
    opts.palette_reduction = false;
    opts.grayscale_reduction = false;
    opts.optimize_alpha = false;
    opts.scale_16 = false;
    opts.strip = oxipng::StripChunks::Safe;
    oxipng::optimize_from_memory(png, &opts).map_err(|e| EncodeError::Optimize(e.to_string()))
}
