//! Resize engine.
//!
//! Resampling uses Catmull-Rom (bicubic) through `image::imageops::resize`,
//! whose kernel widens with the scale factor, so downscaling averages over
//! the covered area instead of aliasing.
//!
//! Rasters that carry transparency are resampled in premultiplied-alpha
//! `f32` space and divided back afterwards. Straight-alpha filtering would
//! bleed the color of invisible pixels into soft edges (a green fringe
//! around a subject cut out of a green screen, for instance). Fully opaque
//! rasters skip the conversion and resample directly in 8-bit.
//!
//! Fully transparent output pixels carry RGB `0`.

use super::calculations::{Placement, plan_resize};
use super::params::{ResizeMode, TargetSize};
use super::raster::Raster;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba, Rgba32FImage, RgbaImage};
use thiserror::Error;

const FILTER: FilterType = FilterType::CatmullRom;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResizeError {
    #[error("invalid target dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

/// Resize `raster` to exactly `target` (after clamping to `max_dimension`).
pub fn resize(
    raster: Raster,
    target: TargetSize,
    mode: ResizeMode,
    max_dimension: u32,
) -> Result<Raster, ResizeError> {
    if target.width == 0 || target.height == 0 {
        return Err(ResizeError::InvalidDimensions {
            width: target.width,
            height: target.height,
        });
    }
    let target = target.clamped(max_dimension.max(1));
    if raster.dimensions() == (target.width, target.height) {
        return Ok(raster);
    }

    let plan = plan_resize(raster.dimensions(), target, mode);
    let raster = match plan.crop {
        Some(window) => Raster::from(
            imageops::crop_imm(raster.as_image(), window.x, window.y, window.width, window.height)
                .to_image(),
        ),
        None => raster,
    };
    let scaled = resample(&raster, plan.scaled);
    drop(raster);

    let placed = match plan.placement {
        Placement::Exact => scaled,
        Placement::Pad { x, y } => {
            let mut canvas = RgbaImage::new(target.width, target.height);
            imageops::replace(&mut canvas, &scaled, x as i64, y as i64);
            canvas
        }
    };
    Ok(Raster::from(placed))
}

fn resample(raster: &Raster, (width, height): (u32, u32)) -> RgbaImage {
    if raster.dimensions() == (width, height) {
        return raster.as_image().clone();
    }
    if raster.is_opaque() {
        return imageops::resize(raster.as_image(), width, height, FILTER);
    }
    let premultiplied = premultiply(raster.as_image());
    let resized = imageops::resize(&premultiplied, width, height, FILTER);
    unpremultiply(&resized)
}

fn premultiply(image: &RgbaImage) -> Rgba32FImage {
    ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = a as f32 / 255.0;
        Rgba([
            r as f32 / 255.0 * alpha,
            g as f32 / 255.0 * alpha,
            b as f32 / 255.0 * alpha,
            alpha,
        ])
    })
}

fn unpremultiply(image: &Rgba32FImage) -> RgbaImage {
    let to_u8 = |v: f32| (v * 255.0).round().clamp(0.0, 255.0) as u8;
    ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = a.clamp(0.0, 1.0);
        let a8 = to_u8(alpha);
        if a8 == 0 {
            return Rgba([0, 0, 0, 0]);
        }
        Rgba([
            to_u8((r / alpha).min(1.0)),
            to_u8((g / alpha).min(1.0)),
            to_u8((b / alpha).min(1.0)),
            a8,
        ])
    })
}
