//! Pure calculation functions for resize geometry.
//!
//! All functions here are pure and testable without any pixels.

use super::params::{ResizeMode, TargetSize};

/// Largest uniform scale factor that keeps `source` inside `target`.
fn fit_factor(source: (u32, u32), target: (u32, u32)) -> f64 {
    let sx = target.0 as f64 / source.0.max(1) as f64;
    let sy = target.1 as f64 / source.1.max(1) as f64;
    sx.min(sy)
}

fn scaled_side(side: u32, factor: f64) -> u32 {
    (side as f64 * factor).round() as u32
}

/// Largest centered window of `source` with the aspect ratio of `target`.
///
/// Cropping this window and resampling it to `target` gives the same framing
/// as scaling to cover and cropping afterwards, without ever holding more
/// than the source and the target in memory.
pub fn cover_crop_window(source: (u32, u32), target: (u32, u32)) -> CropWindow {
    let (src_w, src_h) = (source.0 as u64, source.1 as u64);
    let (tgt_w, tgt_h) = (target.0.max(1) as u64, target.1.max(1) as u64);
    let (width, height) = if src_w * tgt_h > src_h * tgt_w {
        let w = (src_h * tgt_w + tgt_h / 2) / tgt_h;
        (w.clamp(1, src_w) as u32, source.1)
    } else {
        let h = (src_w * tgt_h + tgt_w / 2) / tgt_w;
        (source.0, h.clamp(1, src_h) as u32)
    };
    CropWindow {
        x: center_offset(source.0, width),
        y: center_offset(source.1, height),
        width,
        height,
    }
}

/// Size of `source` scaled so it fits inside `target`, aspect preserved.
///
/// Never returns a zero side.
pub fn contain_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let factor = fit_factor(source, target);
    (
        scaled_side(source.0, factor).clamp(1, target.0),
        scaled_side(source.1, factor).clamp(1, target.1),
    )
}

/// Offset that centers a span of `inner` inside a span of `outer`.
///
/// Works in both directions: for crops `inner` is the window and `outer` the
/// scaled image; for padding it is the other way round.
pub fn center_offset(outer: u32, inner: u32) -> u32 {
    outer.saturating_sub(inner) / 2
}

/// Region of the source kept before resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// How the resampled image lands in the final canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The resampled image already has the target size.
    Exact,
    /// Paste the resampled image at `(x, y)` of a transparent target canvas.
    Pad { x: u32, y: u32 },
}

/// A resize broken into an optional source crop, a resample to `scaled`,
/// and a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePlan {
    pub crop: Option<CropWindow>,
    pub scaled: (u32, u32),
    pub placement: Placement,
}

/// Plan the crop, resample and placement for `mode`.
pub fn plan_resize(source: (u32, u32), target: TargetSize, mode: ResizeMode) -> ResizePlan {
    let tgt = (target.width, target.height);
    match mode {
        ResizeMode::Stretch => ResizePlan {
            crop: None,
            scaled: tgt,
            placement: Placement::Exact,
        },
        ResizeMode::Fill => {
            let window = cover_crop_window(source, tgt);
            let crop = (window.width, window.height) != source;
            ResizePlan {
                crop: crop.then_some(window),
                scaled: tgt,
                placement: Placement::Exact,
            }
        }
        ResizeMode::Fit => {
            let scaled = contain_dimensions(source, tgt);
            let placement = if scaled == tgt {
                Placement::Exact
            } else {
                Placement::Pad {
                    x: center_offset(tgt.0, scaled.0),
                    y: center_offset(tgt.1, scaled.1),
                }
            };
            ResizePlan {
                crop: None,
                scaled,
                placement,
            }
        }
    }
}
