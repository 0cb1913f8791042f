//! Background segmentation.
//!
//! The [`Segmenter`] trait is the seam: anything that can turn a raster into
//! a foreground [`AlphaMask`] can be plugged into the batch pipeline.
//! [`remove_background`] applies the mask and owns the fail-open policy, so
//! individual segmenters only decide *whether* they are confident.
//!
//! The production implementation is [`BorderSegmenter`], a color heuristic
//! that needs no model files:
//!
//! 1. Build a small background palette from the colors on the image border.
//!    If the palette does not explain most of the border, give up.
//! 2. Measure every pixel's RGB distance to the nearest palette color.
//! 3. Flood-fill from the border through pixels that look like background,
//!    so background-colored regions enclosed by the subject stay opaque.
//! 4. Ramp alpha between `low_threshold` and `high_threshold` for reached
//!    pixels, then feather the mask with a small Gaussian blur.
//!
//! Applying a mask only ever lowers alpha (`min(existing, mask)`) and never
//! touches RGB, which makes the operation idempotent: the palette is built
//! from RGB alone, so a second pass computes the same mask.

use super::raster::Raster;
use image::imageops;
use image::{ImageBuffer, Luma};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Per-pixel foreground coverage, 0 = background, 255 = foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlphaMask {
    width: u32,
    height: u32,
    values: Vec<u8>,
}

impl AlphaMask {
    /// Returns `None` when `values.len() != width * height`.
    pub fn new(width: u32, height: u32, values: Vec<u8>) -> Option<Self> {
        (values.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            values,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.values[y as usize * self.width as usize + x as usize]
    }
}

/// A background segmentation algorithm.
pub trait Segmenter: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Compute a foreground mask, or `None` when no confident separation exists.
    fn segment(&self, raster: &Raster) -> Option<AlphaMask>;
}

/// What [`remove_background`] did to a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundOutcome {
    /// A mask was applied.
    Removed,
    /// The segmenter was not confident; the raster is returned unchanged.
    Kept,
}

/// Replace the alpha channel of `raster` with the segmenter's foreground mask.
///
/// Never fails: without a confident mask (or with a mask of the wrong size)
/// the raster comes back unchanged. Alpha the input already carried is kept
/// rather than forced opaque; inputs decoded without an alpha channel are
/// fully opaque, so for them the fallback is full opacity.
pub fn remove_background(
    segmenter: &dyn Segmenter,
    mut raster: Raster,
) -> (Raster, BackgroundOutcome) {
    let Some(mask) = segmenter.segment(&raster) else {
        tracing::warn!(
            segmenter = segmenter.name(),
            width = raster.width(),
            height = raster.height(),
            "no confident foreground mask, keeping image as-is"
        );
        return (raster, BackgroundOutcome::Kept);
    };
    if mask.dimensions() != raster.dimensions() {
        tracing::warn!(
            segmenter = segmenter.name(),
            mask = ?mask.dimensions(),
            raster = ?raster.dimensions(),
            "mask size mismatch, keeping image as-is"
        );
        return (raster, BackgroundOutcome::Kept);
    }

    for (px, &m) in raster.as_bytes_mut().chunks_exact_mut(4).zip(mask.values()) {
        px[3] = px[3].min(m);
    }
    (raster, BackgroundOutcome::Removed)
}

/// Tuning for [`BorderSegmenter`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SegmentationParams {
    /// Color distance at or below which a pixel is fully background.
    pub low_threshold: f32,
    /// Color distance at or above which a pixel is fully foreground.
    pub high_threshold: f32,
    /// Fraction of border pixels the background palette must explain (0-1).
    pub min_border_coverage: f32,
    /// Gaussian blur sigma applied to the mask, in pixels. 0 disables it.
    pub feather_radius: u32,
}

impl Default for SegmentationParams {
    fn default() -> Self {
        Self {
            low_threshold: 24.0,
            high_threshold: 64.0,
            min_border_coverage: 0.6,
            feather_radius: 1,
        }
    }
}

/// Palette entries kept from the border histogram.
const MAX_PALETTE: usize = 4;
/// Below this foreground fraction the mask is treated as degenerate.
const MIN_FOREGROUND_FRACTION: f64 = 0.001;

/// Border-color flood-fill segmenter. See the [module docs](self).
#[derive(Debug, Clone, Default)]
pub struct BorderSegmenter {
    params: SegmentationParams,
}

impl BorderSegmenter {
    pub fn new(params: SegmentationParams) -> Self {
        Self { params }
    }
}

type Rgb = [f32; 3];

fn rgb_of(px: &[u8]) -> Rgb {
    [px[0] as f32, px[1] as f32, px[2] as f32]
}

fn distance(a: Rgb, b: Rgb) -> f32 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    (dr * dr + dg * dg + db * db).sqrt()
}

fn nearest(palette: &[Rgb], c: Rgb) -> f32 {
    palette
        .iter()
        .map(|&p| distance(p, c))
        .fold(f32::INFINITY, f32::min)
}

/// Indices of the outer one-pixel ring, each visited once.
fn border_indices(width: usize, height: usize) -> Vec<usize> {
    let mut idx = Vec::with_capacity(2 * (width + height));
    for x in 0..width {
        idx.push(x);
        idx.push((height - 1) * width + x);
    }
    for y in 1..height - 1 {
        idx.push(y * width);
        idx.push(y * width + width - 1);
    }
    idx
}

/// Dominant border colors: the means of the most populated 5-bit-per-channel bins.
fn border_palette(pixels: &[u8], border: &[usize]) -> Vec<Rgb> {
    let mut bins: HashMap<u16, (u32, [f32; 3])> = HashMap::new();
    for &i in border {
        let px = &pixels[i * 4..i * 4 + 4];
        let key = ((px[0] as u16 >> 3) << 10) | ((px[1] as u16 >> 3) << 5) | (px[2] as u16 >> 3);
        let entry = bins.entry(key).or_insert((0, [0.0; 3]));
        entry.0 += 1;
        let c = rgb_of(px);
        for ch in 0..3 {
            entry.1[ch] += c[ch];
        }
    }
    let mut ranked: Vec<(u16, (u32, [f32; 3]))> = bins.into_iter().collect();
    // Key as tie-break keeps the palette independent of hash order.
    ranked.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .take(MAX_PALETTE)
        .map(|(_, (n, sum))| [sum[0] / n as f32, sum[1] / n as f32, sum[2] / n as f32])
        .collect()
}

impl BorderSegmenter {
    fn ramp(&self, d: f32) -> u8 {
        let SegmentationParams {
            low_threshold: low,
            high_threshold: high,
            ..
        } = self.params;
        if d <= low {
            0
        } else if d >= high {
            255
        } else {
            (((d - low) / (high - low)) * 255.0).round() as u8
        }
    }

    /// Soften the mask edge with a Gaussian blur of `feather_radius` sigma.
    fn feather(&self, mask: Vec<u8>, width: u32, height: u32) -> Vec<u8> {
        if self.params.feather_radius == 0 {
            return mask;
        }
        // Blurred in f32 so solid regions come back exactly 0 or 255.
        let plane: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::from_fn(width, height, |x, y| {
            Luma([mask[(y * width + x) as usize] as f32])
        });
        imageops::blur(&plane, self.params.feather_radius as f32)
            .into_raw()
            .into_iter()
            .map(|v| v.clamp(0.0, 255.0).round() as u8)
            .collect()
    }
}

impl Segmenter for BorderSegmenter {
    fn name(&self) -> &'static str {
        "border"
    }

    fn segment(&self, raster: &Raster) -> Option<AlphaMask> {
        let (w, h) = raster.dimensions();
        let (width, height) = (w as usize, h as usize);
        if width < 3 || height < 3 {
            return None;
        }
        let pixels = raster.as_bytes();
        let border = border_indices(width, height);
        let palette = border_palette(pixels, &border);

        let covered_radius = (self.params.low_threshold + self.params.high_threshold) / 2.0;
        let covered = border
            .iter()
            .filter(|&&i| nearest(&palette, rgb_of(&pixels[i * 4..i * 4 + 4])) <= covered_radius)
            .count();
        let coverage = covered as f32 / border.len() as f32;
        if coverage < self.params.min_border_coverage {
            tracing::debug!(coverage, "border palette does not explain the border");
            return None;
        }

        let dist: Vec<f32> = pixels
            .chunks_exact(4)
            .map(|px| nearest(&palette, rgb_of(px)))
            .collect();
        let high = self.params.high_threshold;

        // Flood-fill background from the border through background-like pixels.
        let mut reached = vec![false; dist.len()];
        let mut queue: VecDeque<usize> = VecDeque::new();
        for &i in &border {
            if dist[i] < high && !reached[i] {
                reached[i] = true;
                queue.push_back(i);
            }
        }
        while let Some(i) = queue.pop_front() {
            let (x, y) = (i % width, i / width);
            let mut visit = |j: usize| {
                if !reached[j] && dist[j] < high {
                    reached[j] = true;
                    queue.push_back(j);
                }
            };
            if x > 0 {
                visit(i - 1);
            }
            if x + 1 < width {
                visit(i + 1);
            }
            if y > 0 {
                visit(i - width);
            }
            if y + 1 < height {
                visit(i + width);
            }
        }

        let mask: Vec<u8> = dist
            .iter()
            .zip(&reached)
            .map(|(&d, &bg)| if bg { self.ramp(d) } else { 255 })
            .collect();
        let mask = self.feather(mask, w, h);

        let foreground = mask.iter().filter(|&&m| m >= 128).count();
        if (foreground as f64) < MIN_FOREGROUND_FRACTION * mask.len() as f64 {
            tracing::debug!(foreground, "mask is all background");
            return None;
        }

        AlphaMask::new(w, h, mask)
    }
}
