//! Parameter types for image operations.
//!
//! These describe *what* to do, not *how*. They sit between the batch
//! orchestrator (which decides what every item gets) and the engines in
//! [`codec`](super::codec), [`resize`](super::resize) and
//! [`segment`](super::segment).
//!
//! - [`OptimizationLevel`]: PNG optimization effort (0–6, default 2). Clamped on construction.
//! - [`ResizeMode`]: geometry used to reach the target size.
//! - [`TargetSize`]: validated output dimensions.

use serde::{Deserialize, Serialize};

/// PNG optimization effort (0-6).
///
/// `0` writes a fast, single-pass PNG. Higher levels try more row filters
/// and stronger deflate settings; the output is always lossless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationLevel(u8);

impl OptimizationLevel {
    pub const MAX: u8 = 6;

    pub fn new(value: u8) -> Self {
        Self(value.min(Self::MAX))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for OptimizationLevel {
    fn default() -> Self {
        Self(2)
    }
}

/// How a raster is mapped onto the target rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    /// Scale to cover the target, then center-crop the overflow.
    #[default]
    Fill,
    /// Scale to fit inside the target, centered on a transparent canvas.
    Fit,
    /// Resample to the exact target, ignoring aspect ratio.
    Stretch,
}

/// Output dimensions for a resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Clamp both sides to `max`.
    pub fn clamped(self, max: u32) -> Self {
        Self::new(self.width.min(max), self.height.min(max))
    }
}

impl std::fmt::Display for TargetSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
