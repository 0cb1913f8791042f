//! Image processing: pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image` (JPEG, PNG, GIF, WebP, BMP, TIFF, ICO, TGA, PNM) |
//! | **Segment** | [`BorderSegmenter`] behind the [`Segmenter`] trait |
//! | **Resize** | Catmull-Rom in premultiplied alpha |
//! | **Encode → PNG** | `image` PNG encoder + `oxipng` |
//!
//! The module is split into:
//! - **Raster**: the RGBA buffer every stage hands to the next
//! - **Calculations**: pure functions for resize geometry (unit testable)
//! - **Parameters**: data describing operations (levels, modes, sizes)
//! - **Codec / Resize / Segment**: the engines themselves

mod calculations;
pub mod codec;
mod params;
mod raster;
pub mod resize;
pub mod segment;

pub use codec::{DecodeError, DecodeLimits, EncodeError, decode, encode_png, sniff_format};
pub use params::{OptimizationLevel, ResizeMode, TargetSize};
pub use raster::Raster;
pub use resize::{ResizeError, resize};
pub use segment::{
    AlphaMask, BackgroundOutcome, BorderSegmenter, SegmentationParams, Segmenter,
    remove_background,
};
