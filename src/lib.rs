//! # pngbatch
//!
//! Batch image pipeline: take a pile of uploaded images (loose files or ZIP
//! archives), optionally cut out each image's background, optionally resize
//! it, re-encode everything as optimized PNG and hand back a single ZIP plus
//! a JSON manifest describing what happened to every input.
//!
//! # Architecture
//!
//! ```text
//! (filename, bytes)…
//!     │ ingest      ZIPs expanded in place, ids assigned in input order
//!     ▼
//! SourceItem…
//!     │ process     bounded worker pool, one item per worker:
//!     │               decode → remove background → resize → encode PNG
//!     ▼
//! BatchResult       input order, every item Success | Failed | Cancelled
//!     │ package
//!     ▼
//! ZIP of <stem>.png + manifest.json
//! ```
//!
//! Errors come in two sizes. **Batch-fatal** errors (bad options, corrupt or
//! unsafe archives) abort before any work is recorded and surface as
//! [`process::BatchError`]. **Item-fatal** errors (undecodable input, bad
//! geometry, timeouts, panics) are confined to that item's status; the rest
//! of the batch carries on and the archive holds whatever succeeded.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`ingest`] | Flattens caller input into ordered [`types::SourceItem`]s |
//! | [`archive`] | ZIP extraction (with traversal, bomb and nesting guards) and output packaging |
//! | [`imaging`] | Pure-Rust pixel work: decode, segmentation, resize, PNG encode |
//! | [`process`] | Batch orchestrator: worker pool, per-item state machine, cancellation, timeouts |
//! | [`request`] | One request end to end: validate, ingest, process, package |
//! | [`options`] | Per-request options (`removeBackground`, `resize`, `width`, `height`) |
//! | [`config`] | Engine settings file (`pngbatch.toml`): limits, workers, tuning |
//! | [`manifest`] | JSON report of every item's outcome |
//! | [`naming`] | Output filename rules and collision suffixes |
//! | [`types`] | Types shared across stages |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Background Removal Is Best Effort
//!
//! Segmentation sits behind the [`imaging::Segmenter`] trait. The stock
//! [`imaging::BorderSegmenter`] is a color heuristic with no model files.
//! When a segmenter is not confident it returns nothing and the image passes
//! through unchanged: a missed cut-out is a cosmetic problem, a failed item
//! is not.
//!
//! ## Lossless Output
//!
//! Output is always 8-bit RGBA PNG. Optimization tunes filters and deflate
//! effort and recompresses with oxipng, but never reduces color type or bit
//! depth, so re-encoding a decoded PNG reproduces its pixels exactly.
//!
//! ## Deterministic Archives
//!
//! Archive entries carry fixed timestamps and permissions and appear in
//! input order, so the same batch always produces the same bytes.

pub mod archive;
pub mod config;
pub mod imaging;
pub mod ingest;
pub mod manifest;
pub mod naming;
pub mod options;
pub mod output;
pub mod process;
pub mod request;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
