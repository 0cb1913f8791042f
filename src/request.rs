//! One request in, one archive and manifest out.
//!
//! ```text
//! (filename, bytes)…  ──ingest──▶  SourceItem…  ──run──▶  BatchResult
//!                                                              │
//!                                   archive + manifest  ◀──package
//! ```
//!
//! Options are validated before anything is read, and archives are expanded
//! before any item is dispatched, so every [`BatchError`] means nothing was
//! processed. Item failures only show up in the manifest.

use crate::archive::BuiltArchive;
use crate::ingest;
use crate::manifest::Manifest;
use crate::options::RawOptions;
use crate::process::{BatchError, BatchProcessor, BatchResult};

/// Caller input for one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    /// Files in upload order. ZIPs are expanded in place.
    pub inputs: Vec<(String, Vec<u8>)>,
    pub options: RawOptions,
}

/// Everything produced for one batch.
#[derive(Debug, Clone)]
pub struct BatchResponse {
    pub result: BatchResult,
    pub archive: BuiltArchive,
    pub manifest: Manifest,
}

impl BatchProcessor<'_> {
    /// Validate, ingest, process and package one request.
    ///
    /// An empty batch is not an error here: it yields an empty archive and a
    /// result whose status is `Empty`, and the caller decides whether that
    /// is fatal.
    pub fn handle(self, request: BatchRequest) -> Result<BatchResponse, BatchError> {
        let settings = self.settings();
        let options = request.options.resolve(settings.limits.max_dimension)?;
        let items = ingest::ingest(request.inputs, &settings.archive_limits())?;
        let result = self.run(items, &options)?;
        let archive = result.package()?;
        let manifest = Manifest::new(&result, &archive);
        Ok(BatchResponse {
            result,
            archive,
            manifest,
        })
    }
}
