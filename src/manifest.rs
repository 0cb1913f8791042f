//! Machine-readable batch report written next to the output archive.
//!
//! ```json
//! {
//!   "status": "completed",
//!   "summary": { "total": 2, "succeeded": 1, "failed": 1, "cancelled": 0, "success_rate": 50.0 },
//!   "items": [
//!     {
//!       "id": 0,
//!       "filename": "photos/beach.jpg",
//!       "status": "success",
//!       "operations": { "background_removed": true, "resized_to": "400x400" },
//!       "output": {
//!         "name": "beach.png",
//!         "width": 400,
//!         "height": 400,
//!         "stats": { "original_size": 81234, "final_size": 60211, "compression_ratio": 25.9 },
//!         "sha256": "…"
//!       }
//!     },
//!     {
//!       "id": 1,
//!       "filename": "notes.heic",
//!       "status": "failed",
//!       "stage": "decoding",
//!       "reason": { "kind": "invalid_format", "message": "…" },
//!       "operations": { "background_removed": false, "resized_to": null }
//!     }
//!   ]
//! }
//! ```
//!
//! Items appear in input order. `output.name` is the entry name inside the
//! archive, after de-duplication.

use crate::archive::BuiltArchive;
use crate::process::{
    AppliedOperations, BatchResult, BatchStatus, BatchSummary, ItemStats, ItemStatus,
};
use crate::types::SourceId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub status: BatchStatus,
    pub summary: BatchSummary,
    pub items: Vec<ManifestItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestItem {
    pub id: SourceId,
    pub filename: String,
    #[serde(flatten)]
    pub status: ItemStatus,
    pub operations: AppliedOperations,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ManifestOutput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestOutput {
    /// Entry name inside the output archive.
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub stats: ItemStats,
    pub sha256: String,
}

impl Manifest {
    /// Describe `result`, naming outputs as they were stored in `archive`.
    pub fn new(result: &BatchResult, archive: &BuiltArchive) -> Self {
        let mut names = archive.names.iter();
        let items = result
            .items
            .iter()
            .map(|item| {
                let output = item.output.as_ref().map(|out| ManifestOutput {
                    name: names.next().cloned().unwrap_or_default(),
                    width: out.width,
                    height: out.height,
                    stats: out.stats.clone(),
                    sha256: out.sha256.clone(),
                });
                ManifestItem {
                    id: item.id,
                    filename: item.filename.clone(),
                    status: item.status.clone(),
                    operations: item.operations.clone(),
                    output,
                }
            })
            .collect();
        Self {
            status: result.status,
            summary: result.summary.clone(),
            items,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
