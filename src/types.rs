//! Types shared between ingestion, the batch orchestrator and reporting.

use image::ImageFormat;
use serde::{Deserialize, Serialize};

/// Stable identity of one ingested image: its position in the flattened input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub usize);

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One image awaiting processing. Immutable once ingested.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceItem {
    pub id: SourceId,
    /// Name as supplied: a path on disk, or the entry path inside a ZIP.
    pub filename: String,
    pub bytes: Vec<u8>,
    /// Format sniffed from magic bytes, falling back to the extension.
    pub format: Option<ImageFormat>,
}

impl SourceItem {
    pub fn mime_type(&self) -> Option<&'static str> {
        self.format.map(|f| f.to_mime_type())
    }
}

/// Position of an item in its pipeline. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Queued,
    Decoding,
    Transforming,
    Encoding,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Queued => "queued",
            Stage::Decoding => "decoding",
            Stage::Transforming => "transforming",
            Stage::Encoding => "encoding",
            Stage::Done => "done",
        };
        f.write_str(s)
    }
}
