//! Flatten caller input into the ordered list of images to process.
//!
//! Input is a sequence of `(filename, bytes)` pairs. Any pair whose bytes
//! carry a ZIP signature is expanded in place into its image entries;
//! everything else passes through untouched, even when it is not an
//! image, so the decode stage can report it per item.
//!
//! ```text
//! [a.jpg, photos.zip{x.png, y.png}, b.webp]
//!        ↓
//! [#0 a.jpg, #1 x.png, #2 y.png, #3 b.webp]
//! ```
//!
//! Archive problems (corrupt directory, path traversal, entry ceiling,
//! nested archives) fail the whole ingestion.

use crate::archive::{self, ArchiveError, ArchiveLimits};
use crate::imaging::sniff_format;
use crate::naming;
use crate::types::{SourceId, SourceItem};
use image::ImageFormat;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("archive '{archive}': {source}")]
    Archive {
        archive: String,
        #[source]
        source: ArchiveError,
    },
}

/// Expand archives and assign sequential ids in input order.
pub fn ingest<I, S>(inputs: I, limits: &ArchiveLimits) -> Result<Vec<SourceItem>, IngestionError>
where
    I: IntoIterator<Item = (S, Vec<u8>)>,
    S: Into<String>,
{
    let mut items = Vec::new();
    for (filename, bytes) in inputs {
        let filename = filename.into();
        if archive::is_zip(&bytes) {
            let entries = archive::extract_images(&bytes, limits).map_err(|source| {
                IngestionError::Archive {
                    archive: filename.clone(),
                    source,
                }
            })?;
            tracing::debug!(archive = %filename, images = entries.len(), "expanded archive");
            for entry in entries {
                push_item(&mut items, entry.name, entry.bytes);
            }
        } else {
            push_item(&mut items, filename, bytes);
        }
    }
    Ok(items)
}

fn push_item(items: &mut Vec<SourceItem>, filename: String, bytes: Vec<u8>) {
    let format = detect_format(&filename, &bytes);
    items.push(SourceItem {
        id: SourceId(items.len()),
        filename,
        bytes,
        format,
    });
}

/// Magic bytes first, then the extension.
fn detect_format(filename: &str, bytes: &[u8]) -> Option<ImageFormat> {
    sniff_format(bytes).or_else(|| naming::extension(filename).and_then(ImageFormat::from_extension))
}
