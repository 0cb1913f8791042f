//! ZIP ingestion and output packaging.
//!
//! ## Extraction
//!
//! [`extract_images`] walks entries in archive order and keeps the ones
//! whose extension names an image format. Along the way it enforces:
//!
//! - **Entry ceiling**: archives with more than `max_entries` entries are
//!   rejected before any entry is read.
//! - **Path safety**: any entry whose path would resolve outside the
//!   extraction root (`../x`, `/etc/x`, `C:\x`) rejects the whole archive.
//! - **No nesting**: a ZIP inside a ZIP is rejected.
//! - **Size ceiling**: entries inflating past `max_entry_bytes` are rejected.
//!
//! Directories, non-image entries, `__MACOSX/` resource forks and `._*`
//! AppleDouble files are skipped. An image entry that fails to inflate or
//! fails its checksum is kept with an empty payload, so it is reported as a
//! failed item rather than lost.
//!
//! ## Packaging
//!
//! [`build_archive`] writes entries in the given order with fixed timestamps
//! and permissions, so identical input always yields identical bytes.

use crate::naming::{self, NameAllocator};
use std::io::{Cursor, Read, Write};
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("corrupt ZIP archive: {0}")]
    Corrupt(String),
    #[error("entry '{entry}' escapes the archive root")]
    PathTraversal { entry: String },
    #[error("archive has {count} entries, over the limit of {limit}")]
    TooManyEntries { count: usize, limit: usize },
    #[error("entry '{entry}' inflates past {limit} bytes")]
    EntryTooLarge { entry: String, limit: u64 },
    #[error("entry '{entry}' is a nested archive")]
    NestedArchive { entry: String },
    #[error("failed to write archive: {0}")]
    Write(#[from] zip::result::ZipError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ceilings applied while extracting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLimits {
    pub max_entries: usize,
    pub max_entry_bytes: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_entry_bytes: 100 * 1024 * 1024,
        }
    }
}

/// Extensions with a compiled-in decoder.
pub const DECODABLE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff", "ico", "tga", "pnm", "ppm",
    "pgm", "pbm",
];

/// Image extensions accepted for ingestion but without a decoder.
///
/// They are still extracted so the manifest can report them as failed
/// instead of silently dropping them.
pub const UNDECODABLE_EXTENSIONS: &[&str] = &[
    "heic", "heif", "avif", "psd", "svg", "eps", "ai", "raw", "cr2", "nef", "arw", "dng",
];

/// True when the name carries an image extension (decodable or not).
pub fn is_image_name(name: &str) -> bool {
    naming::extension(name).is_some_and(|ext| {
        DECODABLE_EXTENSIONS.contains(&ext.as_str()) || UNDECODABLE_EXTENSIONS.contains(&ext.as_str())
    })
}

/// True when `bytes` start with a ZIP local-file, empty-archive or spanning signature.
pub fn is_zip(bytes: &[u8]) -> bool {
    [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"]
        .iter()
        .any(|sig| bytes.starts_with(*sig))
}

/// An image pulled out of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry path inside the archive.
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Reject entry paths that would resolve outside the extraction root.
fn check_entry_path(name: &str) -> Result<(), ArchiveError> {
    let traversal = || ArchiveError::PathTraversal {
        entry: name.to_string(),
    };
    let bytes = name.as_bytes();
    let has_drive = bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic();
    if name.starts_with(['/', '\\']) || has_drive {
        return Err(traversal());
    }
    let mut depth: usize = 0;
    for component in name.split(['/', '\\']) {
        match component {
            "" | "." => {}
            ".." => depth = depth.checked_sub(1).ok_or_else(traversal)?,
            _ => depth += 1,
        }
    }
    Ok(())
}

fn is_resource_fork(name: &str) -> bool {
    name.starts_with("__MACOSX/") || naming::base_name(name).starts_with("._")
}

/// Extract image entries from a ZIP, in archive order.
pub fn extract_images(
    zip_bytes: &[u8],
    limits: &ArchiveLimits,
) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(zip_bytes))
        .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;

    if archive.len() > limits.max_entries {
        return Err(ArchiveError::TooManyEntries {
            count: archive.len(),
            limit: limits.max_entries,
        });
    }

    let mut images = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
        let name = entry.name().to_string();

        check_entry_path(&name)?;
        if entry.is_dir() || is_resource_fork(&name) {
            continue;
        }
        if naming::extension(&name).as_deref() == Some("zip") {
            return Err(ArchiveError::NestedArchive { entry: name });
        }
        if !is_image_name(&name) {
            tracing::debug!(entry = %name, "skipping non-image entry");
            continue;
        }
        if entry.size() > limits.max_entry_bytes {
            return Err(ArchiveError::EntryTooLarge {
                entry: name,
                limit: limits.max_entry_bytes,
            });
        }

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        if let Err(e) = entry
            .by_ref()
            .take(limits.max_entry_bytes + 1)
            .read_to_end(&mut bytes)
        {
            // Kept with no payload so the item fails at decode and shows up
            // in the manifest.
            tracing::warn!(entry = %name, error = %e, "unreadable entry");
            images.push(ArchiveEntry {
                name,
                bytes: Vec::new(),
            });
            continue;
        }
        // Declared sizes can lie; the bounded read cannot.
        if bytes.len() as u64 > limits.max_entry_bytes {
            return Err(ArchiveError::EntryTooLarge {
                entry: name,
                limit: limits.max_entry_bytes,
            });
        }
        if is_zip(&bytes) {
            return Err(ArchiveError::NestedArchive { entry: name });
        }
        images.push(ArchiveEntry { name, bytes });
    }
    Ok(images)
}

/// A finished output archive and the names assigned to its entries.
#[derive(Debug, Clone)]
pub struct BuiltArchive {
    pub bytes: Vec<u8>,
    /// Entry names in input order, after de-duplication.
    pub names: Vec<String>,
}

/// Write `(filename, bytes)` pairs into a ZIP, de-duplicating names.
pub fn build_archive<'a>(
    entries: impl IntoIterator<Item = (&'a str, &'a [u8])>,
) -> Result<BuiltArchive, ArchiveError> {
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut allocator = NameAllocator::new();
    let mut names = Vec::new();
    for (filename, bytes) in entries {
        let name = allocator.allocate(filename);
        writer.start_file(name.as_str(), options)?;
        writer.write_all(bytes)?;
        names.push(name);
    }
    let bytes = writer.finish()?.into_inner();
    Ok(BuiltArchive { bytes, names })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{gradient_raster, png_bytes, zip_bytes};

    fn limits() -> ArchiveLimits {
        ArchiveLimits::default()
    }

    #[test]
    fn extracts_images_in_archive_order() {
        let png = png_bytes(&gradient_raster(4, 4));
        let zip = zip_bytes(&[
            ("b.png", png.as_slice()),
            ("notes.txt", b"hello".as_slice()),
            ("dir/a.PNG", png.as_slice()),
        ]);
        let entries = extract_images(&zip, &limits()).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["b.png", "dir/a.PNG"]);
        assert_eq!(entries[0].bytes, png);
    }

    #[test]
    fn skips_directories_and_resource_forks() {
        let png = png_bytes(&gradient_raster(4, 4));
        let zip = zip_bytes(&[
            ("photos/", b"".as_slice()),
            ("__MACOSX/photos/._a.png", b"junk".as_slice()),
            ("photos/._b.png", b"junk".as_slice()),
            ("photos/a.png", png.as_slice()),
        ]);
        let entries = extract_images(&zip, &limits()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "photos/a.png");
    }

    #[test]
    fn corrupt_entry_is_kept_for_reporting() {
        let good = png_bytes(&gradient_raster(4, 4));
        let bad = png_bytes(&gradient_raster(6, 6));
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = FileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, bytes) in [("good.png", &good), ("bad.png", &bad)] {
            writer.start_file(name, stored).unwrap();
            writer.write_all(bytes).unwrap();
        }
        let mut zip = writer.finish().unwrap().into_inner();
        let offset = zip.windows(bad.len()).position(|w| w == bad.as_slice()).unwrap();
        zip[offset + bad.len() / 2] ^= 0xff;

        let entries = extract_images(&zip, &limits()).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["good.png", "bad.png"]);
        assert_eq!(entries[0].bytes, good);
        assert!(entries[1].bytes.is_empty());
    }

    #[test]
    fn rejects_path_traversal() {
        let png = png_bytes(&gradient_raster(4, 4));
        let zip = zip_bytes(&[
            ("ok.png", png.as_slice()),
            ("../../etc/passwd", b"root:x:0:0".as_slice()),
        ]);
        let err = extract_images(&zip, &limits()).unwrap_err();
        assert!(
            matches!(&err, ArchiveError::PathTraversal { entry } if entry == "../../etc/passwd"),
            "{err:?}"
        );
    }

    #[test]
    fn entry_path_rules() {
        assert!(check_entry_path("a/b/c.png").is_ok());
        assert!(check_entry_path("a/../b.png").is_ok());
        assert!(check_entry_path("./a.png").is_ok());
        assert!(check_entry_path("../a.png").is_err());
        assert!(check_entry_path("a/../../b.png").is_err());
        assert!(check_entry_path("/etc/passwd").is_err());
        assert!(check_entry_path("..\\..\\win.ini").is_err());
        assert!(check_entry_path("C:\\boot.ini").is_err());
    }

    #[test]
    fn rejects_nested_zip_by_extension() {
        let inner = zip_bytes(&[("x.png", b"x".as_slice())]);
        let zip = zip_bytes(&[("inner.zip", inner.as_slice())]);
        assert!(matches!(
            extract_images(&zip, &limits()),
            Err(ArchiveError::NestedArchive { .. })
        ));
    }

    #[test]
    fn rejects_nested_zip_by_signature() {
        let inner = zip_bytes(&[("x.png", b"x".as_slice())]);
        let zip = zip_bytes(&[("disguised.png", inner.as_slice())]);
        assert!(matches!(
            extract_images(&zip, &limits()),
            Err(ArchiveError::NestedArchive { entry }) if entry == "disguised.png"
        ));
    }

    #[test]
    fn rejects_too_many_entries() {
        let zip = zip_bytes(&[
            ("a.png", b"1".as_slice()),
            ("b.png", b"2".as_slice()),
            ("c.png", b"3".as_slice()),
        ]);
        let limits = ArchiveLimits {
            max_entries: 2,
            ..ArchiveLimits::default()
        };
        assert!(matches!(
            extract_images(&zip, &limits),
            Err(ArchiveError::TooManyEntries { count: 3, limit: 2 })
        ));
    }

    #[test]
    fn rejects_oversized_entry() {
        let zip = zip_bytes(&[("big.png", [0u8; 64].as_slice())]);
        let limits = ArchiveLimits {
            max_entry_bytes: 16,
            ..ArchiveLimits::default()
        };
        assert!(matches!(
            extract_images(&zip, &limits),
            Err(ArchiveError::EntryTooLarge { limit: 16, .. })
        ));
    }

    #[test]
    fn corrupt_archive_fails_whole() {
        let err = extract_images(b"PK\x03\x04 this is not really a zip", &limits()).unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupt(_)));
    }

    #[test]
    fn undecodable_formats_are_still_extracted() {
        let zip = zip_bytes(&[("phone.HEIC", b"not decodable here".as_slice())]);
        let entries = extract_images(&zip, &limits()).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn zip_signature_detection() {
        assert!(is_zip(&zip_bytes(&[("a.png", b"1".as_slice())])));
        assert!(is_zip(b"PK\x05\x06"));
        assert!(!is_zip(b"\x89PNG\r\n\x1a\n"));
        assert!(!is_zip(b"PK"));
    }

    #[test]
    fn build_archive_dedupes_and_round_trips() {
        let built = build_archive([
            ("a.png", b"one".as_slice()),
            ("a.png", b"two".as_slice()),
            ("b.png", b"three".as_slice()),
        ])
        .unwrap();
        assert_eq!(built.names, vec!["a.png", "a_1.png", "b.png"]);

        let entries = extract_images(&built.bytes, &limits()).unwrap();
        let pairs: Vec<(&str, &[u8])> = entries
            .iter()
            .map(|e| (e.name.as_str(), e.bytes.as_slice()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("a.png", b"one".as_slice()),
                ("a_1.png", b"two".as_slice()),
                ("b.png", b"three".as_slice())
            ]
        );
    }

    #[test]
    fn build_archive_is_deterministic() {
        let entries = [("x.png", b"pixels".as_slice()), ("y.png", b"more".as_slice())];
        let a = build_archive(entries).unwrap();
        let b = build_archive(entries).unwrap();
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn build_empty_archive() {
        let built = build_archive(std::iter::empty()).unwrap();
        assert!(built.names.is_empty());
        assert!(extract_images(&built.bytes, &limits()).unwrap().is_empty());
    }
}
