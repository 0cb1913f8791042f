//! Output filename rules.
//!
//! Every processed image is written as `<original-stem>.png`, flattened to
//! the archive root:
//! - `photos/2024/beach.JPG` → `beach.png`
//! - `C:\scans\receipt.tiff` → `receipt.png`
//! - `.png` (no stem) → `image.png`
//!
//! Collisions are resolved in input order by suffixing `_1`, `_2`, … to the
//! stem. Comparison is case-insensitive so archives extract cleanly on
//! case-insensitive filesystems.

use std::collections::HashSet;

const FALLBACK_STEM: &str = "image";

/// Final path component of a `/`- or `\`-separated name.
pub fn base_name(filename: &str) -> &str {
    filename.rsplit(['/', '\\']).next().unwrap_or(filename)
}

/// Lowercased extension of `filename`, if any.
pub fn extension(filename: &str) -> Option<String> {
    let base = base_name(filename);
    match base.rfind('.') {
        Some(0) | None => None,
        Some(dot) => Some(base[dot + 1..].to_ascii_lowercase()),
    }
}

/// Filename without directories or extension. Falls back to `image`.
pub fn file_stem(filename: &str) -> &str {
    let base = base_name(filename);
    let stem = match base.rfind('.') {
        Some(dot) => &base[..dot],
        None => base,
    };
    if stem.trim().is_empty() {
        FALLBACK_STEM
    } else {
        stem
    }
}

/// `<stem>.png` for a source filename.
pub fn output_name(filename: &str) -> String {
    format!("{}.png", file_stem(filename))
}

/// Assigns unique names in order, suffixing `_N` on collision.
#[derive(Debug, Default)]
pub struct NameAllocator {
    used: HashSet<String>,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `name` (of the form `stem.ext`), or the first free `stem_N.ext`.
    pub fn allocate(&mut self, name: &str) -> String {
        if self.used.insert(name.to_lowercase()) {
            return name.to_string();
        }
        let (stem, ext) = match name.rfind('.') {
            Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
            _ => (name, ""),
        };
        let mut n = 1;
        loop {
            let candidate = format!("{stem}_{n}{ext}");
            if self.used.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }
}
