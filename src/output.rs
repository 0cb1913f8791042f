//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Every item leads with its positional index and the name it was supplied
//! under. Details (failure stage, reasons, sizes) follow as indented context
//! lines, so the output reads as an inventory of the batch.
//!
//! # Output Format
//!
//! ## Check
//!
//! ```text
//! Images
//! 001 beach.jpg (image/jpeg, 81.2 KiB)
//! 002 notes.heic (unrecognized, 1.4 MiB)
//!
//! 2 images, 1 recognized
//! ```
//!
//! ## Process
//!
//! ```text
//! Processing 2 images
//! [1/2] 002 notes.heic: failed
//! [2/2] 001 beach.jpg: done
//! ```
//!
//! ## Summary
//!
//! ```text
//! 1 succeeded, 1 failed, 0 cancelled (50.0%)
//!     002 notes.heic
//!         Failed at decoding: invalid image data: ...
//! Archive: processed_images.zip (1 entry, 60.2 KiB)
//! Manifest: processed_images.json
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions do no I/O.

use crate::process::{BatchEvent, BatchResult, BatchStatus, ItemStatus};
use crate::types::{SourceId, SourceItem};
use std::path::Path;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 0-based id as a 1-based, 3-digit zero-padded index.
fn format_index(id: SourceId) -> String {
    format!("{:0>3}", id.0 + 1)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn item_line(id: SourceId, filename: &str) -> String {
    format!("{} {}", format_index(id), filename)
}

fn count(n: usize, one: &str, many: &str) -> String {
    format!("{n} {}", if n == 1 { one } else { many })
}

/// Human-readable byte size.
fn format_size(bytes: usize) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KIB {
        format!("{bytes} B")
    } else if b < KIB * KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{:.1} MiB", b / (KIB * KIB))
    }
}

// ============================================================================
// Check
// ============================================================================

/// Format the ingestion listing shown by `check`.
pub fn format_check_output(items: &[SourceItem]) -> Vec<String> {
    let mut lines = vec!["Images".to_string()];
    for item in items {
        let format = item.mime_type().unwrap_or("unrecognized");
        lines.push(format!(
            "{} ({}, {})",
            item_line(item.id, &item.filename),
            format,
            format_size(item.bytes.len())
        ));
    }
    let recognized = items.iter().filter(|i| i.format.is_some()).count();
    lines.push(String::new());
    lines.push(format!(
        "{}, {} recognized",
        count(items.len(), "image", "images"),
        recognized
    ));
    lines
}

pub fn print_check_output(items: &[SourceItem]) {
    for line in format_check_output(items) {
        println!("{}", line);
    }
}

// ============================================================================
// Process
// ============================================================================

/// Format a single progress event as display lines.
///
/// Stage transitions are silent here; they are visible through `--verbose`
/// logging instead.
pub fn format_batch_event(event: &BatchEvent) -> Vec<String> {
    match event {
        BatchEvent::Started { total } => {
            vec![format!("Processing {}", count(*total, "image", "images"))]
        }
        BatchEvent::ItemStage { .. } => Vec::new(),
        BatchEvent::ItemFinished {
            id,
            filename,
            completed,
            total,
            status,
        } => {
            let outcome = match status {
                ItemStatus::Success => "done",
                ItemStatus::Failed { .. } => "failed",
                ItemStatus::Cancelled => "cancelled",
            };
            vec![format!(
                "[{}/{}] {}: {}",
                completed,
                total,
                item_line(*id, filename),
                outcome
            )]
        }
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Format batch totals followed by every failed item and its reason.
pub fn format_batch_summary(result: &BatchResult) -> Vec<String> {
    if result.status == BatchStatus::Empty {
        return vec!["No images found".to_string()];
    }
    let s = &result.summary;
    let mut lines = vec![format!(
        "{} succeeded, {} failed, {} cancelled ({:.1}%)",
        s.succeeded, s.failed, s.cancelled, s.success_rate
    )];
    for item in &result.items {
        if let ItemStatus::Failed { stage, reason } = &item.status {
            lines.push(format!("{}{}", indent(1), item_line(item.id, &item.filename)));
            lines.push(format!(
                "{}Failed at {}: {}",
                indent(2),
                stage,
                reason.message
            ));
        }
    }
    lines
}

/// Format where the archive and manifest were written.
pub fn format_written_files(
    archive_path: &Path,
    entries: usize,
    archive_bytes: usize,
    manifest_path: &Path,
) -> Vec<String> {
    vec![
        format!(
            "Archive: {} ({}, {})",
            archive_path.display(),
            count(entries, "entry", "entries"),
            format_size(archive_bytes)
        ),
        format!("Manifest: {}", manifest_path.display()),
    ]
}

pub fn print_batch_summary(result: &BatchResult) {
    for line in format_batch_summary(result) {
        println!("{}", line);
    }
}
