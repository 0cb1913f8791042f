//! Batch orchestration.
//!
//! Drives every ingested image through the same pipeline and collects the
//! outcome of each one:
//!
//! ```text
//! Queued → Decoding → Transforming → Encoding → Done(Success)
//!            └────────────┴────────────┴──────→ Done(Failed { stage, reason })
//! ```
//!
//! Transforming applies background removal, then resize, in that order, so
//! resize resamples the already-masked alpha.
//!
//! ## Failure Semantics
//!
//! Item failures never abort the batch. Decode, resize and encode errors,
//! timeouts and panics are all caught here and recorded as
//! [`ItemStatus::Failed`] with the stage they happened in. Background
//! removal cannot fail an item: an unconfident segmenter leaves the raster
//! unchanged.
//!
//! ## Parallel Processing
//!
//! Items run on a dedicated [rayon](https://docs.rs/rayon) pool sized by
//! [`effective_workers`](crate::config::effective_workers), one item per
//! worker from decode to encode. Completion order is arbitrary, but results
//! are collected in input order.
//!
//! ## Cancellation and Timeouts
//!
//! Raising the [`CancelToken`] stops workers from starting new items;
//! in-flight items run to their terminal status and the rest are marked
//! [`ItemStatus::Cancelled`]. Each item has a wall-clock budget checked at
//! every stage boundary; an item over budget is failed with a timeout and
//! its raster discarded.

use crate::archive::{self, ArchiveError, BuiltArchive};
use crate::config::{ConfigError, Settings, effective_workers};
use crate::imaging::{
    BackgroundOutcome, BorderSegmenter, DecodeError, DecodeLimits, EncodeError,
    OptimizationLevel, ResizeError, ResizeMode, Segmenter, TargetSize, decode, encode_png,
    remove_background, resize,
};
use crate::ingest::IngestionError;
use crate::naming;
use crate::options::ProcessingOptions;
use crate::types::{SourceId, SourceItem, Stage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Batch-fatal errors. Nothing is processed when one of these occurs.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("invalid options: {0}")]
    Config(#[from] ConfigError),
    #[error("ingestion failed: {0}")]
    Ingestion(#[from] IngestionError),
    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("failed to package output: {0}")]
    Package(#[from] ArchiveError),
}

/// Cooperative cancellation signal shared between a batch and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Machine-readable category of an item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidFormat,
    Truncated,
    TooLarge,
    InvalidDimensions,
    Encode,
    Timeout,
    Internal,
}

/// Why an item failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureReason {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn timeout(budget: Duration) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("exceeded the {}s processing budget", budget.as_secs_f32()),
        )
    }

    fn panic(payload: &(dyn Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Self::new(FailureKind::Internal, format!("internal fault: {detail}"))
    }
}

impl From<DecodeError> for FailureReason {
    fn from(err: DecodeError) -> Self {
        let kind = match err {
            DecodeError::InvalidFormat(_) => FailureKind::InvalidFormat,
            DecodeError::Truncated(_) => FailureKind::Truncated,
            DecodeError::TooLarge { .. } => FailureKind::TooLarge,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<ResizeError> for FailureReason {
    fn from(err: ResizeError) -> Self {
        Self::new(FailureKind::InvalidDimensions, err.to_string())
    }
}

impl From<EncodeError> for FailureReason {
    fn from(err: EncodeError) -> Self {
        Self::new(FailureKind::Encode, err.to_string())
    }
}

/// Terminal status of one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Success,
    Failed { stage: Stage, reason: FailureReason },
    Cancelled,
}

/// Operations actually applied to an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedOperations {
    /// False when removal was requested but the segmenter was not confident.
    pub background_removed: bool,
    /// Output size as `WxH`, when resized.
    pub resized_to: Option<String>,
}

/// Size accounting for a successful item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStats {
    pub original_size: usize,
    pub final_size: usize,
    /// Percent saved relative to the input, one decimal. Negative when the PNG grew.
    pub compression_ratio: f64,
}

impl ItemStats {
    pub fn new(original_size: usize, final_size: usize) -> Self {
        let compression_ratio = if original_size == 0 {
            0.0
        } else {
            round1((original_size as f64 - final_size as f64) / original_size as f64 * 100.0)
        };
        Self {
            original_size,
            final_size,
            compression_ratio,
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Encoded output of a successful item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutput {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stats: ItemStats,
    /// Hex SHA-256 of `png`.
    pub sha256: String,
}

/// One item after the pipeline. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedItem {
    pub id: SourceId,
    pub filename: String,
    pub operations: AppliedOperations,
    pub status: ItemStatus,
    /// Present exactly when `status` is [`ItemStatus::Success`].
    pub output: Option<ItemOutput>,
}

impl ProcessedItem {
    fn succeeded(item: &SourceItem, operations: AppliedOperations, output: ItemOutput) -> Self {
        Self {
            id: item.id,
            filename: item.filename.clone(),
            operations,
            status: ItemStatus::Success,
            output: Some(output),
        }
    }

    fn failed(item: &SourceItem, stage: Stage, reason: FailureReason) -> Self {
        Self {
            id: item.id,
            filename: item.filename.clone(),
            operations: AppliedOperations::default(),
            status: ItemStatus::Failed { stage, reason },
            output: None,
        }
    }

    fn cancelled(item: &SourceItem) -> Self {
        Self {
            id: item.id,
            filename: item.filename.clone(),
            operations: AppliedOperations::default(),
            status: ItemStatus::Cancelled,
            output: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ItemStatus::Success
    }
}

/// Counts over a finished batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Percent of items that succeeded, one decimal. `0.0` for an empty batch.
    pub success_rate: f64,
}

impl BatchSummary {
    pub fn from_items(items: &[ProcessedItem]) -> Self {
        let mut summary = Self {
            total: items.len(),
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            success_rate: 0.0,
        };
        for item in items {
            match item.status {
                ItemStatus::Success => summary.succeeded += 1,
                ItemStatus::Failed { .. } => summary.failed += 1,
                ItemStatus::Cancelled => summary.cancelled += 1,
            }
        }
        if summary.total > 0 {
            summary.success_rate = round1(summary.succeeded as f64 / summary.total as f64 * 100.0);
        }
        summary
    }
}

/// How the batch as a whole ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every item reached a terminal status.
    Completed,
    /// No images were found after ingestion.
    Empty,
    /// Cancelled before every item started.
    Cancelled,
}

/// Outcome of a batch, in input order.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub status: BatchStatus,
    pub items: Vec<ProcessedItem>,
    pub summary: BatchSummary,
}

impl BatchResult {
    fn from_items(items: Vec<ProcessedItem>) -> Self {
        let summary = BatchSummary::from_items(&items);
        let status = if items.is_empty() {
            BatchStatus::Empty
        } else if summary.cancelled > 0 {
            BatchStatus::Cancelled
        } else {
            BatchStatus::Completed
        };
        Self {
            status,
            items,
            summary,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status == BatchStatus::Empty
    }

    /// Successful items with their output, in input order.
    pub fn successes(&self) -> impl Iterator<Item = (&ProcessedItem, &ItemOutput)> {
        self.items
            .iter()
            .filter_map(|item| item.output.as_ref().map(|output| (item, output)))
    }

    /// Package every successful output as `<stem>.png` into one ZIP.
    ///
    /// Failed and cancelled items are left out; `names` lines up with
    /// [`successes`](Self::successes).
    pub fn package(&self) -> Result<BuiltArchive, ArchiveError> {
        let entries: Vec<(String, &[u8])> = self
            .successes()
            .map(|(item, output)| (naming::output_name(&item.filename), output.png.as_slice()))
            .collect();
        archive::build_archive(entries.iter().map(|(name, png)| (name.as_str(), *png)))
    }
}

/// Progress notifications sent while a batch runs.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Started {
        total: usize,
    },
    ItemStage {
        id: SourceId,
        filename: String,
        stage: Stage,
    },
    ItemFinished {
        id: SourceId,
        filename: String,
        /// Items finished so far, including this one.
        completed: usize,
        total: usize,
        status: ItemStatus,
    },
}

/// Per-batch pipeline settings resolved from [`Settings`].
struct Pipeline<'a> {
    segmenter: &'a dyn Segmenter,
    decode_limits: DecodeLimits,
    max_dimension: u32,
    resize_mode: ResizeMode,
    optimization: OptimizationLevel,
    item_timeout: Duration,
    options: ProcessingOptions,
    events: Option<&'a Sender<BatchEvent>>,
}

impl Pipeline<'_> {
    fn emit(&self, event: BatchEvent) {
        if let Some(tx) = self.events {
            // A closed receiver only means nobody is watching progress.
            let _ = tx.send(event);
        }
    }

    fn enter(&self, item: &SourceItem, stage: Stage, current: &Cell<Stage>) {
        current.set(stage);
        tracing::debug!(id = %item.id, file = %item.filename, %stage, "stage");
        self.emit(BatchEvent::ItemStage {
            id: item.id,
            filename: item.filename.clone(),
            stage,
        });
    }

    fn check_deadline(&self, started: Instant) -> Result<(), FailureReason> {
        if started.elapsed() > self.item_timeout {
            Err(FailureReason::timeout(self.item_timeout))
        } else {
            Ok(())
        }
    }

    /// Decode, transform and encode one item. `current` tracks the stage for failure reports.
    fn execute(
        &self,
        item: &SourceItem,
        current: &Cell<Stage>,
    ) -> Result<(AppliedOperations, ItemOutput), FailureReason> {
        let started = Instant::now();
        let mut operations = AppliedOperations::default();

        self.enter(item, Stage::Decoding, current);
        let mut raster = decode(&item.bytes, &self.decode_limits)?;
        self.check_deadline(started)?;

        self.enter(item, Stage::Transforming, current);
        if self.options.remove_background {
            let (masked, outcome) = remove_background(self.segmenter, raster);
            raster = masked;
            operations.background_removed = outcome == BackgroundOutcome::Removed;
            self.check_deadline(started)?;
        }
        if let Some(target) = self.options.resize {
            raster = resize(raster, target, self.resize_mode, self.max_dimension)?;
            operations.resized_to =
                Some(TargetSize::new(raster.width(), raster.height()).to_string());
            self.check_deadline(started)?;
        }

        self.enter(item, Stage::Encoding, current);
        let png = encode_png(&raster, self.optimization)?;
        self.check_deadline(started)?;

        let output = ItemOutput {
            width: raster.width(),
            height: raster.height(),
            stats: ItemStats::new(item.bytes.len(), png.len()),
            sha256: format!("{:x}", Sha256::digest(&png)),
            png,
        };
        Ok((operations, output))
    }

    /// Run one item to a terminal status. Never panics.
    fn run_item(&self, item: &SourceItem) -> ProcessedItem {
        let current = Cell::new(Stage::Queued);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(item, &current)));
        let result = match outcome {
            Ok(Ok((operations, output))) => ProcessedItem::succeeded(item, operations, output),
            Ok(Err(reason)) => ProcessedItem::failed(item, current.get(), reason),
            Err(payload) => ProcessedItem::failed(item, current.get(), FailureReason::panic(&*payload)),
        };
        current.set(Stage::Done);
        if let ItemStatus::Failed { stage, reason } = &result.status {
            tracing::warn!(
                id = %item.id,
                file = %item.filename,
                %stage,
                kind = ?reason.kind,
                "item failed: {}",
                reason.message
            );
        }
        result
    }
}

/// Runs batches with a given segmenter and settings.
pub struct BatchProcessor<'a> {
    settings: &'a Settings,
    segmenter: &'a dyn Segmenter,
    cancel: CancelToken,
    events: Option<Sender<BatchEvent>>,
}

impl<'a> BatchProcessor<'a> {
    pub fn new(settings: &'a Settings, segmenter: &'a dyn Segmenter) -> Self {
        Self {
            settings,
            segmenter,
            cancel: CancelToken::new(),
            events: None,
        }
    }

    pub fn settings(&self) -> &'a Settings {
        self.settings
    }

    /// Observe `token` for cancellation.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Send progress events to `tx`. The sender is dropped when the batch ends.
    pub fn with_events(mut self, tx: Sender<BatchEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Process `items` with `options` applied uniformly.
    ///
    /// Only infrastructure failures are errors; every item outcome,
    /// including failures, is in the returned [`BatchResult`].
    pub fn run(
        self,
        items: Vec<SourceItem>,
        options: &ProcessingOptions,
    ) -> Result<BatchResult, BatchError> {
        let total = items.len();
        if total == 0 {
            tracing::info!("no images to process");
            return Ok(BatchResult::from_items(Vec::new()));
        }

        let workers = effective_workers(&self.settings.processing).min(total);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("pngbatch-worker-{i}"))
            .build()?;
        tracing::info!(
            total,
            workers,
            segmenter = self.segmenter.name(),
            remove_background = options.remove_background,
            resize = ?options.resize,
            "batch started"
        );

        let pipeline = Pipeline {
            segmenter: self.segmenter,
            decode_limits: self.settings.decode_limits(),
            max_dimension: self.settings.limits.max_dimension,
            resize_mode: self.settings.resize.mode,
            optimization: self.settings.optimization_level(),
            item_timeout: self.settings.item_timeout(),
            options: *options,
            events: self.events.as_ref(),
        };
        pipeline.emit(BatchEvent::Started { total });

        let completed = Mutex::new(0usize);
        let cancel = &self.cancel;
        let items: Vec<ProcessedItem> = pool.install(|| {
            items
                .into_par_iter()
                .map(|item| {
                    let processed = if cancel.is_cancelled() {
                        ProcessedItem::cancelled(&item)
                    } else {
                        pipeline.run_item(&item)
                    };
                    // Hold the lock while sending so `completed` arrives in order.
                    let mut done = completed.lock().unwrap_or_else(|e| e.into_inner());
                    *done += 1;
                    pipeline.emit(BatchEvent::ItemFinished {
                        id: processed.id,
                        filename: processed.filename.clone(),
                        completed: *done,
                        total,
                        status: processed.status.clone(),
                    });
                    processed
                })
                .collect()
        });

        let result = BatchResult::from_items(items);
        tracing::info!(
            succeeded = result.summary.succeeded,
            failed = result.summary.failed,
            cancelled = result.summary.cancelled,
            "batch finished"
        );
        Ok(result)
    }
}

/// Process `items` with the stock [`BorderSegmenter`] tuned by `settings`.
pub fn process_batch(
    items: Vec<SourceItem>,
    options: &ProcessingOptions,
    settings: &Settings,
) -> Result<BatchResult, BatchError> {
    let segmenter = BorderSegmenter::new(settings.segmentation);
    BatchProcessor::new(settings, &segmenter).run(items, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::segment::tests::{MockBehavior, MockSegmenter};
    use crate::imaging::Raster;
    use crate::test_helpers::{disc_on_background, gradient_raster, png_bytes};
    use std::sync::mpsc;

    fn source(id: usize, filename: &str, bytes: Vec<u8>) -> SourceItem {
        SourceItem {
            id: SourceId(id),
            filename: filename.to_string(),
            bytes,
            format: None,
        }
    }

    fn png_item(id: usize, filename: &str, w: u32, h: u32) -> SourceItem {
        source(id, filename, png_bytes(&gradient_raster(w, h)))
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.processing.max_workers = Some(2);
        settings.processing.optimization_level = 0;
        settings
    }

    fn run_with(
        segmenter: &dyn Segmenter,
        settings: &Settings,
        items: Vec<SourceItem>,
        options: ProcessingOptions,
    ) -> BatchResult {
        BatchProcessor::new(settings, segmenter)
            .run(items, &options)
            .unwrap()
    }

    fn decode_output(item: &ProcessedItem) -> Raster {
        decode(&item.output.as_ref().unwrap().png, &DecodeLimits::default()).unwrap()
    }

    // =========================================================================
    // Ordering and partial failure
    // =========================================================================

    #[test]
    fn results_follow_input_order() {
        let items: Vec<SourceItem> = (0..12)
            .map(|i| png_item(i, &format!("img{i}.png"), 8 + i as u32, 8))
            .collect();
        let mock = MockSegmenter::new(MockBehavior::SplitMask);
        let result = run_with(&mock, &settings(), items, ProcessingOptions::default());

        assert_eq!(result.items.len(), 12);
        for (i, item) in result.items.iter().enumerate() {
            assert_eq!(item.id, SourceId(i));
            assert_eq!(item.filename, format!("img{i}.png"));
        }
        assert_eq!(result.status, BatchStatus::Completed);
    }

    #[test]
    fn one_corrupt_item_fails_alone() {
        let items = vec![
            png_item(0, "a.png", 10, 10),
            source(1, "broken.jpg", b"\xFF\xD8\xFF not really".to_vec()),
            png_item(2, "c.png", 10, 10),
        ];
        let mock = MockSegmenter::new(MockBehavior::SplitMask);
        let result = run_with(&mock, &settings(), items, ProcessingOptions::default());

        assert_eq!(result.summary.succeeded, 2);
        assert_eq!(result.summary.failed, 1);
        match &result.items[1].status {
            ItemStatus::Failed { stage, .. } => assert_eq!(*stage, Stage::Decoding),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(result.items[1].output.is_none());
        assert_eq!(result.package().unwrap().names, vec!["a.png", "c.png"]);
    }

    #[test]
    fn non_image_reports_invalid_format() {
        let items = vec![source(0, "notes.txt", b"hello".to_vec())];
        let mock = MockSegmenter::new(MockBehavior::SplitMask);
        let result = run_with(&mock, &settings(), items, ProcessingOptions::default());
        let ItemStatus::Failed { reason, .. } = &result.items[0].status else {
            panic!("expected failure");
        };
        assert_eq!(reason.kind, FailureKind::InvalidFormat);
    }

    #[test]
    fn empty_batch_is_flagged() {
        let mock = MockSegmenter::new(MockBehavior::SplitMask);
        let result = run_with(&mock, &settings(), Vec::new(), ProcessingOptions::default());
        assert!(result.is_empty());
        assert_eq!(result.summary.total, 0);
        assert_eq!(result.summary.success_rate, 0.0);
        assert!(result.package().unwrap().names.is_empty());
    }

    // =========================================================================
    // Operations
    // =========================================================================

    #[test]
    fn passthrough_reencodes_losslessly() {
        let input = gradient_raster(17, 9);
        let items = vec![source(0, "photo.png", png_bytes(&input))];
        let mock = MockSegmenter::new(MockBehavior::SplitMask);
        let result = run_with(&mock, &settings(), items, ProcessingOptions::default());

        let item = &result.items[0];
        assert!(item.is_success());
        assert_eq!(item.operations, AppliedOperations::default());
        assert_eq!(decode_output(item), input);
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn background_removal_runs_before_resize() {
        let items = vec![png_item(0, "a.png", 40, 20)];
        let mock = MockSegmenter::new(MockBehavior::SplitMask);
        let options = ProcessingOptions {
            remove_background: true,
            resize: Some(TargetSize::new(10, 10)),
        };
        let result = run_with(&mock, &settings(), items, options);

        // Segmenter saw the full-size source, not the resized raster
        assert_eq!(*mock.calls.lock().unwrap(), vec![(40, 20)]);
        let item = &result.items[0];
        assert!(item.operations.background_removed);
        assert_eq!(item.operations.resized_to.as_deref(), Some("10x10"));
        let out = decode_output(item);
        assert_eq!(out.dimensions(), (10, 10));
        assert_eq!(out.pixel(0, 5)[3], 0);
        assert_eq!(out.pixel(9, 5)[3], 255);
    }

    #[test]
    fn unconfident_segmenter_keeps_item_successful() {
        let items = vec![png_item(0, "a.png", 12, 12)];
        let mock = MockSegmenter::new(MockBehavior::Decline);
        let options = ProcessingOptions {
            remove_background: true,
            resize: None,
        };
        let result = run_with(&mock, &settings(), items, options);
        let item = &result.items[0];
        assert!(item.is_success());
        assert!(!item.operations.background_removed);
        assert!(decode_output(item).is_opaque());
    }

    #[test]
    fn border_segmenter_end_to_end() {
        let raster = disc_on_background(48, 48, [255, 255, 255], [10, 60, 200]);
        let items = vec![source(0, "product.jpg", png_bytes(&raster))];
        let options = ProcessingOptions {
            remove_background: true,
            resize: None,
        };
        let result = process_batch(items, &options, &settings()).unwrap();
        let out = decode_output(&result.items[0]);
        assert_eq!(out.pixel(0, 0)[3], 0);
        assert_eq!(out.pixel(24, 24)[3], 255);
    }

    #[test]
    fn resize_clamps_to_configured_maximum() {
        let mut settings = settings();
        settings.limits.max_dimension = 16;
        let items = vec![png_item(0, "a.png", 20, 20)];
        let mock = MockSegmenter::new(MockBehavior::SplitMask);
        let options = ProcessingOptions {
            remove_background: false,
            resize: Some(TargetSize::new(64, 32)),
        };
        let result = run_with(&mock, &settings, items, options);
        assert_eq!(
            result.items[0].operations.resized_to.as_deref(),
            Some("16x16")
        );
    }

    #[test]
    fn zero_target_fails_in_transform_stage() {
        let items = vec![png_item(0, "a.png", 8, 8)];
        let mock = MockSegmenter::new(MockBehavior::SplitMask);
        let options = ProcessingOptions {
            remove_background: false,
            resize: Some(TargetSize::new(0, 8)),
        };
        let result = run_with(&mock, &settings(), items, options);
        assert_eq!(
            result.items[0].status,
            ItemStatus::Failed {
                stage: Stage::Transforming,
                reason: FailureReason::new(
                    FailureKind::InvalidDimensions,
                    ResizeError::InvalidDimensions {
                        width: 0,
                        height: 8
                    }
                    .to_string()
                ),
            }
        );
    }

    #[test]
    fn stats_and_digest_describe_output() {
        let bytes = png_bytes(&gradient_raster(16, 16));
        let original = bytes.len();
        let items = vec![source(0, "a.png", bytes)];
        let mock = MockSegmenter::new(MockBehavior::SplitMask);
        let result = run_with(&mock, &settings(), items, ProcessingOptions::default());
        let output = result.items[0].output.as_ref().unwrap();
        assert_eq!(output.stats.original_size, original);
        assert_eq!(output.stats.final_size, output.png.len());
        assert_eq!(output.sha256.len(), 64);
        assert_eq!(output.sha256, format!("{:x}", Sha256::digest(&output.png)));
    }

    // =========================================================================
    // Faults, timeouts and cancellation
    // =========================================================================

    #[test]
    fn panicking_segmenter_fails_only_its_item() {
        let items = vec![png_item(0, "a.png", 8, 8), png_item(1, "b.png", 8, 8)];
        let mock = MockSegmenter::new(MockBehavior::Panic);
        let options = ProcessingOptions {
            remove_background: true,
            resize: None,
        };
        let result = run_with(&mock, &settings(), items, options);
        assert_eq!(result.summary.failed, 2);
        for item in &result.items {
            let ItemStatus::Failed { stage, reason } = &item.status else {
                panic!("expected failure");
            };
            assert_eq!(*stage, Stage::Transforming);
            assert_eq!(reason.kind, FailureKind::Internal);
            assert!(reason.message.contains("mock segmenter exploded"), "{}", reason.message);
        }
    }

    #[test]
    fn slow_item_times_out() {
        let mut settings = settings();
        settings.processing.item_timeout_secs = 1;
        let items = vec![png_item(0, "slow.png", 8, 8)];
        let mock = MockSegmenter::new(MockBehavior::Slow(Duration::from_millis(1100)));
        let options = ProcessingOptions {
            remove_background: true,
            resize: None,
        };
        let result = run_with(&mock, &settings, items, options);
        let ItemStatus::Failed { stage, reason } = &result.items[0].status else {
            panic!("expected timeout");
        };
        assert_eq!(*stage, Stage::Transforming);
        assert_eq!(reason.kind, FailureKind::Timeout);
        assert!(result.items[0].output.is_none());
    }

    #[test]
    fn cancelled_before_start_marks_everything() {
        let token = CancelToken::new();
        token.cancel();
        let items: Vec<SourceItem> = (0..4).map(|i| png_item(i, "x.png", 4, 4)).collect();
        let mock = MockSegmenter::new(MockBehavior::SplitMask);
        let settings = settings();
        let result = BatchProcessor::new(&settings, &mock)
            .with_cancel_token(token)
            .run(items, &ProcessingOptions::default())
            .unwrap();
        assert_eq!(result.status, BatchStatus::Cancelled);
        assert_eq!(result.summary.cancelled, 4);
        assert!(result.items.iter().all(|i| i.status == ItemStatus::Cancelled));
    }

    #[test]
    fn cancel_mid_batch_lets_in_flight_items_finish() {
        let token = CancelToken::new();
        let (tx, rx) = mpsc::channel();
        let mut settings = settings();
        settings.processing.max_workers = Some(1);
        let items: Vec<SourceItem> = (0..6).map(|i| png_item(i, "x.png", 4, 4)).collect();
        let mock = MockSegmenter::new(MockBehavior::Slow(Duration::from_millis(20)));
        let options = ProcessingOptions {
            remove_background: true,
            resize: None,
        };

        let watcher = {
            let token = token.clone();
            std::thread::spawn(move || {
                for event in rx {
                    if matches!(event, BatchEvent::ItemFinished { completed: 2, .. }) {
                        token.cancel();
                    }
                }
            })
        };
        let result = BatchProcessor::new(&settings, &mock)
            .with_cancel_token(token)
            .with_events(tx)
            .run(items, &options)
            .unwrap();
        watcher.join().unwrap();

        assert_eq!(result.items.len(), 6);
        assert!(result.summary.succeeded >= 2);
        assert!(result.summary.cancelled >= 1);
        assert_eq!(
            result.summary.succeeded + result.summary.cancelled,
            6,
            "no item may be half-processed"
        );
        for item in &result.items {
            assert_eq!(item.output.is_some(), item.is_success());
        }
    }

    #[test]
    fn events_report_monotonic_progress() {
        let (tx, rx) = mpsc::channel();
        let items: Vec<SourceItem> = (0..5).map(|i| png_item(i, "x.png", 6, 6)).collect();
        let mock = MockSegmenter::new(MockBehavior::SplitMask);
        let settings = settings();
        BatchProcessor::new(&settings, &mock)
            .with_events(tx)
            .run(items, &ProcessingOptions::default())
            .unwrap();

        let events: Vec<BatchEvent> = rx.into_iter().collect();
        assert_eq!(events.first(), Some(&BatchEvent::Started { total: 5 }));
        let completed: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::ItemFinished { completed, .. } => Some(*completed),
                _ => None,
            })
            .collect();
        assert_eq!(completed, vec![1, 2, 3, 4, 5]);
        let decoding = events
            .iter()
            .filter(|e| matches!(e, BatchEvent::ItemStage { stage: Stage::Decoding, .. }))
            .count();
        assert_eq!(decoding, 5);
    }

    // =========================================================================
    // Summary arithmetic
    // =========================================================================

    #[test]
    fn compression_ratio_rounds_to_one_decimal() {
        assert_eq!(ItemStats::new(1000, 333).compression_ratio, 66.7);
        assert_eq!(ItemStats::new(100, 150).compression_ratio, -50.0);
        assert_eq!(ItemStats::new(0, 10).compression_ratio, 0.0);
    }

    #[test]
    fn success_rate_rounds_to_one_decimal() {
        let item = |status| ProcessedItem {
            id: SourceId(0),
            filename: "x".into(),
            operations: AppliedOperations::default(),
            status,
            output: None,
        };
        let items = vec![
            item(ItemStatus::Success),
            item(ItemStatus::Cancelled),
            item(ItemStatus::Failed {
                stage: Stage::Decoding,
                reason: FailureReason::new(FailureKind::Truncated, "cut"),
            }),
        ];
        let summary = BatchSummary::from_items(&items);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.success_rate, 33.3);
    }
}
