//! Engine settings.
//!
//! Settings cover the knobs that stay fixed across requests: resource
//! ceilings, worker count, timeouts, optimization effort and segmentation
//! tuning. Per-request choices (remove background? resize to what?) live in
//! [`options`](crate::options) instead.
//!
//! ## Settings File
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [limits]
//! max_dimension = 4000        # Largest accepted resize target (per side)
//! max_pixels = 100000000      # Largest decoded image area (width * height)
//! max_entries = 10000         # Most entries accepted in one ZIP
//! max_entry_bytes = 104857600 # Largest uncompressed ZIP entry
//!
//! [processing]
//! max_workers = 4             # Parallel workers (omit for auto = CPU cores)
//! item_timeout_secs = 60      # Wall-clock budget per image
//! optimization_level = 2      # PNG optimization effort (0-6)
//!
//! [resize]
//! mode = "fill"               # fill | fit | stretch
//!
//! [segmentation]
//! low_threshold = 24.0        # Color distance treated as pure background
//! high_threshold = 64.0       # Color distance treated as pure foreground
//! min_border_coverage = 0.6   # Border share the background palette must explain
//! feather_radius = 1          # Mask blur sigma in pixels, 0 = off
//! ```
//!
//! Settings files are sparse: values not given keep their defaults. Unknown
//! keys are rejected to catch typos early.

use crate::archive::ArchiveLimits;
use crate::imaging::{DecodeLimits, OptimizationLevel, ResizeMode, SegmentationParams};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Engine settings loaded from `pngbatch.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Resource ceilings.
    pub limits: LimitsConfig,
    /// Worker pool, timeout and encoder settings.
    pub processing: ProcessingConfig,
    /// Resize geometry.
    pub resize: ResizeConfig,
    /// Background segmentation tuning.
    pub segmentation: SegmentationParams,
}

impl Settings {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_dimension == 0 {
            return Err(ConfigError::Validation(
                "limits.max_dimension must be at least 1".into(),
            ));
        }
        if self.limits.max_pixels == 0 {
            return Err(ConfigError::Validation(
                "limits.max_pixels must be at least 1".into(),
            ));
        }
        if self.limits.max_entries == 0 {
            return Err(ConfigError::Validation(
                "limits.max_entries must be at least 1".into(),
            ));
        }
        if self.processing.max_workers == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_workers must be at least 1".into(),
            ));
        }
        if self.processing.item_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "processing.item_timeout_secs must be at least 1".into(),
            ));
        }
        if self.processing.optimization_level > OptimizationLevel::MAX {
            return Err(ConfigError::Validation(format!(
                "processing.optimization_level must be 0-{}",
                OptimizationLevel::MAX
            )));
        }
        let seg = &self.segmentation;
        if !(seg.low_threshold >= 0.0 && seg.low_threshold < seg.high_threshold) {
            return Err(ConfigError::Validation(
                "segmentation thresholds must satisfy 0 <= low_threshold < high_threshold".into(),
            ));
        }
        if !(0.0..=1.0).contains(&seg.min_border_coverage) {
            return Err(ConfigError::Validation(
                "segmentation.min_border_coverage must be 0-1".into(),
            ));
        }
        Ok(())
    }

    pub fn decode_limits(&self) -> DecodeLimits {
        DecodeLimits {
            max_pixels: self.limits.max_pixels,
        }
    }

    pub fn archive_limits(&self) -> ArchiveLimits {
        ArchiveLimits {
            max_entries: self.limits.max_entries,
            max_entry_bytes: self.limits.max_entry_bytes,
        }
    }

    pub fn item_timeout(&self) -> Duration {
        Duration::from_secs(self.processing.item_timeout_secs)
    }

    pub fn optimization_level(&self) -> OptimizationLevel {
        OptimizationLevel::new(self.processing.optimization_level)
    }
}

/// Resource ceilings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Largest accepted resize target, per side.
    pub max_dimension: u32,
    /// Largest decoded image area (`width * height`).
    pub max_pixels: u64,
    /// Most entries accepted in one ZIP.
    pub max_entries: usize,
    /// Largest uncompressed ZIP entry, in bytes.
    pub max_entry_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let archive = ArchiveLimits::default();
        Self {
            max_dimension: 4000,
            max_pixels: DecodeLimits::default().max_pixels,
            max_entries: archive.max_entries,
            max_entry_bytes: archive.max_entry_bytes,
        }
    }
}

/// Worker pool, timeout and encoder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_workers: Option<usize>,
    /// Wall-clock budget per image, in seconds.
    pub item_timeout_secs: u64,
    /// PNG optimization effort (0-6).
    pub optimization_level: u8,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_workers: None,
            item_timeout_secs: 60,
            optimization_level: OptimizationLevel::default().value(),
        }
    }
}

/// Resize geometry settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResizeConfig {
    pub mode: ResizeMode,
}

/// Resolve the effective worker count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_workers(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_workers
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default settings as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(Settings::default())
        .map_err(|e| ConfigError::Validation(format!("default settings do not serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Parse a settings document, merge it over the defaults and validate.
pub fn parse_settings(content: &str) -> Result<Settings, ConfigError> {
    let overlay: toml::Value = toml::from_str(content)?;
    let merged = merge_toml(stock_defaults_value()?, overlay);
    let settings: Settings = merged.try_into()?;
    settings.validate()?;
    Ok(settings)
}

/// Load settings from a file, or the stock defaults when `path` is `None`.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    match path {
        Some(path) => parse_settings(&fs::read_to_string(path)?),
        None => Ok(Settings::default()),
    }
}

/// Returns a fully-commented stock settings file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# pngbatch settings
# =================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# ---------------------------------------------------------------------------
# Resource ceilings
# ---------------------------------------------------------------------------
[limits]
# Largest accepted resize target, per side, in pixels.
max_dimension = 4000

# Largest decoded image area (width * height). Larger images fail to decode.
max_pixels = 100000000

# Most entries accepted in a single ZIP upload.
max_entries = 10000

# Largest uncompressed size of one ZIP entry, in bytes (100 MiB).
max_entry_bytes = 104857600

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_workers = 4

# Wall-clock budget per image, in seconds. Slower images fail with a timeout.
item_timeout_secs = 60

# PNG optimization effort: 0 = fast, 6 = smallest files. Always lossless.
optimization_level = 2

# ---------------------------------------------------------------------------
# Resize geometry
# ---------------------------------------------------------------------------
[resize]
# fill    - cover the target and center-crop the overflow
# fit     - fit inside the target, centered on a transparent canvas
# stretch - resample to the exact target, ignoring aspect ratio
mode = "fill"

# ---------------------------------------------------------------------------
# Background removal
# ---------------------------------------------------------------------------
[segmentation]
# RGB distance from the border palette at or below which a pixel is
# fully transparent, and at or above which it is fully opaque.
low_threshold = 24.0
high_threshold = 64.0

# Share of border pixels (0-1) the background palette must explain.
# Below this the image is left untouched.
min_border_coverage = 0.6

# Gaussian blur sigma applied to the mask edge, in pixels. 0 turns it off.
feather_radius = 1
"##
}
