//! Per-request processing options.
//!
//! Callers describe a batch with four fields, as a JSON object or CLI flags:
//!
//! ```json
//! { "removeBackground": true, "resize": true, "width": 800, "height": "600" }
//! ```
//!
//! Unknown fields are ignored. Widths and heights may be numbers or numeric
//! strings (form inputs send strings). [`RawOptions::resolve`] validates the
//! whole request once, before any item is dispatched, so a bad dimension is
//! a single batch-fatal [`ConfigError`] rather than N identical item
//! failures.

use crate::config::ConfigError;
use crate::imaging::TargetSize;
use serde::{Deserialize, Serialize};

/// Dimension used when the caller leaves a field empty.
pub const DEFAULT_DIMENSION: u32 = 400;

/// A width or height as the caller sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DimensionInput {
    Number(i64),
    Text(String),
}

impl DimensionInput {
    /// Integer value, or `None` when the text is not a whole number.
    fn parse(&self) -> Option<i64> {
        match self {
            DimensionInput::Number(n) => Some(*n),
            DimensionInput::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl std::fmt::Display for DimensionInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DimensionInput::Number(n) => write!(f, "{n}"),
            DimensionInput::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<u32> for DimensionInput {
    fn from(value: u32) -> Self {
        DimensionInput::Number(i64::from(value))
    }
}

/// Options exactly as received, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawOptions {
    pub remove_background: bool,
    pub resize: bool,
    pub width: Option<DimensionInput>,
    pub height: Option<DimensionInput>,
}

impl RawOptions {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set both dimension fields to the larger of the two.
    ///
    /// A missing field counts as [`DEFAULT_DIMENSION`]. When either field is
    /// not a positive whole number the fields are left as they are, so
    /// [`resolve`](Self::resolve) reports the bad value. This only equalizes
    /// the fields; the resize mode decides how the image is fitted.
    pub fn make_square(&mut self) {
        let side = |input: &Option<DimensionInput>| match input {
            None => Some(i64::from(DEFAULT_DIMENSION)),
            Some(input) => input.parse().filter(|&v| v > 0),
        };
        if let (Some(width), Some(height)) = (side(&self.width), side(&self.height)) {
            let max = width.max(height);
            self.width = Some(DimensionInput::Number(max));
            self.height = Some(DimensionInput::Number(max));
        }
    }

    /// Validate into [`ProcessingOptions`].
    ///
    /// Dimensions are only checked when `resize` is on; otherwise they are
    /// ignored entirely.
    pub fn resolve(&self, max_dimension: u32) -> Result<ProcessingOptions, ConfigError> {
        let resize = if self.resize {
            Some(TargetSize::new(
                resolve_dimension("width", self.width.as_ref(), max_dimension)?,
                resolve_dimension("height", self.height.as_ref(), max_dimension)?,
            ))
        } else {
            None
        };
        Ok(ProcessingOptions {
            remove_background: self.remove_background,
            resize,
        })
    }
}

fn resolve_dimension(
    field: &str,
    input: Option<&DimensionInput>,
    max_dimension: u32,
) -> Result<u32, ConfigError> {
    let Some(input) = input else {
        return Ok(DEFAULT_DIMENSION.min(max_dimension));
    };
    let value = input.parse().ok_or_else(|| {
        ConfigError::Validation(format!("{field} must be a whole number, got {input}"))
    })?;
    if value < 1 || value > i64::from(max_dimension) {
        return Err(ConfigError::Validation(format!(
            "{field} must be between 1 and {max_dimension}, got {value}"
        )));
    }
    Ok(value as u32)
}

/// Validated options applied uniformly to every item in a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingOptions {
    pub remove_background: bool,
    /// Target size when resizing is enabled.
    pub resize: Option<TargetSize>,
}
