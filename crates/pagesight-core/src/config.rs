//! Production configuration.
//!
//! Constants define the defaults used across the crate and in benchmarks;
//! [`RetrievalConfig`] bundles them into a runtime value that front ends can
//! override (for example from CLI flags).
//!
//! # Usage
//!
//! ```
//! use pagesight_core::config::{RetrievalConfig, DEFAULT_TOP_K};
//!
//! let config = RetrievalConfig::default();
//! assert_eq!(config.top_k, DEFAULT_TOP_K);
//! assert!(config.validate().is_ok());
//! ```

use crate::error::RetrievalError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// Retrieval
// =============================================================================

/// Number of pages returned by `retrieve` when the caller does not ask for a
/// specific `k`.
pub const DEFAULT_TOP_K: usize = 2;

/// Number of pages handed to the answer service as visual context.
pub const DEFAULT_CONTEXT_PAGES: usize = 3;

// =============================================================================
// Highlighting
// =============================================================================

/// Maximum number of patches outlined per page.
///
/// Small on purpose: outlining every matched patch would cover most of the page.
pub const DEFAULT_HIGHLIGHT_PATCHES: usize = 5;

/// Fraction of an OCR box's area that must fall inside a patch rectangle for
/// the box to be merged into that patch's highlighted region.
pub const DEFAULT_MIN_OCR_OVERLAP: f32 = 0.5;

/// Outline stroke width in pixels.
pub const DEFAULT_OUTLINE_WIDTH: u32 = 3;

/// Outline colour (amber).
pub const DEFAULT_OUTLINE_COLOR: [u8; 3] = [255, 176, 0];

// =============================================================================
// Embedding gateway
// =============================================================================

/// How long a request may wait in the admission queue before it fails with
/// `ResourceTimeout` instead of running.
pub const DEFAULT_ADMISSION_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration for retrieval and highlighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Pages returned per query
    pub top_k: usize,
    /// Patches outlined per page
    pub highlight_patches: usize,
    /// Minimum OCR box overlap (0.0 to 1.0) for region refinement
    pub min_ocr_overlap: f32,
    /// Gateway admission deadline in milliseconds
    pub admission_timeout_ms: u64,
    /// Outline stroke width in pixels
    pub outline_width: u32,
    /// Outline RGB colour
    pub outline_color: [u8; 3],
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            highlight_patches: DEFAULT_HIGHLIGHT_PATCHES,
            min_ocr_overlap: DEFAULT_MIN_OCR_OVERLAP,
            admission_timeout_ms: DEFAULT_ADMISSION_TIMEOUT_SECS * 1000,
            outline_width: DEFAULT_OUTLINE_WIDTH,
            outline_color: DEFAULT_OUTLINE_COLOR,
        }
    }
}

impl RetrievalConfig {
    /// Admission deadline as a [`Duration`].
    pub fn admission_timeout(&self) -> Duration {
        Duration::from_millis(self.admission_timeout_ms)
    }

    /// Checks that every value is in range.
    pub fn validate(&self) -> Result<(), RetrievalError> {
        if !(0.0..=1.0).contains(&self.min_ocr_overlap) {
            return Err(RetrievalError::InvalidConfig(format!(
                "min_ocr_overlap must be within 0.0..=1.0, got {}",
                self.min_ocr_overlap
            )));
        }
        if self.admission_timeout_ms == 0 {
            return Err(RetrievalError::InvalidConfig(
                "admission_timeout_ms must be positive".to_string(),
            ));
        }
        if self.outline_width == 0 {
            return Err(RetrievalError::InvalidConfig(
                "outline_width must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = RetrievalConfig::default();
        assert_eq!(config.top_k, 2);
        assert_eq!(config.highlight_patches, 5);
        assert_eq!(
            config.admission_timeout(),
            Duration::from_secs(DEFAULT_ADMISSION_TIMEOUT_SECS)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_overlap() {
        let config = RetrievalConfig {
            min_ocr_overlap: 1.5,
            ..RetrievalConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RetrievalError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RetrievalConfig = serde_json::from_str(r#"{"top_k": 4}"#).unwrap();
        assert_eq!(config.top_k, 4);
        assert_eq!(config.highlight_patches, DEFAULT_HIGHLIGHT_PATCHES);
    }
}
