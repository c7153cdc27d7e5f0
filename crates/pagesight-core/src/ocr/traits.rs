//! OCR engine abstraction.

use crate::error::OcrError;
use crate::highlight::Rect;
use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// A word detected on a page, in page pixel coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrBox {
    /// Bounding box of the word
    pub rect: Rect,
    /// Recognized text
    pub text: String,
}

/// Word-level text detection.
///
/// OCR only refines highlight regions; retrieval never depends on it, and
/// callers degrade gracefully when `detect` fails.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Detects words on a page raster.
    ///
    /// # Errors
    ///
    /// Returns `OcrError` if the engine cannot run or its output cannot be
    /// parsed.
    async fn detect(&self, image: &RgbImage) -> Result<Vec<OcrBox>, OcrError>;

    /// Engine name for logging.
    fn name(&self) -> &str;
}
