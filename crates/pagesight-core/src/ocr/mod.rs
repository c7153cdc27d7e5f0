//! OCR used to snap highlight regions to words.

pub mod cache;
pub mod tesseract;
pub mod traits;

pub use cache::{OcrCache, OcrKey};
pub use tesseract::{parse_tsv, TesseractConfig, TesseractOcr};
pub use traits::{OcrBox, OcrEngine};
