//! OCR through the `tesseract` command-line tool.
//!
//! The page is piped to `tesseract stdin stdout -l <lang> tsv` as PNG and the
//! TSV report is parsed for word-level boxes.

use super::traits::{OcrBox, OcrEngine};
use crate::error::OcrError;
use crate::highlight::encode::encode_png;
use crate::highlight::Rect;
use async_trait::async_trait;
use image::RgbImage;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

/// TSV `level` value of word rows.
const WORD_LEVEL: u32 = 5;

/// Number of columns in a tesseract TSV row.
const TSV_COLUMNS: usize = 12;

/// Tesseract configuration.
#[derive(Debug, Clone)]
pub struct TesseractConfig {
    /// Binary to execute
    pub binary: String,
    /// Language pack(s), e.g. `eng` or `eng+deu`
    pub language: String,
    /// Give up on a page after this long
    pub timeout: Duration,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
            language: "eng".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// OCR engine backed by the tesseract binary.
pub struct TesseractOcr {
    config: TesseractConfig,
}

impl TesseractOcr {
    /// Creates an engine with the given configuration.
    pub fn new(config: TesseractConfig) -> Self {
        Self { config }
    }

    async fn run(&self, png: Vec<u8>) -> Result<String, OcrError> {
        let mut child = Command::new(&self.config.binary)
            .args(["stdin", "stdout", "-l", &self.config.language, "tsv"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                OcrError::Unavailable(format!("failed to start {}: {}", self.config.binary, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&png)
                .await
                .map_err(|e| OcrError::Failed(format!("failed to write page: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| OcrError::Failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Failed(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout).map_err(|e| OcrError::MalformedOutput(e.to_string()))
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new(TesseractConfig::default())
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    async fn detect(&self, image: &RgbImage) -> Result<Vec<OcrBox>, OcrError> {
        let png = encode_png(image).map_err(|e| OcrError::Failed(e.to_string()))?;

        let tsv = tokio::time::timeout(self.config.timeout, self.run(png))
            .await
            .map_err(|_| {
                OcrError::Failed(format!("timed out after {:?}", self.config.timeout))
            })??;

        let boxes = parse_tsv(&tsv)?;
        debug!("tesseract returned {} words", boxes.len());
        Ok(boxes)
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

/// Parses tesseract TSV output into word boxes.
///
/// Keeps word-level rows with non-negative confidence and non-blank text.
pub fn parse_tsv(tsv: &str) -> Result<Vec<OcrBox>, OcrError> {
    let mut boxes = Vec::new();

    for (line_no, line) in tsv.lines().enumerate() {
        if line_no == 0 && line.starts_with("level") {
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.splitn(TSV_COLUMNS, '\t').collect();
        if fields.len() < TSV_COLUMNS - 1 {
            return Err(OcrError::MalformedOutput(format!(
                "line {} has {} columns",
                line_no + 1,
                fields.len()
            )));
        }

        let number = |i: usize| -> Result<u32, OcrError> {
            fields[i].trim().parse::<u32>().map_err(|e| {
                OcrError::MalformedOutput(format!("line {} column {}: {}", line_no + 1, i, e))
            })
        };

        if number(0)? != WORD_LEVEL {
            continue;
        }
        let confidence: f32 = fields[10].trim().parse().map_err(|e| {
            OcrError::MalformedOutput(format!("line {} confidence: {}", line_no + 1, e))
        })?;
        let text = fields.get(11).map(|t| t.trim()).unwrap_or("");
        if confidence < 0.0 || text.is_empty() {
            continue;
        }

        boxes.push(OcrBox {
            rect: Rect::new(number(6)?, number(7)?, number(8)?, number(9)?),
            text: text.to_string(),
        });
    }

    Ok(boxes)
}
