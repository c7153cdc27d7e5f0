//! Loads page rasters from disk.
//!
//! A corpus directory holds one entry per document:
//!
//! ```text
//! corpus/
//! ├── annual-report/      # multi-page document, pages sorted by file name
//! │   ├── page-000.png
//! │   └── page-001.png
//! └── brochure.jpg        # single-page document
//! ```
//!
//! Entries are visited in file-name order and numbered from 0, so document
//! ids are stable for a given directory. Digit runs in names compare by
//! value: `page-2.png` comes before `page-10.png`, padded or not.

use super::builder::SourceDocument;
use super::types::DocumentId;
use image::RgbImage;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// File extensions treated as page images.
const PAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Errors raised while reading page images from disk.
#[derive(Debug, Error)]
pub enum CorpusLoadError {
    /// Directory or file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
    /// File could not be decoded as an image
    #[error("Failed to decode {path}: {source}")]
    Decode {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        source: image::ImageError,
    },
    /// Directory contains no page images
    #[error("No page images found in {0}")]
    Empty(PathBuf),
}

/// Loads every document under `dir`.
///
/// # Errors
///
/// - `CorpusLoadError::Io` if the directory cannot be listed
/// - `CorpusLoadError::Decode` if a page image is corrupt
/// - `CorpusLoadError::Empty` if no documents were found
pub fn load_corpus_dir(dir: &Path) -> Result<Vec<SourceDocument>, CorpusLoadError> {
    let mut documents = Vec::new();

    for path in sorted_entries(dir)? {
        let pages = if path.is_dir() {
            match load_page_images(&path) {
                Ok(pages) => pages,
                Err(CorpusLoadError::Empty(_)) => {
                    warn!("Skipping {}: no page images", path.display());
                    continue;
                }
                Err(e) => return Err(e),
            }
        } else if is_page_image(&path) {
            vec![Arc::new(load_image(&path)?)]
        } else {
            debug!("Ignoring {}", path.display());
            continue;
        };

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!("Loaded '{}' ({} pages)", name, pages.len());
        documents.push(SourceDocument {
            id: DocumentId::from_u64(documents.len() as u64),
            name,
            pages,
        });
    }

    if documents.is_empty() {
        return Err(CorpusLoadError::Empty(dir.to_path_buf()));
    }
    Ok(documents)
}

/// Loads the page images directly inside `dir`, in file-name order.
///
/// Used for session uploads, where the upload is one document.
pub fn load_page_images(dir: &Path) -> Result<Vec<Arc<RgbImage>>, CorpusLoadError> {
    let pages = sorted_entries(dir)?
        .into_iter()
        .filter(|p| p.is_file() && is_page_image(p))
        .map(|p| load_image(&p).map(Arc::new))
        .collect::<Result<Vec<_>, _>>()?;

    if pages.is_empty() {
        return Err(CorpusLoadError::Empty(dir.to_path_buf()));
    }
    Ok(pages)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, CorpusLoadError> {
    let io_err = |source| CorpusLoadError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    paths.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));
    Ok(paths)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Compares names with digit runs ordered by numeric value.
///
/// Equal values fall back to the shorter run first, so `p-1` < `p-01`.
fn natural_cmp(mut a: &str, mut b: &str) -> Ordering {
    loop {
        match (a.chars().next(), b.chars().next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let (digits_a, rest_a) = split_digits(a);
                let (digits_b, rest_b) = split_digits(b);
                let value_a = digits_a.trim_start_matches('0');
                let value_b = digits_b.trim_start_matches('0');
                let ordering = value_a
                    .len()
                    .cmp(&value_b.len())
                    .then_with(|| value_a.cmp(value_b))
                    .then_with(|| digits_a.len().cmp(&digits_b.len()));
                if ordering != Ordering::Equal {
                    return ordering;
                }
                a = rest_a;
                b = rest_b;
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a = &a[x.len_utf8()..];
                b = &b[y.len_utf8()..];
            }
        }
    }
}

fn split_digits(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

fn is_page_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| PAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn load_image(path: &Path) -> Result<RgbImage, CorpusLoadError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|source| CorpusLoadError::Decode {
            path: path.to_path_buf(),
            source,
        })
}
