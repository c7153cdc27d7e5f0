//! Multi-vector embedding types.

use crate::error::EmbeddingError;
use crate::highlight::Rect;
use serde::{Deserialize, Serialize};

/// Ordered sequence of fixed-dimension vectors stored row-major.
///
/// Used both for page patch embeddings (one row per image patch) and for
/// query embeddings (one row per query token).
#[derive(Debug, Clone, PartialEq)]
pub struct MultiVector {
    data: Vec<f32>,
    dim: usize,
}

impl MultiVector {
    /// Creates a multi-vector from flat row-major data.
    ///
    /// # Errors
    ///
    /// Returns `EmbeddingError::MalformedOutput` if `dim` is zero while data is
    /// present, or if the data length is not a multiple of `dim`.
    pub fn new(data: Vec<f32>, dim: usize) -> Result<Self, EmbeddingError> {
        if dim == 0 {
            if data.is_empty() {
                return Ok(Self { data, dim });
            }
            return Err(EmbeddingError::MalformedOutput(
                "zero-dimensional vectors".to_string(),
            ));
        }
        if data.len() % dim != 0 {
            return Err(EmbeddingError::MalformedOutput(format!(
                "{} values do not divide into rows of {}",
                data.len(),
                dim
            )));
        }
        Ok(Self { data, dim })
    }

    /// Creates a multi-vector from individual rows.
    ///
    /// All rows must share one non-zero length.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, EmbeddingError> {
        let dim = match rows.first() {
            Some(first) => first.len(),
            None => return Ok(Self::empty(0)),
        };
        if dim == 0 {
            return Err(EmbeddingError::MalformedOutput(
                "zero-dimensional vectors".to_string(),
            ));
        }

        let mut data = Vec::with_capacity(rows.len() * dim);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != dim {
                return Err(EmbeddingError::MalformedOutput(format!(
                    "row {} has {} values, expected {}",
                    i,
                    row.len(),
                    dim
                )));
            }
            data.extend(row);
        }
        Ok(Self { data, dim })
    }

    /// Creates an empty multi-vector of the given dimension.
    pub fn empty(dim: usize) -> Self {
        Self {
            data: Vec::new(),
            dim,
        }
    }

    /// Number of vectors.
    pub fn rows(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    /// Dimension of every vector.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Returns true if there are no vectors.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the `index`-th vector.
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        if index >= self.rows() {
            return None;
        }
        let start = index * self.dim;
        Some(&self.data[start..start + self.dim])
    }

    /// Iterates over the vectors in order.
    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dim.max(1))
    }

    /// Flat row-major view of the data.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Mapping from patch index to page pixels, fixed when the page is rendered
/// for the model.
///
/// Patches are numbered row-major: index `i` lives at column `i % columns`,
/// row `i / columns`. Cell edges are distributed with integer division so the
/// cells tile the page exactly even when the page size is not a multiple of
/// the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatchGrid {
    /// Patches per row
    pub columns: u32,
    /// Patch rows
    pub rows: u32,
    /// Width of the page raster in pixels
    pub page_width: u32,
    /// Height of the page raster in pixels
    pub page_height: u32,
}

impl PatchGrid {
    /// Creates a grid over a page of the given pixel size.
    pub fn new(columns: u32, rows: u32, page_width: u32, page_height: u32) -> Self {
        Self {
            columns,
            rows,
            page_width,
            page_height,
        }
    }

    /// Total number of patches.
    pub fn len(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// Returns true if the grid has no cells.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pixel rectangle covered by patch `index`, or `None` if out of range.
    pub fn patch_rect(&self, index: usize) -> Option<Rect> {
        if index >= self.len() {
            return None;
        }
        let columns = self.columns as u64;
        let rows = self.rows as u64;
        let col = index as u64 % columns;
        let row = index as u64 / columns;

        let x0 = col * self.page_width as u64 / columns;
        let x1 = (col + 1) * self.page_width as u64 / columns;
        let y0 = row * self.page_height as u64 / rows;
        let y1 = (row + 1) * self.page_height as u64 / rows;

        Some(Rect::new(
            x0 as u32,
            y0 as u32,
            (x1 - x0) as u32,
            (y1 - y0) as u32,
        ))
    }
}

/// Output of embedding one page image.
#[derive(Debug, Clone, PartialEq)]
pub struct PageEmbedding {
    /// One vector per patch, in grid order
    pub patches: MultiVector,
    /// Grid the patches were computed on
    pub grid: PatchGrid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_and_row_access() {
        let mv = MultiVector::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]])
            .unwrap();
        assert_eq!(mv.rows(), 3);
        assert_eq!(mv.dim(), 2);
        assert_eq!(mv.row(1), Some(&[0.0, 1.0][..]));
        assert_eq!(mv.row(3), None);
        assert_eq!(mv.iter().count(), 3);
    }

    #[test]
    fn test_from_rows_rejects_ragged_input() {
        let result = MultiVector::from_rows(vec![vec![1.0, 0.0], vec![1.0]]);
        assert!(matches!(result, Err(EmbeddingError::MalformedOutput(_))));
    }

    #[test]
    fn test_new_rejects_partial_row() {
        assert!(MultiVector::new(vec![1.0, 2.0, 3.0], 2).is_err());
        assert!(MultiVector::new(vec![1.0], 0).is_err());
        assert!(MultiVector::new(Vec::new(), 0).unwrap().is_empty());
    }

    #[test]
    fn test_empty_rows_make_empty_vector() {
        let mv = MultiVector::from_rows(Vec::new()).unwrap();
        assert!(mv.is_empty());
        assert_eq!(mv.rows(), 0);
        assert_eq!(mv.iter().count(), 0);
    }

    #[test]
    fn test_patch_rect_row_major() {
        let grid = PatchGrid::new(2, 2, 100, 60);
        assert_eq!(grid.len(), 4);
        assert_eq!(grid.patch_rect(0), Some(Rect::new(0, 0, 50, 30)));
        assert_eq!(grid.patch_rect(1), Some(Rect::new(50, 0, 50, 30)));
        assert_eq!(grid.patch_rect(2), Some(Rect::new(0, 30, 50, 30)));
        assert_eq!(grid.patch_rect(3), Some(Rect::new(50, 30, 50, 30)));
        assert_eq!(grid.patch_rect(4), None);
    }

    #[test]
    fn test_patch_rects_tile_uneven_page() {
        let grid = PatchGrid::new(3, 1, 10, 9);
        let widths: Vec<u32> = (0..3)
            .map(|i| grid.patch_rect(i).unwrap().width)
            .collect();
        assert_eq!(widths.iter().sum::<u32>(), 10);
        assert_eq!(grid.patch_rect(2).unwrap().right(), 10);
    }
}
