//! Read-only access to feature × sample count datasets
//!
//! The merge engines only see a dataset through the [`Dataset`] trait: attribute
//! arrays along either axis and sparse slices of a named layer. Rows are features,
//! columns are samples, regardless of how a backend stores them.
//!
//! - [`memory`]: in-memory datasets built from CSR layers
//! - [`h5ad`]: AnnData (H5AD) files, read through `anndata`/`anndata-hdf5`

pub mod h5ad;
pub mod memory;

pub use h5ad::{H5adDataset, H5adProvider};
pub use memory::{MemoryCatalog, MemoryDataset};

use crate::core::error::{CellfuseError, Result};
use nalgebra_sparse::CooMatrix;
use std::fmt;
use std::slice::Chunks;

/// Matrix axis: rows hold features, columns hold samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Row,
    Column,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Row => write!(f, "row"),
            Axis::Column => write!(f, "column"),
        }
    }
}

/// An ordered attribute array attached to one axis of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValues {
    Strings(Vec<String>),
    Bools(Vec<bool>),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
}

impl AttributeValues {
    pub fn len(&self) -> usize {
        match self {
            AttributeValues::Strings(v) => v.len(),
            AttributeValues::Bools(v) => v.len(),
            AttributeValues::Ints(v) => v.len(),
            AttributeValues::Floats(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Truthiness of every entry: `true`, non-zero numbers and non-empty strings.
    /// NaN counts as false.
    pub fn truthy(&self) -> Vec<bool> {
        match self {
            AttributeValues::Bools(v) => v.clone(),
            AttributeValues::Ints(v) => v.iter().map(|&x| x != 0).collect(),
            AttributeValues::Floats(v) => v.iter().map(|&x| x != 0.0 && !x.is_nan()).collect(),
            AttributeValues::Strings(v) => v.iter().map(|s| !s.is_empty()).collect(),
        }
    }

    /// Render the entries at `positions` as strings, in the given order.
    pub fn select_strings(&self, positions: &[usize]) -> Result<Vec<String>> {
        let len = self.len();
        if let Some(&bad) = positions.iter().find(|&&p| p >= len) {
            return Err(CellfuseError::InvalidInput(format!(
                "Attribute position {} out of bounds for length {}",
                bad, len
            )));
        }
        let rendered = match self {
            AttributeValues::Strings(v) => positions.iter().map(|&p| v[p].clone()).collect(),
            AttributeValues::Bools(v) => positions.iter().map(|&p| v[p].to_string()).collect(),
            AttributeValues::Ints(v) => positions.iter().map(|&p| v[p].to_string()).collect(),
            AttributeValues::Floats(v) => positions.iter().map(|&p| v[p].to_string()).collect(),
        };
        Ok(rendered)
    }
}

/// Narrow read contract the merge engines need from a dataset.
pub trait Dataset {
    /// Human readable identifier used in logs and errors.
    fn name(&self) -> &str;

    /// `(features, samples)`.
    fn shape(&self) -> (usize, usize);

    fn dimension(&self, axis: Axis) -> usize {
        let (rows, cols) = self.shape();
        match axis {
            Axis::Row => rows,
            Axis::Column => cols,
        }
    }

    /// Read a full attribute array along `axis`.
    ///
    /// Fails with [`CellfuseError::AttributeNotFound`] when the dataset has no such
    /// attribute.
    fn read_attribute(&self, axis: Axis, name: &str) -> Result<AttributeValues>;

    /// Read `layer` restricted to `rows` × `cols`, as a feature × sample COO matrix
    /// of shape `(rows.len(), cols.len())`. Output row `i` is dataset row `rows[i]`.
    fn read_sparse_slice(&self, layer: &str, rows: &[usize], cols: &[usize])
        -> Result<CooMatrix<f32>>;
}

impl<'d> dyn Dataset + 'd {
    /// Iterate the selected columns in blocks of at most `block_size`.
    pub fn column_blocks<'a>(
        &'a self,
        layer: &'a str,
        rows: &'a [usize],
        cols: &'a [usize],
        block_size: usize,
    ) -> Result<ColumnBlocks<'a>> {
        ColumnBlocks::new(self, layer, rows, cols, block_size)
    }
}

/// Opens the file references of a merge request.
pub trait DatasetProvider {
    fn open(&self, file: &str) -> Result<Box<dyn Dataset>>;
}

/// One block of consecutive selected columns and its sparse slice.
#[derive(Debug, Clone)]
pub struct ColumnBlock {
    /// Dataset column positions covered by this block.
    pub positions: Vec<usize>,
    /// `rows.len() × positions.len()` slice in feature × sample orientation.
    pub matrix: CooMatrix<f32>,
}

/// Lazy, single-pass iterator over the selected columns of a dataset in blocks of
/// at most `block_size` columns. Only one block is resident at a time.
pub struct ColumnBlocks<'a> {
    dataset: &'a dyn Dataset,
    layer: &'a str,
    rows: &'a [usize],
    chunks: Chunks<'a, usize>,
}

impl<'a> ColumnBlocks<'a> {
    pub fn new(
        dataset: &'a dyn Dataset,
        layer: &'a str,
        rows: &'a [usize],
        cols: &'a [usize],
        block_size: usize,
    ) -> Result<Self> {
        if block_size == 0 {
            return Err(CellfuseError::InvalidInput(
                "block size must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            dataset,
            layer,
            rows,
            chunks: cols.chunks(block_size),
        })
    }
}

impl Iterator for ColumnBlocks<'_> {
    type Item = Result<ColumnBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        let positions = self.chunks.next()?;
        Some(
            self.dataset
                .read_sparse_slice(self.layer, self.rows, positions)
                .map(|matrix| ColumnBlock {
                    positions: positions.to_vec(),
                    matrix,
                }),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}
