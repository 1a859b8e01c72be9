//! In-memory datasets

use super::{AttributeValues, Axis, Dataset, DatasetProvider};
use crate::core::error::{CellfuseError, Result};
use crate::core::sparse::SparseOps;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rustc_hash::FxHashMap;

/// A dataset held entirely in memory: feature × sample CSR layers plus attribute
/// arrays along both axes.
#[derive(Debug, Clone)]
pub struct MemoryDataset {
    name: String,
    n_features: usize,
    n_samples: usize,
    layers: FxHashMap<String, CsrMatrix<f32>>,
    row_attrs: FxHashMap<String, AttributeValues>,
    col_attrs: FxHashMap<String, AttributeValues>,
}

impl MemoryDataset {
    pub fn new(name: impl Into<String>, n_features: usize, n_samples: usize) -> Self {
        Self {
            name: name.into(),
            n_features,
            n_samples,
            layers: FxHashMap::default(),
            row_attrs: FxHashMap::default(),
            col_attrs: FxHashMap::default(),
        }
    }

    /// Add a layer; its shape must be `(n_features, n_samples)`.
    pub fn with_layer(mut self, name: impl Into<String>, matrix: CsrMatrix<f32>) -> Result<Self> {
        let name = name.into();
        if matrix.nrows() != self.n_features || matrix.ncols() != self.n_samples {
            return Err(CellfuseError::DimensionMismatch {
                expected: format!("Layer '{}' {}×{}", name, self.n_features, self.n_samples),
                actual: format!("Layer '{}' {}×{}", name, matrix.nrows(), matrix.ncols()),
            });
        }
        self.layers.insert(name, matrix);
        Ok(self)
    }

    pub fn with_row_attribute(self, name: impl Into<String>, values: AttributeValues) -> Result<Self> {
        self.with_attribute(Axis::Row, name.into(), values)
    }

    pub fn with_column_attribute(
        self,
        name: impl Into<String>,
        values: AttributeValues,
    ) -> Result<Self> {
        self.with_attribute(Axis::Column, name.into(), values)
    }

    fn with_attribute(mut self, axis: Axis, name: String, values: AttributeValues) -> Result<Self> {
        let expected = self.dimension(axis);
        if values.len() != expected {
            return Err(CellfuseError::DimensionMismatch {
                expected: format!("{} attribute '{}' length = {}", axis, name, expected),
                actual: format!("{} attribute '{}' length = {}", axis, name, values.len()),
            });
        }
        match axis {
            Axis::Row => self.row_attrs.insert(name, values),
            Axis::Column => self.col_attrs.insert(name, values),
        };
        Ok(self)
    }
}

impl Dataset for MemoryDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> (usize, usize) {
        (self.n_features, self.n_samples)
    }

    fn read_attribute(&self, axis: Axis, name: &str) -> Result<AttributeValues> {
        let attrs = match axis {
            Axis::Row => &self.row_attrs,
            Axis::Column => &self.col_attrs,
        };
        attrs
            .get(name)
            .cloned()
            .ok_or_else(|| CellfuseError::AttributeNotFound {
                dataset: self.name.clone(),
                axis: axis.to_string(),
                name: name.to_string(),
            })
    }

    fn read_sparse_slice(
        &self,
        layer: &str,
        rows: &[usize],
        cols: &[usize],
    ) -> Result<CooMatrix<f32>> {
        let matrix = self.layers.get(layer).ok_or_else(|| {
            CellfuseError::InvalidInput(format!(
                "Layer '{}' not found in {}. Available layers: {:?}",
                layer,
                self.name,
                self.layers.keys().collect::<Vec<_>>()
            ))
        })?;
        SparseOps::select_submatrix(matrix, rows, cols)
    }
}

/// Named in-memory datasets, opened by file reference.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    datasets: FxHashMap<String, MemoryDataset>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dataset under its own name.
    pub fn insert(&mut self, dataset: MemoryDataset) {
        self.datasets.insert(dataset.name.clone(), dataset);
    }
}

impl DatasetProvider for MemoryCatalog {
    fn open(&self, file: &str) -> Result<Box<dyn Dataset>> {
        self.datasets
            .get(file)
            .cloned()
            .map(|ds| Box::new(ds) as Box<dyn Dataset>)
            .ok_or_else(|| CellfuseError::FileNotFound(format!("No dataset named {}", file)))
    }
}
