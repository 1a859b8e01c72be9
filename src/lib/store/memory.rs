//! In-memory output store

use super::{ColumnAttributes, StoreBackend};
use crate::core::error::{CellfuseError, Result};
use nalgebra_sparse::CooMatrix;
use rayon::prelude::*;

/// Accumulates the merged matrix and its attributes in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    feature_ids: Vec<String>,
    col_attrs: ColumnAttributes,
    triplets: Vec<(usize, usize, f32)>,
    n_columns: usize,
    created: bool,
    finished: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    pub fn column_attributes(&self) -> &ColumnAttributes {
        &self.col_attrs
    }

    /// `(features, samples)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.feature_ids.len(), self.n_columns)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Stored entries as `(feature, sample, value)`, sorted by feature then sample.
    /// Duplicate coordinates are kept as written.
    pub fn entries(&self) -> Vec<(usize, usize, f32)> {
        let mut entries = self.triplets.clone();
        entries.par_sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        entries
    }

    fn push_block(&mut self, matrix: &CooMatrix<f32>) -> Result<()> {
        if matrix.nrows() != self.feature_ids.len() {
            return Err(CellfuseError::SchemaMismatch(format!(
                "appended block has {} rows, store has {}",
                matrix.nrows(),
                self.feature_ids.len()
            )));
        }
        let offset = self.n_columns;
        self.triplets.extend(
            matrix
                .triplet_iter()
                .map(|(row, col, &val)| (row, offset + col, val)),
        );
        self.n_columns += matrix.ncols();
        Ok(())
    }
}

impl StoreBackend for MemoryStore {
    fn create_store(
        &mut self,
        row_attrs: &[String],
        col_attrs: &ColumnAttributes,
        matrix: &CooMatrix<f32>,
    ) -> Result<()> {
        if self.created {
            return Err(CellfuseError::SchemaMismatch(
                "memory store already created".to_string(),
            ));
        }
        self.feature_ids = row_attrs.to_vec();
        self.col_attrs = col_attrs.clone();
        self.created = true;
        self.push_block(matrix)
    }

    fn append_columns(
        &mut self,
        matrix: &CooMatrix<f32>,
        col_attrs: &ColumnAttributes,
    ) -> Result<()> {
        if !self.created || self.finished {
            return Err(CellfuseError::SchemaMismatch(
                "memory store is not open for appends".to_string(),
            ));
        }
        self.push_block(matrix)?;
        self.col_attrs.extend(col_attrs)
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
