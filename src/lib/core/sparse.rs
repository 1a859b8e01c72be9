//! Sparse matrix utilities shared across cellfuse

use crate::core::error::{CellfuseError, Result};
use itertools::Itertools;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;

pub struct SparseOps;

impl SparseOps {
    /// Create a COO matrix from triplets, validating every index against the shape.
    pub fn coo_from_triplets(
        nrows: usize,
        ncols: usize,
        triplets: Vec<(usize, usize, f32)>,
    ) -> Result<CooMatrix<f32>> {
        if triplets.is_empty() {
            return Ok(CooMatrix::new(nrows, ncols));
        }

        for &(row, col, _) in &triplets {
            if row >= nrows || col >= ncols {
                return Err(CellfuseError::InvalidInput(format!(
                    "Index ({}, {}) exceeds matrix dimensions ({}, {})",
                    row, col, nrows, ncols
                )));
            }
        }

        let (row_indices, col_indices, values): (Vec<_>, Vec<_>, Vec<_>) =
            triplets.into_iter().multiunzip();

        CooMatrix::try_from_triplets(nrows, ncols, row_indices, col_indices, values)
            .map_err(|e| CellfuseError::SparseMatrix(format!("COO creation failed: {:?}", e)))
    }

    /// Create a CSR matrix from triplets using the native COO → CSR conversion.
    pub fn csr_from_triplets(
        nrows: usize,
        ncols: usize,
        triplets: Vec<(usize, usize, f32)>,
    ) -> Result<CsrMatrix<f32>> {
        if nrows == 0 || ncols == 0 || triplets.is_empty() {
            return Ok(CsrMatrix::zeros(nrows, ncols));
        }
        let coo = Self::coo_from_triplets(nrows, ncols, triplets)?;
        Ok(CsrMatrix::from(&coo))
    }

    /// Extract the sub-matrix at `rows` × `cols` (both in output order) as COO.
    ///
    /// Output row `i` is input row `rows[i]`, output column `j` is input column
    /// `cols[j]`. Explicit zeros are dropped.
    pub fn select_submatrix(
        matrix: &CsrMatrix<f32>,
        rows: &[usize],
        cols: &[usize],
    ) -> Result<CooMatrix<f32>> {
        let ncols = matrix.ncols();
        if let Some(&bad) = rows.iter().find(|&&r| r >= matrix.nrows()) {
            return Err(CellfuseError::InvalidInput(format!(
                "Row position {} out of bounds for {} rows",
                bad,
                matrix.nrows()
            )));
        }

        // old column -> new column
        let mut col_map: Vec<Option<usize>> = vec![None; ncols];
        for (new_idx, &old_idx) in cols.iter().enumerate() {
            if old_idx >= ncols {
                return Err(CellfuseError::InvalidInput(format!(
                    "Column position {} out of bounds for {} columns",
                    old_idx, ncols
                )));
            }
            col_map[old_idx] = Some(new_idx);
        }

        let mut coo = CooMatrix::new(rows.len(), cols.len());
        for (new_row, &old_row) in rows.iter().enumerate() {
            let row = matrix.row(old_row);
            for (&old_col, &val) in row.col_indices().iter().zip(row.values()) {
                if val == 0.0 {
                    continue;
                }
                if let Some(new_col) = col_map[old_col] {
                    coo.push(new_row, new_col, val);
                }
            }
        }
        Ok(coo)
    }

    /// Swap the axes of a CSR matrix into COO form, dropping explicit zeros.
    pub fn transpose_to_coo(matrix: &CsrMatrix<f32>) -> CooMatrix<f32> {
        let mut transposed = CooMatrix::new(matrix.ncols(), matrix.nrows());
        for (row, col, &val) in matrix.triplet_iter() {
            if val != 0.0 {
                transposed.push(col, row, val);
            }
        }
        transposed
    }

    /// Sort triplets by (row, col) and sum duplicates.
    pub fn sort_and_merge(mut triplets: Vec<(usize, usize, f32)>) -> Vec<(usize, usize, f32)> {
        triplets.par_sort_unstable_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut merged: Vec<(usize, usize, f32)> = Vec::with_capacity(triplets.len());
        for (row, col, val) in triplets {
            match merged.last_mut() {
                Some(last) if last.0 == row && last.1 == col => last.2 += val,
                _ => merged.push((row, col, val)),
            }
        }
        merged
    }

    /// Density and stored entry count of a matrix.
    pub fn get_density_stats(matrix: &CooMatrix<f32>) -> (f64, usize) {
        let total_elements = matrix.nrows() * matrix.ncols();
        let nnz = matrix.nnz();
        let density = if total_elements > 0 {
            nnz as f64 / total_elements as f64
        } else {
            0.0
        };
        (density, nnz)
    }
}
