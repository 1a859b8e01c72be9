//! Row remapping of sample chunks onto the canonical feature order

use super::alignment::FeatureAlignment;
use crate::core::error::{CellfuseError, Result};
use nalgebra_sparse::CooMatrix;
use rayon::prelude::*;

/// Place the rows of `chunk` at their canonical positions.
///
/// `chunk` is `alignment.len() × k`; the result is `output_rows × k`. Every entry
/// keeps its column and value, only its row index changes. Canonical rows without a
/// local feature stay empty.
pub fn remap(
    chunk: &CooMatrix<f32>,
    alignment: &FeatureAlignment,
    output_rows: usize,
) -> Result<CooMatrix<f32>> {
    if chunk.nrows() != alignment.len() {
        return Err(CellfuseError::DimensionMismatch {
            expected: format!("{} rows (aligned features)", alignment.len()),
            actual: format!("{} rows", chunk.nrows()),
        });
    }
    if let Some(&bad) = alignment.as_slice().iter().find(|&&t| t >= output_rows) {
        return Err(CellfuseError::InvalidInput(format!(
            "Canonical row {} out of bounds for {} output rows",
            bad, output_rows
        )));
    }

    if chunk.nnz() == 0 {
        return Ok(CooMatrix::new(output_rows, chunk.ncols()));
    }

    let targets = alignment.as_slice();
    let rows: Vec<usize> = chunk
        .row_indices()
        .par_iter()
        .map(|&r| targets[r])
        .collect();

    CooMatrix::try_from_triplets(
        output_rows,
        chunk.ncols(),
        rows,
        chunk.col_indices().to_vec(),
        chunk.values().to_vec(),
    )
    .map_err(|e| CellfuseError::SparseMatrix(format!("remap failed: {:?}", e)))
}
