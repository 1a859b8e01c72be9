//! AnnData (H5AD) datasets
//!
//! H5AD stores the count matrix as samples × features (`obs` × `var`). Slices are
//! transposed on read so callers always see features as rows.

use super::{AttributeValues, Axis, Dataset, DatasetProvider};
use crate::core::error::{CellfuseError, Result};
use crate::core::sparse::SparseOps;
use anndata::data::{ArrayData, CsrNonCanonical, Element, SelectInfoElem};
use anndata::{AnnData, AnnDataOp, ArrayElemOp, AxisArraysOp, Backend};
use anndata_hdf5::H5;
use log::{debug, info};
use nalgebra_sparse::{CooMatrix, CscMatrix, CsrMatrix};
use ndarray::Array2;
use polars::prelude::*;
use std::convert::TryFrom;
use std::path::Path;

/// Layer names that address the main `X` matrix.
const MAIN_MATRIX_NAMES: &[&str] = &["", "X"];

/// A read-only H5AD file.
pub struct H5adDataset {
    path: String,
    adata: AnnData<H5>,
    n_obs: usize,
    n_vars: usize,
}

impl H5adDataset {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CellfuseError::FileNotFound(format!(
                "File not found: {}",
                path.display()
            )));
        }

        let file = H5::open(path).map_err(|e| {
            CellfuseError::InvalidInput(format!("Failed to open H5 file {}: {:?}", path.display(), e))
        })?;
        let adata = AnnData::<H5>::open(file)?;
        let n_obs = adata.n_obs();
        let n_vars = adata.n_vars();
        info!(
            "Opened {}: {} features × {} samples",
            path.display(),
            n_vars,
            n_obs
        );

        Ok(Self {
            path: path.display().to_string(),
            adata,
            n_obs,
            n_vars,
        })
    }

    fn read_index(&self, axis: Axis) -> Vec<String> {
        match axis {
            Axis::Row => self.adata.var_names().into_vec(),
            Axis::Column => self.adata.obs_names().into_vec(),
        }
    }
}

impl Dataset for H5adDataset {
    fn name(&self) -> &str {
        &self.path
    }

    fn shape(&self) -> (usize, usize) {
        (self.n_vars, self.n_obs)
    }

    fn read_attribute(&self, axis: Axis, name: &str) -> Result<AttributeValues> {
        let index_alias = match axis {
            Axis::Row => "var_names",
            Axis::Column => "obs_names",
        };
        if name == "_index" || name == index_alias {
            return Ok(AttributeValues::Strings(self.read_index(axis)));
        }

        let frame = match axis {
            Axis::Row => self.adata.read_var()?,
            Axis::Column => self.adata.read_obs()?,
        };
        let column = frame
            .column(name)
            .map_err(|_| CellfuseError::AttributeNotFound {
                dataset: self.path.clone(),
                axis: axis.to_string(),
                name: name.to_string(),
            })?;
        debug!("Read {} attribute '{}' from {}", axis, name, self.path);
        column_to_values(column.as_materialized_series())
    }

    fn read_sparse_slice(
        &self,
        layer: &str,
        rows: &[usize],
        cols: &[usize],
    ) -> Result<CooMatrix<f32>> {
        if rows.is_empty() || cols.is_empty() {
            return Ok(CooMatrix::new(rows.len(), cols.len()));
        }

        // obs (samples) first, then var (features)
        let selection = [
            SelectInfoElem::Index(cols.to_vec()),
            SelectInfoElem::Index(rows.to_vec()),
        ];
        let data: Option<ArrayData> = if MAIN_MATRIX_NAMES.contains(&layer) {
            self.adata.x().slice::<ArrayData, _>(&selection)?
        } else {
            self.adata
                .layers()
                .get_item_slice::<ArrayData, _>(layer, &selection)?
        };
        let data = data.ok_or_else(|| {
            CellfuseError::InvalidInput(format!("Layer '{}' not found in {}", layer, self.path))
        })?;

        let by_sample = convert_array_to_csr_f32(data)?;
        if by_sample.nrows() != cols.len() || by_sample.ncols() != rows.len() {
            return Err(CellfuseError::DimensionMismatch {
                expected: format!("{}×{}", cols.len(), rows.len()),
                actual: format!("{}×{}", by_sample.nrows(), by_sample.ncols()),
            });
        }

        Ok(SparseOps::transpose_to_coo(&by_sample))
    }
}

/// Opens file references as H5AD datasets.
#[derive(Debug, Clone, Copy, Default)]
pub struct H5adProvider;

impl DatasetProvider for H5adProvider {
    fn open(&self, file: &str) -> Result<Box<dyn Dataset>> {
        Ok(Box::new(H5adDataset::open(file)?))
    }
}

fn column_to_values(series: &Series) -> Result<AttributeValues> {
    let values = match series.dtype() {
        DataType::Boolean => AttributeValues::Bools(
            series.bool()?.into_iter().map(|v| v.unwrap_or(false)).collect(),
        ),
        DataType::String => AttributeValues::Strings(
            series
                .str()?
                .into_iter()
                .map(|v| v.unwrap_or_default().to_string())
                .collect(),
        ),
        dtype if dtype.is_integer() => AttributeValues::Ints(
            series
                .cast(&DataType::Int64)?
                .i64()?
                .into_iter()
                .map(|v| v.unwrap_or(0))
                .collect(),
        ),
        dtype if dtype.is_float() => AttributeValues::Floats(
            series
                .cast(&DataType::Float64)?
                .f64()?
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect(),
        ),
        // categoricals and anything else are read back as their string form
        _ => AttributeValues::Strings(
            series
                .cast(&DataType::String)?
                .str()?
                .into_iter()
                .map(|v| v.unwrap_or_default().to_string())
                .collect(),
        ),
    };
    Ok(values)
}

/// Try each supported count dtype for one storage layout and hand the first match
/// to `$convert` with a cast to `f32`. Returns from the enclosing function.
macro_rules! convert_counts {
    (@try $data:ident, $layout:ident, $convert:ident, $($ty:ty),*) => {
        $(
            if let Ok(matrix) = $layout::<$ty>::try_from($data.clone()) {
                return $convert(matrix, |x: $ty| x as f32);
            }
        )*
    };
    ($data:expr, $layout:ident, $convert:ident) => {{
        let data: ArrayData = $data;
        convert_counts!(@try data, $layout, $convert, f32, f64, i32, i64, u16, u32, u64);
        Err(unsupported_counts(&data))
    }};
}

/// Convert a sliced count matrix of any on-disk layout to canonical CSR.
///
/// CSC is converted column-to-row, non-canonical CSR is rebuilt from its triplets
/// with duplicate entries summed, and dense arrays keep only their non-zero cells.
fn convert_array_to_csr_f32(array_data: ArrayData) -> Result<CsrMatrix<f32>> {
    match array_data {
        ArrayData::CsrMatrix(_) => convert_counts!(array_data, CsrMatrix, cast_csr),
        ArrayData::CscMatrix(_) => convert_counts!(array_data, CscMatrix, csc_to_csr),
        ArrayData::CsrNonCanonical(_) => {
            convert_counts!(array_data, CsrNonCanonical, noncanonical_to_csr)
        }
        ArrayData::Array(_) => convert_counts!(array_data, Array2, dense_to_csr),
        other => Err(unsupported_counts(&other)),
    }
}

fn unsupported_counts(array_data: &ArrayData) -> CellfuseError {
    CellfuseError::InvalidInput(format!(
        "Unsupported array data type for counts: {:?}",
        array_data.data_type()
    ))
}

fn cast_csr<T: Copy>(matrix: CsrMatrix<T>, cast: impl Fn(T) -> f32) -> Result<CsrMatrix<f32>> {
    let (nrows, ncols) = (matrix.nrows(), matrix.ncols());
    let (row_offsets, col_indices, values) = matrix.disassemble();
    let values = values.into_iter().map(cast).collect();
    Ok(CsrMatrix::try_from_csr_data(
        nrows,
        ncols,
        row_offsets,
        col_indices,
        values,
    )?)
}

fn csc_to_csr<T: Copy>(matrix: CscMatrix<T>, cast: impl Fn(T) -> f32) -> Result<CsrMatrix<f32>> {
    let (nrows, ncols) = (matrix.nrows(), matrix.ncols());
    let (col_offsets, row_indices, values) = matrix.disassemble();
    let values = values.into_iter().map(cast).collect();
    let csc = CscMatrix::try_from_csc_data(nrows, ncols, col_offsets, row_indices, values)?;
    Ok(CsrMatrix::from(&csc))
}

fn noncanonical_to_csr<T: Copy>(
    matrix: CsrNonCanonical<T>,
    cast: impl Fn(T) -> f32,
) -> Result<CsrMatrix<f32>> {
    let (nrows, ncols) = (matrix.nrows(), matrix.ncols());
    let (row_offsets, col_indices, values) = matrix.csr_data();
    if row_offsets.len() != nrows + 1
        || col_indices.len() != values.len()
        || row_offsets.last().copied().unwrap_or(0) > values.len()
        || row_offsets.windows(2).any(|w| w[0] > w[1])
    {
        return Err(CellfuseError::SparseMatrix(format!(
            "malformed CSR offsets for a {}×{} matrix",
            nrows, ncols
        )));
    }

    let mut triplets = Vec::with_capacity(values.len());
    for (row, bounds) in row_offsets.windows(2).enumerate() {
        for i in bounds[0]..bounds[1] {
            triplets.push((row, col_indices[i], cast(values[i])));
        }
    }
    SparseOps::csr_from_triplets(nrows, ncols, triplets)
}

fn dense_to_csr<T: Copy>(array: Array2<T>, cast: impl Fn(T) -> f32) -> Result<CsrMatrix<f32>> {
    let (nrows, ncols) = array.dim();
    let triplets = array
        .indexed_iter()
        .filter_map(|((row, col), &value)| {
            let value = cast(value);
            (value != 0.0).then_some((row, col, value))
        })
        .collect();
    SparseOps::csr_from_triplets(nrows, ncols, triplets)
}
