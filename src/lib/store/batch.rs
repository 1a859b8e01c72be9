//! Units of data handed to the output store

use crate::core::error::{CellfuseError, Result};
use nalgebra_sparse::CooMatrix;

/// Per-sample attribute arrays, all of equal length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnAttributes {
    pub cell_ids: Vec<String>,
    pub original_files: Vec<String>,
    pub modalities: Option<Vec<String>>,
}

impl ColumnAttributes {
    /// Attributes for samples of one dataset: file and modality labels are repeated.
    pub fn labelled(cell_ids: Vec<String>, original_file: &str, modality: Option<&str>) -> Self {
        let n = cell_ids.len();
        Self {
            cell_ids,
            original_files: vec![original_file.to_string(); n],
            modalities: modality.map(|label| vec![label.to_string(); n]),
        }
    }

    /// An empty attribute set with the given key layout.
    pub fn empty(with_modality: bool) -> Self {
        Self {
            cell_ids: Vec::new(),
            original_files: Vec::new(),
            modalities: with_modality.then(Vec::new),
        }
    }

    pub fn len(&self) -> usize {
        self.cell_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cell_ids.is_empty()
    }

    pub fn has_modality(&self) -> bool {
        self.modalities.is_some()
    }

    /// Check that every array has the same length.
    pub fn validate(&self) -> Result<()> {
        let n = self.cell_ids.len();
        let modality_len = self.modalities.as_ref().map_or(n, Vec::len);
        if self.original_files.len() != n || modality_len != n {
            return Err(CellfuseError::SchemaMismatch(format!(
                "column attribute lengths differ: CellID={}, OriginalFile={}, Modality={}",
                n,
                self.original_files.len(),
                modality_len
            )));
        }
        Ok(())
    }

    /// Append `other` after `self`, preserving arrival order.
    pub fn extend(&mut self, other: &ColumnAttributes) -> Result<()> {
        if self.has_modality() != other.has_modality() {
            return Err(CellfuseError::SchemaMismatch(
                "Modality column present in one block but not the other".to_string(),
            ));
        }
        self.cell_ids.extend_from_slice(&other.cell_ids);
        self.original_files.extend_from_slice(&other.original_files);
        if let (Some(mine), Some(theirs)) = (self.modalities.as_mut(), other.modalities.as_ref()) {
            mine.extend_from_slice(theirs);
        }
        Ok(())
    }
}

/// A bounded block of samples: canonical features × block samples plus their
/// column attributes.
#[derive(Debug, Clone)]
pub struct SampleBatch {
    pub matrix: CooMatrix<f32>,
    pub col_attrs: ColumnAttributes,
}

impl SampleBatch {
    pub fn new(matrix: CooMatrix<f32>, col_attrs: ColumnAttributes) -> Result<Self> {
        col_attrs.validate()?;
        if matrix.ncols() != col_attrs.len() {
            return Err(CellfuseError::SchemaMismatch(format!(
                "batch has {} matrix columns but {} column attribute entries",
                matrix.ncols(),
                col_attrs.len()
            )));
        }
        Ok(Self { matrix, col_attrs })
    }

    pub fn n_rows(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_columns(&self) -> usize {
        self.matrix.ncols()
    }
}
