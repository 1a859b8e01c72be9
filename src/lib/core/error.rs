//! Error types for the cellfuse library

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CellfuseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("AnnData error: {0}")]
    AnnData(#[from] anyhow::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Sparse matrix error: {0}")]
    SparseMatrix(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Attribute '{name}' not found on {axis} axis of {dataset}")]
    AttributeNotFound {
        dataset: String,
        axis: String,
        name: String,
    },

    #[error("Feature alignment failed for {dataset}: {} identifier(s) missing from canonical order ({})", .missing.len(), preview(.missing))]
    FeatureAlignment {
        dataset: String,
        missing: Vec<String>,
    },

    #[error("Duplicate feature identifier(s) in {dataset}: {}", preview(.duplicates))]
    DuplicateFeature {
        dataset: String,
        duplicates: Vec<String>,
    },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Parameter shape error: {0}")]
    ParameterShape(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },
}

pub type Result<T> = std::result::Result<T, CellfuseError>;

impl From<nalgebra_sparse::SparseFormatError> for CellfuseError {
    fn from(err: nalgebra_sparse::SparseFormatError) -> Self {
        CellfuseError::SparseMatrix(format!("Sparse format error: {:?}", err))
    }
}

/// First few identifiers of a list, for error messages.
fn preview(ids: &[String]) -> String {
    const SHOWN: usize = 10;
    if ids.len() <= SHOWN {
        ids.join(", ")
    } else {
        format!("{}, ... (+{} more)", ids[..SHOWN].join(", "), ids.len() - SHOWN)
    }
}
