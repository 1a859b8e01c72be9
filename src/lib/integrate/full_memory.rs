//! Full-memory merge engine
//!
//! Loads every dataset's selected sub-matrix at once and outer-joins them on
//! feature identifier. Canonical rows are the source features in order, followed by
//! features first seen in later tables in order of appearance. Samples of a table
//! lacking a feature hold zero for it.

use super::alignment::{find_duplicates, read_feature_ids};
use super::request::DatasetSpec;
use super::selection::resolve_selection;
use crate::core::error::{CellfuseError, Result};
use crate::core::sparse::SparseOps;
use crate::dataset::{Axis, DatasetProvider};
use crate::store::ColumnAttributes;
use log::{debug, info};
use nalgebra_sparse::CooMatrix;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

/// One dataset loaded completely: features × samples with its identifiers.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub origin: String,
    pub feature_ids: Vec<String>,
    pub matrix: CooMatrix<f32>,
    pub col_attrs: ColumnAttributes,
}

impl FeatureTable {
    pub fn load(provider: &dyn DatasetProvider, spec: &DatasetSpec, strip: bool) -> Result<Self> {
        let dataset = provider.open(&spec.file)?;
        let rows = resolve_selection(&*dataset, Axis::Row, spec.valid_rows.as_deref())?;
        let cols = resolve_selection(&*dataset, Axis::Column, spec.valid_cols.as_deref())?;

        let feature_ids = read_feature_ids(&*dataset, &rows, &spec.feat_attr, strip)?;
        let duplicates = find_duplicates(&feature_ids);
        if !duplicates.is_empty() {
            return Err(CellfuseError::DuplicateFeature {
                dataset: dataset.name().to_string(),
                duplicates,
            });
        }

        let cell_ids = dataset
            .read_attribute(Axis::Column, &spec.cell_attr)?
            .select_strings(cols.positions())?;
        let matrix = dataset.read_sparse_slice(&spec.layer, rows.positions(), cols.positions())?;
        let (density, nnz) = SparseOps::get_density_stats(&matrix);
        info!(
            "Loaded {}: {} features × {} samples, {} non-zero ({:.4}% dense)",
            dataset.name(),
            matrix.nrows(),
            matrix.ncols(),
            nnz,
            density * 100.0
        );

        Ok(Self {
            origin: dataset.name().to_string(),
            feature_ids,
            matrix,
            col_attrs: ColumnAttributes::labelled(cell_ids, &spec.file, spec.label.as_deref()),
        })
    }
}

/// Result of the outer join.
#[derive(Debug, Clone)]
pub struct MergedTable {
    pub feature_ids: Vec<String>,
    pub matrix: CooMatrix<f32>,
    pub col_attrs: ColumnAttributes,
}

/// Outer-join `tables` on feature identifier and concatenate them along samples.
pub fn merge_tables(tables: &[FeatureTable], with_modality: bool) -> Result<MergedTable> {
    let mut feature_ids: Vec<String> = Vec::new();
    let mut lookup: FxHashMap<String, usize> = FxHashMap::default();
    let mut col_attrs = ColumnAttributes::empty(with_modality);
    let mut triplets: Vec<(usize, usize, f32)> = Vec::new();
    let mut offset = 0;

    for table in tables {
        if table.matrix.nrows() != table.feature_ids.len() {
            return Err(CellfuseError::DimensionMismatch {
                expected: format!("{} rows in {}", table.feature_ids.len(), table.origin),
                actual: format!("{} rows", table.matrix.nrows()),
            });
        }

        let before = feature_ids.len();
        let row_map: Vec<usize> = table
            .feature_ids
            .iter()
            .map(|id| {
                *lookup.entry(id.clone()).or_insert_with(|| {
                    feature_ids.push(id.clone());
                    feature_ids.len() - 1
                })
            })
            .collect();
        if feature_ids.len() > before && before > 0 {
            debug!(
                "{} adds {} feature(s) absent from earlier tables",
                table.origin,
                feature_ids.len() - before
            );
        }

        triplets.par_extend(
            table
                .matrix
                .row_indices()
                .par_iter()
                .zip(table.matrix.col_indices().par_iter())
                .zip(table.matrix.values().par_iter())
                .map(|((&row, &col), &val)| (row_map[row], offset + col, val)),
        );
        col_attrs.extend(&table.col_attrs)?;
        offset += table.matrix.ncols();
    }

    let matrix = SparseOps::coo_from_triplets(feature_ids.len(), offset, triplets)?;
    info!(
        "Joined {} table(s): {} features × {} samples",
        tables.len(),
        feature_ids.len(),
        offset
    );
    Ok(MergedTable {
        feature_ids,
        matrix,
        col_attrs,
    })
}

/// Load every dataset of a merge, source first, and join them.
pub fn merge_all(
    provider: &dyn DatasetProvider,
    source: &DatasetSpec,
    targets: &[DatasetSpec],
    strip: bool,
) -> Result<MergedTable> {
    let tables = std::iter::once(source)
        .chain(targets.iter())
        .map(|spec| FeatureTable::load(provider, spec, strip))
        .collect::<Result<Vec<_>>>()?;
    merge_tables(&tables, source.label.is_some())
}
