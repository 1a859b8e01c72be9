//! Batch streaming engine
//!
//! Reads the selected samples of one dataset in blocks of at most `batch_size`
//! columns, places each block on the canonical rows and hands it to the output
//! writer. Only one block is resident at a time.

use super::alignment::{align, build_canonical, CanonicalFeatureOrder, FeatureAlignment};
use super::remap::remap;
use super::request::DatasetSpec;
use super::selection::{resolve_selection, ValiditySelection};
use crate::core::error::{CellfuseError, Result};
use crate::dataset::{Axis, Dataset, DatasetProvider};
use crate::store::{ColumnAttributes, OutputStoreWriter, SampleBatch, StoreBackend};
use log::{debug, info};

/// An opened dataset with its selections and alignment resolved.
pub struct PreparedDataset {
    pub dataset: Box<dyn Dataset>,
    pub spec: DatasetSpec,
    pub rows: ValiditySelection,
    pub cols: ValiditySelection,
    pub alignment: FeatureAlignment,
}

impl PreparedDataset {
    /// Open the source dataset and derive the canonical order from it.
    pub fn source(
        provider: &dyn DatasetProvider,
        spec: &DatasetSpec,
        strip: bool,
    ) -> Result<(Self, CanonicalFeatureOrder)> {
        let dataset = provider.open(&spec.file)?;
        let rows = resolve_selection(&*dataset, Axis::Row, spec.valid_rows.as_deref())?;
        let cols = resolve_selection(&*dataset, Axis::Column, spec.valid_cols.as_deref())?;
        let canonical = build_canonical(&*dataset, &rows, &spec.feat_attr, strip)?;
        let prepared = Self {
            dataset,
            spec: spec.clone(),
            rows,
            cols,
            alignment: FeatureAlignment::identity(canonical.len()),
        };
        Ok((prepared, canonical))
    }

    /// Open a target dataset and align it against `canonical`.
    pub fn target(
        provider: &dyn DatasetProvider,
        spec: &DatasetSpec,
        strip: bool,
        canonical: &CanonicalFeatureOrder,
    ) -> Result<Self> {
        let dataset = provider.open(&spec.file)?;
        let rows = resolve_selection(&*dataset, Axis::Row, spec.valid_rows.as_deref())?;
        let cols = resolve_selection(&*dataset, Axis::Column, spec.valid_cols.as_deref())?;
        let alignment = align(&*dataset, &rows, &spec.feat_attr, strip, canonical)?;
        Ok(Self {
            dataset,
            spec: spec.clone(),
            rows,
            cols,
            alignment,
        })
    }

    fn cell_ids(&self) -> Result<Vec<String>> {
        self.dataset
            .read_attribute(Axis::Column, &self.spec.cell_attr)?
            .select_strings(self.cols.positions())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub batches: usize,
    pub samples: usize,
    pub nnz: usize,
}

/// Stream every selected sample of `input` into `writer`, in column order.
///
/// The writer creates the store on the first batch it ever sees, so the same call
/// serves the source and every target.
pub fn stream_dataset<B: StoreBackend>(
    input: &PreparedDataset,
    batch_size: usize,
    writer: &mut OutputStoreWriter<B>,
) -> Result<StreamStats> {
    let output_rows = writer.n_rows();
    let cell_ids = input.cell_ids()?;
    let label = input.spec.label.as_deref();

    info!(
        "Streaming {}: {} features × {} samples in batches of {}",
        input.dataset.name(),
        input.rows.len(),
        input.cols.len(),
        batch_size
    );

    let blocks = input.dataset.column_blocks(
        &input.spec.layer,
        input.rows.positions(),
        input.cols.positions(),
        batch_size,
    )?;

    let mut stats = StreamStats::default();
    for block in blocks {
        let block = block?;
        let n = block.positions.len();
        let ids = cell_ids
            .get(stats.samples..stats.samples + n)
            .ok_or_else(|| {
                CellfuseError::DimensionMismatch {
                    expected: format!("{} selected samples", cell_ids.len()),
                    actual: format!("block ending at sample {}", stats.samples + n),
                }
            })?
            .to_vec();

        let matrix = remap(&block.matrix, &input.alignment, output_rows)?;
        let nnz = matrix.nnz();
        let batch = SampleBatch::new(
            matrix,
            ColumnAttributes::labelled(ids, &input.spec.file, label),
        )?;
        writer.write(&batch)?;

        stats.batches += 1;
        stats.samples += n;
        stats.nnz += nnz;
        debug!(
            "{}: batch {} with {} samples ({} non-zero), {}/{} done",
            input.dataset.name(),
            stats.batches,
            n,
            nnz,
            stats.samples,
            input.cols.len()
        );
    }

    info!(
        "Finished {}: {} samples in {} batch(es), {} non-zero entries",
        input.dataset.name(),
        stats.samples,
        stats.batches,
        stats.nnz
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sparse::SparseOps;
    use crate::dataset::{AttributeValues, MemoryCatalog, MemoryDataset};
    use crate::store::MemoryStore;
    use anyhow::Result;

    fn strings(values: &[&str]) -> AttributeValues {
        AttributeValues::Strings(values.iter().map(|s| s.to_string()).collect())
    }

    fn catalog() -> MemoryCatalog {
        let source_counts = SparseOps::csr_from_triplets(
            3,
            5,
            vec![(0, 0, 1.0), (1, 1, 2.0), (2, 2, 3.0), (0, 3, 4.0), (2, 4, 5.0)],
        )
        .unwrap();
        let source = MemoryDataset::new("src.h5ad", 3, 5)
            .with_layer("", source_counts)
            .unwrap()
            .with_row_attribute("Accession", strings(&["A", "B", "C"]))
            .unwrap()
            .with_column_attribute("CellID", strings(&["s0", "s1", "s2", "s3", "s4"]))
            .unwrap();

        // features [C, A]; C = [5, 0], A = [0, 7]
        let target_counts =
            SparseOps::csr_from_triplets(2, 2, vec![(0, 0, 5.0), (1, 1, 7.0)]).unwrap();
        let target = MemoryDataset::new("tgt.h5ad", 2, 2)
            .with_layer("", target_counts)
            .unwrap()
            .with_row_attribute("Accession", strings(&["C", "A"]))
            .unwrap()
            .with_column_attribute("CellID", strings(&["t0", "t1"]))
            .unwrap();

        let mut catalog = MemoryCatalog::new();
        catalog.insert(source);
        catalog.insert(target);
        catalog
    }

    #[test]
    fn batches_partition_selected_samples_in_order() -> Result<()> {
        let catalog = catalog();
        let (source, canonical) =
            PreparedDataset::source(&catalog, &DatasetSpec::new("src.h5ad"), false)?;
        let mut writer =
            OutputStoreWriter::new(MemoryStore::new(), canonical.ids().to_vec(), false);

        let stats = stream_dataset(&source, 2, &mut writer)?;
        assert_eq!(stats.batches, 3);
        assert_eq!(stats.samples, 5);
        assert_eq!(writer.blocks_written(), 3);

        writer.finish()?;
        let store = writer.into_backend();
        assert_eq!(
            store.column_attributes().cell_ids,
            vec!["s0", "s1", "s2", "s3", "s4"]
        );
        assert_eq!(store.shape(), (3, 5));
        assert_eq!(store.entries().len(), 5);
        Ok(())
    }

    #[test]
    fn target_rows_land_on_canonical_positions() -> Result<()> {
        let catalog = catalog();
        let (source, canonical) =
            PreparedDataset::source(&catalog, &DatasetSpec::new("src.h5ad"), false)?;
        let target =
            PreparedDataset::target(&catalog, &DatasetSpec::new("tgt.h5ad"), false, &canonical)?;
        assert_eq!(target.alignment.as_slice(), &[2, 0]);

        let mut writer =
            OutputStoreWriter::new(MemoryStore::new(), canonical.ids().to_vec(), false);
        stream_dataset(&source, 5000, &mut writer)?;
        stream_dataset(&target, 5000, &mut writer)?;
        writer.finish()?;

        let store = writer.into_backend();
        let target_entries: Vec<_> = store
            .entries()
            .into_iter()
            .filter(|&(_, col, _)| col >= 5)
            .collect();
        assert_eq!(target_entries, vec![(0, 6, 7.0), (2, 5, 5.0)]);
        assert_eq!(
            store.column_attributes().original_files[5..],
            ["tgt.h5ad".to_string(), "tgt.h5ad".to_string()]
        );
        Ok(())
    }

    #[test]
    fn column_validity_restricts_streamed_samples() -> Result<()> {
        let mut catalog = catalog();
        let counts = SparseOps::csr_from_triplets(1, 3, vec![(0, 0, 1.0), (0, 2, 2.0)])?;
        catalog.insert(
            MemoryDataset::new("masked.h5ad", 1, 3)
                .with_layer("", counts)?
                .with_row_attribute("Accession", strings(&["A"]))?
                .with_column_attribute("CellID", strings(&["m0", "m1", "m2"]))?
                .with_column_attribute("Pass", AttributeValues::Bools(vec![true, false, true]))?,
        );
        let spec = DatasetSpec::new("masked.h5ad").with_valid_cols("Pass");
        let (prepared, canonical) = PreparedDataset::source(&catalog, &spec, false)?;
        let mut writer =
            OutputStoreWriter::new(MemoryStore::new(), canonical.ids().to_vec(), false);
        stream_dataset(&prepared, 1, &mut writer)?;
        writer.finish()?;

        let store = writer.into_backend();
        assert_eq!(store.column_attributes().cell_ids, vec!["m0", "m2"]);
        assert_eq!(store.entries(), vec![(0, 0, 1.0), (0, 1, 2.0)]);
        Ok(())
    }
}
