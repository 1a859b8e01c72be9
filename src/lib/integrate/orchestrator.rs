//! Entry points that validate a merge request and dispatch it to an engine

use super::full_memory::merge_all;
use super::request::{DatasetSpec, IntegrationOptions, IntegrationRequest};
use super::streaming::{stream_dataset, PreparedDataset};
use crate::core::error::Result;
use crate::dataset::{DatasetProvider, H5adProvider};
use crate::store::{H5adStore, OutputStoreWriter, SampleBatch, StoreBackend};
use log::info;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    Streaming,
    FullMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrationSummary {
    pub mode: MergeMode,
    pub n_features: usize,
    pub n_samples: usize,
    pub n_blocks: usize,
}

/// Merge the datasets of `request` into `backend`, returning the finished backend.
pub fn integrate_with<B: StoreBackend>(
    provider: &dyn DatasetProvider,
    request: &IntegrationRequest,
    backend: B,
) -> Result<(B, IntegrationSummary)> {
    let options = request.options();
    info!(
        "Integrating {} into {} target(s) ({} mode{})",
        request.source().file,
        request.targets().len(),
        if options.low_memory { "low-memory" } else { "full-memory" },
        if options.strip_feature_version {
            ", stripping feature versions"
        } else {
            ""
        }
    );

    let writer = if options.low_memory {
        run_streaming(provider, request, backend)?
    } else {
        run_full_memory(provider, request, backend)?
    };

    let summary = IntegrationSummary {
        mode: if options.low_memory {
            MergeMode::Streaming
        } else {
            MergeMode::FullMemory
        },
        n_features: writer.n_rows(),
        n_samples: writer.n_columns(),
        n_blocks: writer.blocks_written(),
    };
    Ok((writer.into_backend(), summary))
}

fn run_streaming<B: StoreBackend>(
    provider: &dyn DatasetProvider,
    request: &IntegrationRequest,
    backend: B,
) -> Result<OutputStoreWriter<B>> {
    let options = request.options();
    let strip = options.strip_feature_version;

    let (source, canonical) = PreparedDataset::source(provider, request.source(), strip)?;
    // align every target before the first write
    let targets = request
        .targets()
        .iter()
        .map(|spec| PreparedDataset::target(provider, spec, strip, &canonical))
        .collect::<Result<Vec<_>>>()?;

    let mut writer =
        OutputStoreWriter::new(backend, canonical.ids().to_vec(), request.with_modality());
    for input in std::iter::once(&source).chain(targets.iter()) {
        stream_dataset(input, options.batch_size, &mut writer)?;
    }
    writer.finish()?;
    Ok(writer)
}

fn run_full_memory<B: StoreBackend>(
    provider: &dyn DatasetProvider,
    request: &IntegrationRequest,
    backend: B,
) -> Result<OutputStoreWriter<B>> {
    let merged = merge_all(
        provider,
        request.source(),
        request.targets(),
        request.options().strip_feature_version,
    )?;

    let mut writer = OutputStoreWriter::new(backend, merged.feature_ids, request.with_modality());
    let batch = SampleBatch::new(merged.matrix, merged.col_attrs)?;
    writer.create(&batch)?;
    writer.finish()?;
    Ok(writer)
}

/// Merge H5AD datasets into a new H5AD file at `output`.
pub fn integrate(
    source: DatasetSpec,
    targets: Vec<DatasetSpec>,
    output: &Path,
    options: IntegrationOptions,
) -> Result<PathBuf> {
    let request = IntegrationRequest::new(source, targets, options)?;
    let store = H5adStore::new(output)?;
    let (store, summary) = integrate_with(&H5adProvider, &request, store)?;
    info!(
        "Wrote {} features × {} samples to {}",
        summary.n_features,
        summary.n_samples,
        store.path().display()
    );
    Ok(store.path().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::CellfuseError;
    use crate::core::sparse::SparseOps;
    use crate::dataset::{
        AttributeValues, Axis, Dataset, H5adDataset, MemoryCatalog, MemoryDataset,
    };
    use crate::store::MemoryStore;
    use anndata::{AnnData, AnnDataOp};
    use anndata_hdf5::H5;
    use anyhow::Result;
    use nalgebra_sparse::CsrMatrix;
    use polars::prelude::{DataFrame, NamedFrom, Series};

    fn strings(values: &[&str]) -> AttributeValues {
        AttributeValues::Strings(values.iter().map(|s| s.to_string()).collect())
    }

    fn dataset(
        name: &str,
        features: &[&str],
        cells: &[&str],
        triplets: Vec<(usize, usize, f32)>,
    ) -> MemoryDataset {
        let counts = SparseOps::csr_from_triplets(features.len(), cells.len(), triplets).unwrap();
        MemoryDataset::new(name, features.len(), cells.len())
            .with_layer("", counts)
            .unwrap()
            .with_row_attribute("Accession", strings(features))
            .unwrap()
            .with_column_attribute("CellID", strings(cells))
            .unwrap()
    }

    /// Source [A, B, C] with 2 samples, targets with subsets of its features.
    fn catalog() -> MemoryCatalog {
        let mut catalog = MemoryCatalog::new();
        catalog.insert(dataset(
            "src",
            &["A.1", "B.1", "C.2"],
            &["s0", "s1"],
            vec![(0, 0, 1.0), (1, 1, 2.0), (2, 0, 3.0)],
        ));
        catalog.insert(dataset(
            "tgt",
            &["C.2", "A.1"],
            &["t0", "t1"],
            vec![(0, 0, 5.0), (1, 1, 7.0)],
        ));
        catalog.insert(dataset(
            "wide",
            &["B.3"],
            &["w0", "w1", "w2"],
            vec![(0, 0, 1.0), (0, 2, 9.0)],
        ));
        catalog.insert(dataset("alien", &["A.1", "Z.1"], &["z0"], vec![(1, 0, 1.0)]));
        catalog
    }

    fn request(targets: &[&str], options: IntegrationOptions) -> IntegrationRequest {
        IntegrationRequest::new(
            DatasetSpec::new("src"),
            targets.iter().map(|t| DatasetSpec::new(*t)).collect(),
            options,
        )
        .unwrap()
    }

    fn options(low_memory: bool, batch_size: usize) -> IntegrationOptions {
        IntegrationOptions {
            strip_feature_version: true,
            low_memory,
            batch_size,
        }
    }

    #[test]
    fn streaming_scenario_places_target_rows_canonically() -> Result<()> {
        let req = request(&["tgt"], options(true, 1));
        let (store, summary) = integrate_with(&catalog(), &req, MemoryStore::new())?;

        assert_eq!(summary.mode, MergeMode::Streaming);
        assert_eq!(summary.n_blocks, 4);
        assert_eq!(store.feature_ids(), &["A", "B", "C"]);
        assert_eq!(store.shape(), (3, 4));
        assert_eq!(
            store.entries(),
            vec![(0, 0, 1.0), (0, 3, 7.0), (1, 1, 2.0), (2, 0, 3.0), (2, 2, 5.0)]
        );
        assert_eq!(store.column_attributes().cell_ids, vec!["s0", "s1", "t0", "t1"]);
        assert!(store.is_finished());
        Ok(())
    }

    #[test]
    fn streaming_and_full_memory_agree_on_subset_targets() -> Result<()> {
        let catalog = catalog();
        let streamed = request(&["tgt", "wide"], options(true, 2));
        let joined = request(&["tgt", "wide"], options(false, 2));

        let (a, _) = integrate_with(&catalog, &streamed, MemoryStore::new())?;
        let (b, summary) = integrate_with(&catalog, &joined, MemoryStore::new())?;

        assert_eq!(summary.mode, MergeMode::FullMemory);
        assert_eq!(summary.n_blocks, 1);
        assert_eq!(a.feature_ids(), b.feature_ids());
        assert_eq!(a.shape(), b.shape());
        assert_eq!(a.entries(), b.entries());
        assert_eq!(a.column_attributes(), b.column_attributes());
        Ok(())
    }

    #[test]
    fn unmatched_target_feature_aborts_merge() {
        let req = request(&["tgt", "alien"], options(true, 2));
        let err = integrate_with(&catalog(), &req, MemoryStore::new()).unwrap_err();
        match err {
            CellfuseError::FeatureAlignment { dataset, missing } => {
                assert_eq!(dataset, "alien");
                assert_eq!(missing, vec!["Z".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn full_memory_join_appends_unknown_features() -> Result<()> {
        let req = request(&["alien"], options(false, 10));
        let (store, _) = integrate_with(&catalog(), &req, MemoryStore::new())?;
        assert_eq!(store.feature_ids(), &["A", "B", "C", "Z"]);
        assert_eq!(store.entries().last(), Some(&(3, 2, 1.0)));
        Ok(())
    }

    #[test]
    fn modality_labels_are_recorded_per_sample() -> Result<()> {
        let req = IntegrationRequest::new(
            DatasetSpec::new("src").with_label("rna"),
            vec![DatasetSpec::new("tgt").with_label("atac")],
            options(true, 5000),
        )?;
        let (store, _) = integrate_with(&catalog(), &req, MemoryStore::new())?;
        assert_eq!(
            store.column_attributes().modalities,
            Some(vec![
                "rna".to_string(),
                "rna".to_string(),
                "atac".to_string(),
                "atac".to_string()
            ])
        );
        assert_eq!(
            store.column_attributes().original_files,
            vec!["src", "src", "tgt", "tgt"]
        );
        Ok(())
    }

    /// Write a features × samples count matrix as an H5AD file (samples × features on disk).
    fn write_h5ad(
        path: &Path,
        features: &[&str],
        cells: &[&str],
        triplets: Vec<(usize, usize, f32)>,
    ) -> Result<()> {
        let by_feature = SparseOps::csr_from_triplets(features.len(), cells.len(), triplets)?;
        let by_sample = CsrMatrix::from(&SparseOps::transpose_to_coo(&by_feature));

        let adata = AnnData::<H5>::new(path)?;
        adata.set_x(by_sample)?;
        adata.set_var_names(features.iter().map(|s| s.to_string()).collect())?;
        adata.set_obs_names(cells.iter().map(|s| s.to_string()).collect())?;
        adata.set_var(DataFrame::new(
            features.len(),
            vec![Series::new("Accession".into(), features).into()],
        )?)?;
        adata.set_obs(DataFrame::new(
            cells.len(),
            vec![Series::new("CellID".into(), cells).into()],
        )?)?;
        adata.close()?;
        Ok(())
    }

    #[test]
    fn h5ad_round_trip_matches_in_both_modes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let src = dir.path().join("src.h5ad");
        let tgt = dir.path().join("tgt.h5ad");
        write_h5ad(
            &src,
            &["A.1", "B.1", "C.2"],
            &["s0", "s1"],
            vec![(0, 0, 1.0), (1, 1, 2.0), (2, 0, 3.0)],
        )?;
        write_h5ad(&tgt, &["C.2", "A.1"], &["t0", "t1"], vec![(0, 0, 5.0), (1, 1, 7.0)])?;
        let src_name = src.display().to_string();
        let tgt_name = tgt.display().to_string();

        for low_memory in [true, false] {
            let output = dir.path().join(format!("merged_{}.h5ad", low_memory));
            let written = integrate(
                DatasetSpec::new(src_name.clone()).with_label("rna"),
                vec![DatasetSpec::new(tgt_name.clone()).with_label("atac")],
                &output,
                options(low_memory, 1),
            )?;
            assert_eq!(written, output);

            let merged = H5adDataset::open(&output)?;
            assert_eq!(merged.shape(), (3, 4));
            assert_eq!(
                merged.read_attribute(Axis::Row, "Accession")?,
                strings(&["A", "B", "C"])
            );
            assert_eq!(
                merged.read_attribute(Axis::Column, "CellID")?,
                strings(&["s0", "s1", "t0", "t1"])
            );
            assert_eq!(
                merged.read_attribute(Axis::Column, "OriginalFile")?,
                strings(&[
                    src_name.as_str(),
                    src_name.as_str(),
                    tgt_name.as_str(),
                    tgt_name.as_str()
                ])
            );
            assert_eq!(
                merged.read_attribute(Axis::Column, "Modality")?,
                strings(&["rna", "rna", "atac", "atac"])
            );

            // target rows [C, A] land on canonical rows 2 and 0
            let counts = merged.read_sparse_slice("", &[0, 1, 2], &[0, 1, 2, 3])?;
            let mut entries: Vec<_> = counts.triplet_iter().map(|(r, c, v)| (r, c, *v)).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
            assert_eq!(
                entries,
                vec![(0, 0, 1.0), (0, 3, 7.0), (1, 1, 2.0), (2, 0, 3.0), (2, 2, 5.0)],
                "low_memory={}",
                low_memory
            );
        }
        Ok(())
    }
}
