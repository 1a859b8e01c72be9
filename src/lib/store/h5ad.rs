//! H5AD output store with bounded memory.
//!
//! Appended blocks are spooled to a temporary file as fixed-width binary
//! triplets. `finish` replays the spool one block at a time into the AnnData `X`
//! matrix, so at most one block is materialised at once. Only the per-sample
//! attribute strings stay in memory for the whole merge.

use super::{
    ColumnAttributes, StoreBackend, CELL_ID_ATTR, FEATURE_ID_ATTR, MODALITY_ATTR,
    ORIGINAL_FILE_ATTR,
};
use crate::core::error::{CellfuseError, Result};
use crate::core::fs::make_parent_dirs;
use crate::core::sparse::SparseOps;
use anndata::data::array::dataframe::DataFrameIndex;
use anndata::{AnnData, AnnDataOp};
use anndata_hdf5::H5;
use log::{info, warn};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use polars::prelude::*;
use rustc_hash::FxHashSet;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Clone, Copy, Debug, PartialEq)]
struct Triplet {
    feature: u32,
    sample: u32,
    value: f32,
}

impl Triplet {
    fn to_bytes(self) -> [u8; 12] {
        let mut data = [0u8; 12];
        data[0..4].copy_from_slice(&self.feature.to_le_bytes());
        data[4..8].copy_from_slice(&self.sample.to_le_bytes());
        data[8..12].copy_from_slice(&self.value.to_le_bytes());
        data
    }

    fn from_bytes(b: &[u8; 12]) -> Self {
        Triplet {
            feature: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            sample: u32::from_le_bytes([b[4], b[5], b[6], b[7]]),
            value: f32::from_le_bytes([b[8], b[9], b[10], b[11]]),
        }
    }
}

/// Extent of one spooled block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SpooledBlock {
    n_samples: usize,
    nnz: usize,
}

/// Append-only on-disk spool of sparse blocks, replayed in arrival order.
struct TripletSpool {
    file: NamedTempFile,
    writer: BufWriter<std::fs::File>,
    blocks: Vec<SpooledBlock>,
}

impl TripletSpool {
    fn new() -> Result<Self> {
        let file = NamedTempFile::new()?;
        let mut writer_handle = file.reopen()?;
        writer_handle.seek(SeekFrom::End(0))?;
        let writer = BufWriter::with_capacity(1 << 20, writer_handle);
        Ok(Self {
            file,
            writer,
            blocks: Vec::new(),
        })
    }

    /// Spool one feature × sample block.
    fn append(&mut self, matrix: &CooMatrix<f32>) -> Result<()> {
        if matrix.ncols() == 0 {
            return Ok(());
        }
        let mut nnz = 0usize;
        for (row, col, &value) in matrix.triplet_iter() {
            if value == 0.0 {
                continue;
            }
            let triplet = Triplet {
                feature: index_u32(row)?,
                sample: index_u32(col)?,
                value,
            };
            self.writer.write_all(&triplet.to_bytes())?;
            nnz += 1;
        }
        self.blocks.push(SpooledBlock {
            n_samples: matrix.ncols(),
            nnz,
        });
        Ok(())
    }

    fn n_samples(&self) -> usize {
        self.blocks.iter().map(|b| b.n_samples).sum()
    }

    /// Replay blocks as sample × feature CSR chunks.
    fn replay(&mut self, n_features: usize) -> Result<SpoolReplay<'_>> {
        self.writer.flush()?;
        let reader = BufReader::with_capacity(1 << 20, self.file.reopen()?);
        Ok(SpoolReplay {
            reader,
            blocks: self.blocks.iter(),
            n_features,
            failure: None,
        })
    }
}

struct SpoolReplay<'a> {
    reader: BufReader<std::fs::File>,
    blocks: std::slice::Iter<'a, SpooledBlock>,
    n_features: usize,
    failure: Option<CellfuseError>,
}

impl SpoolReplay<'_> {
    fn read_block(&mut self, block: SpooledBlock) -> Result<CsrMatrix<f32>> {
        let mut triplets = Vec::with_capacity(block.nnz);
        let mut buf = [0u8; 12];
        for _ in 0..block.nnz {
            self.reader.read_exact(&mut buf)?;
            let t = Triplet::from_bytes(&buf);
            triplets.push((t.sample as usize, t.feature as usize, t.value));
        }
        SparseOps::csr_from_triplets(block.n_samples, self.n_features, triplets)
    }
}

impl Iterator for SpoolReplay<'_> {
    type Item = CsrMatrix<f32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failure.is_some() {
            return None;
        }
        let block = *self.blocks.next()?;
        match self.read_block(block) {
            Ok(chunk) => Some(chunk),
            Err(err) => {
                self.failure = Some(err);
                None
            }
        }
    }
}

fn index_u32(index: usize) -> Result<u32> {
    u32::try_from(index).map_err(|_| {
        CellfuseError::InvalidInput(format!("index {} exceeds the u32 spool format", index))
    })
}

/// H5AD-backed [`StoreBackend`]. The file is written on [`StoreBackend::finish`].
pub struct H5adStore {
    path: PathBuf,
    spool: TripletSpool,
    feature_ids: Vec<String>,
    col_attrs: ColumnAttributes,
    created: bool,
    finished: bool,
}

impl H5adStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            spool: TripletSpool::new()?,
            feature_ids: Vec::new(),
            col_attrs: ColumnAttributes::default(),
            created: false,
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_h5ad(&mut self) -> Result<()> {
        make_parent_dirs(&self.path)?;
        let n_features = self.feature_ids.len();
        let n_samples = self.spool.n_samples();
        info!(
            "Writing H5AD {:?}: {} samples × {} features",
            self.path, n_samples, n_features
        );

        let adata = AnnData::<H5>::new(&self.path)?;

        if n_samples == 0 {
            adata.set_x(CsrMatrix::<f32>::zeros(0, n_features))?;
        } else {
            let mut replay = self.spool.replay(n_features)?;
            adata.set_x_from_iter(replay.by_ref())?;
            if let Some(err) = replay.failure.take() {
                return Err(err);
            }
        }

        let var_index: DataFrameIndex = self.feature_ids.iter().cloned().collect();
        adata.set_var_names(var_index)?;
        adata.set_obs_names(obs_index(&self.col_attrs.cell_ids))?;

        adata.set_var(DataFrame::new(
            n_features,
            vec![Series::new(FEATURE_ID_ATTR.into(), self.feature_ids.clone()).into()],
        )?)?;
        adata.set_obs(obs_frame(&self.col_attrs)?)?;

        adata.close()?;
        Ok(())
    }
}

/// Sample IDs when unique, otherwise positional ordinals.
fn obs_index(cell_ids: &[String]) -> DataFrameIndex {
    let mut seen = FxHashSet::default();
    if cell_ids.iter().all(|id| seen.insert(id.as_str())) {
        cell_ids.iter().cloned().collect()
    } else {
        warn!("Duplicate sample IDs in merged output; obs_names fall back to ordinals");
        (0..cell_ids.len()).map(|i| i.to_string()).collect()
    }
}

fn obs_frame(col_attrs: &ColumnAttributes) -> Result<DataFrame> {
    let mut columns: Vec<Column> = vec![
        Series::new(CELL_ID_ATTR.into(), col_attrs.cell_ids.clone()).into(),
        Series::new(ORIGINAL_FILE_ATTR.into(), col_attrs.original_files.clone()).into(),
    ];
    if let Some(modalities) = &col_attrs.modalities {
        columns.push(Series::new(MODALITY_ATTR.into(), modalities.clone()).into());
    }
    Ok(DataFrame::new(col_attrs.len(), columns)?)
}

impl StoreBackend for H5adStore {
    fn create_store(
        &mut self,
        row_attrs: &[String],
        col_attrs: &ColumnAttributes,
        matrix: &CooMatrix<f32>,
    ) -> Result<()> {
        if self.created {
            return Err(CellfuseError::SchemaMismatch(format!(
                "store {:?} already created",
                self.path
            )));
        }
        self.feature_ids = row_attrs.to_vec();
        self.col_attrs = col_attrs.clone();
        self.created = true;
        self.append_matrix(matrix)
    }

    fn append_columns(
        &mut self,
        matrix: &CooMatrix<f32>,
        col_attrs: &ColumnAttributes,
    ) -> Result<()> {
        if !self.created || self.finished {
            return Err(CellfuseError::SchemaMismatch(format!(
                "store {:?} is not open for appends",
                self.path
            )));
        }
        self.append_matrix(matrix)?;
        self.col_attrs.extend(col_attrs)
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.write_h5ad()?;
        self.finished = true;
        Ok(())
    }
}

impl H5adStore {
    fn append_matrix(&mut self, matrix: &CooMatrix<f32>) -> Result<()> {
        if matrix.nrows() != self.feature_ids.len() {
            return Err(CellfuseError::SchemaMismatch(format!(
                "appended block has {} rows, store has {}",
                matrix.nrows(),
                self.feature_ids.len()
            )));
        }
        self.spool.append(matrix)
    }
}
