//! Merged output store
//!
//! [`OutputStoreWriter`] owns the schema rules of an incremental merge; the
//! [`StoreBackend`] it wraps only persists what it is handed:
//!
//! - row attributes (canonical feature identifiers) are fixed by the first write
//! - every later block must have exactly that many rows
//! - column attributes grow by concatenation in arrival order, with the same key
//!   set as the first block
//!
//! Backends:
//! - [`memory`]: keeps the merged matrix in memory
//! - [`h5ad`]: spools blocks to disk and writes an H5AD file on finish

pub mod batch;
pub mod h5ad;
pub mod memory;

pub use batch::{ColumnAttributes, SampleBatch};
pub use h5ad::H5adStore;
pub use memory::MemoryStore;

use crate::core::error::{CellfuseError, Result};
use log::{debug, info};
use nalgebra_sparse::CooMatrix;

/// Row attribute holding canonical feature identifiers.
pub const FEATURE_ID_ATTR: &str = "Accession";
/// Column attribute holding sample identifiers.
pub const CELL_ID_ATTR: &str = "CellID";
/// Column attribute naming the dataset each sample came from.
pub const ORIGINAL_FILE_ATTR: &str = "OriginalFile";
/// Optional column attribute holding modality labels.
pub const MODALITY_ATTR: &str = "Modality";

/// Persistence contract for a merged store.
///
/// Matrices are canonical features × samples.
pub trait StoreBackend {
    fn create_store(
        &mut self,
        row_attrs: &[String],
        col_attrs: &ColumnAttributes,
        matrix: &CooMatrix<f32>,
    ) -> Result<()>;

    /// Append a block of columns. Fails when the row count differs from the store's.
    fn append_columns(&mut self, matrix: &CooMatrix<f32>, col_attrs: &ColumnAttributes)
        -> Result<()>;

    /// Flush everything; no writes follow.
    fn finish(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    NotStarted,
    Created,
    Appending,
    Done,
}

/// Schema-enforcing front end over a [`StoreBackend`].
pub struct OutputStoreWriter<B: StoreBackend> {
    backend: B,
    feature_ids: Vec<String>,
    state: WriterState,
    n_columns: usize,
    with_modality: bool,
    blocks: usize,
}

impl<B: StoreBackend> OutputStoreWriter<B> {
    /// `feature_ids` become the fixed row attributes of the store.
    /// `with_modality` fixes whether blocks carry a `Modality` column.
    pub fn new(backend: B, feature_ids: Vec<String>, with_modality: bool) -> Self {
        Self {
            backend,
            feature_ids,
            state: WriterState::NotStarted,
            n_columns: 0,
            with_modality,
            blocks: 0,
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn n_rows(&self) -> usize {
        self.feature_ids.len()
    }

    pub fn n_columns(&self) -> usize {
        self.n_columns
    }

    pub fn blocks_written(&self) -> usize {
        self.blocks
    }

    /// Create the store on the first call, append on every later one.
    pub fn write(&mut self, batch: &SampleBatch) -> Result<()> {
        match self.state {
            WriterState::NotStarted => self.create(batch),
            _ => self.append(batch),
        }
    }

    /// Establish the row attributes and write the first block.
    pub fn create(&mut self, batch: &SampleBatch) -> Result<()> {
        if self.state != WriterState::NotStarted {
            return Err(CellfuseError::SchemaMismatch(format!(
                "store already created (state {:?})",
                self.state
            )));
        }
        self.check_batch(batch)?;
        self.backend
            .create_store(&self.feature_ids, &batch.col_attrs, &batch.matrix)?;
        self.record(batch);
        self.state = WriterState::Created;
        info!(
            "Created output store with {} features, first block of {} samples",
            self.feature_ids.len(),
            batch.n_columns()
        );
        Ok(())
    }

    /// Append a further block of samples.
    pub fn append(&mut self, batch: &SampleBatch) -> Result<()> {
        match self.state {
            WriterState::Created | WriterState::Appending => {}
            WriterState::NotStarted => {
                return Err(CellfuseError::SchemaMismatch(
                    "cannot append before the store is created".to_string(),
                ))
            }
            WriterState::Done => {
                return Err(CellfuseError::SchemaMismatch(
                    "cannot append to a finished store".to_string(),
                ))
            }
        }
        self.check_batch(batch)?;
        self.backend
            .append_columns(&batch.matrix, &batch.col_attrs)?;
        self.record(batch);
        self.state = WriterState::Appending;
        debug!(
            "Appended block {} ({} samples, {} total)",
            self.blocks,
            batch.n_columns(),
            self.n_columns
        );
        Ok(())
    }

    /// Finalize the store. A store that never saw a block is created empty.
    pub fn finish(&mut self) -> Result<()> {
        if self.state == WriterState::Done {
            return Ok(());
        }
        if self.state == WriterState::NotStarted {
            let empty = SampleBatch::new(
                CooMatrix::new(self.feature_ids.len(), 0),
                ColumnAttributes::empty(self.with_modality),
            )?;
            self.create(&empty)?;
        }
        self.backend.finish()?;
        self.state = WriterState::Done;
        info!(
            "Finished output store: {} features × {} samples in {} block(s)",
            self.feature_ids.len(),
            self.n_columns,
            self.blocks
        );
        Ok(())
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    fn check_batch(&self, batch: &SampleBatch) -> Result<()> {
        if batch.n_rows() != self.feature_ids.len() {
            return Err(CellfuseError::SchemaMismatch(format!(
                "block has {} rows but the store has {} features",
                batch.n_rows(),
                self.feature_ids.len()
            )));
        }
        if batch.col_attrs.has_modality() != self.with_modality {
            return Err(CellfuseError::SchemaMismatch(format!(
                "block {} a Modality column but the store was declared {} one",
                if batch.col_attrs.has_modality() { "has" } else { "lacks" },
                if self.with_modality { "with" } else { "without" }
            )));
        }
        Ok(())
    }

    fn record(&mut self, batch: &SampleBatch) {
        self.n_columns += batch.n_columns();
        self.blocks += 1;
    }
}
