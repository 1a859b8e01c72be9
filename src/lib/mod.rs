//! cellfuse: merging of single-cell count matrices
//!
//! Datasets enumerate their features in different orders and subsets. cellfuse
//! takes one source dataset as the reference for the feature (row) order, aligns
//! every target dataset against it and writes all selected samples (columns) into a
//! single store, labelled with the file they came from and an optional modality.
//!
//! # Modules
//!
//! - [`core`]: errors, sparse helpers, I/O and thread-pool utilities
//! - [`dataset`]: read access to input datasets (H5AD or in-memory)
//! - [`store`]: the append-only output store and its backends
//! - [`integrate`]: feature alignment, remapping and the two merge engines

pub mod core;
pub mod dataset;
pub mod integrate;
pub mod store;

pub mod prelude {
    pub use crate::core::prelude::*;
    pub use crate::dataset::{Dataset, DatasetProvider, H5adProvider, MemoryCatalog, MemoryDataset};
    pub use crate::integrate::{
        integrate, integrate_with, Broadcast, DatasetSpec, IntegrationOptions,
        IntegrationRequest, IntegrationSummary, TargetParams,
    };
    pub use crate::store::{H5adStore, MemoryStore, OutputStoreWriter, StoreBackend};
}
