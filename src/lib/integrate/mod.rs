//! Merging of feature × sample count matrices
//!
//! The source dataset fixes the canonical feature order. Every target is aligned
//! against it and its samples are appended after the source's, either streamed in
//! bounded batches ([`streaming`]) or joined in memory ([`full_memory`]).

pub mod alignment;
pub mod full_memory;
pub mod orchestrator;
pub mod remap;
pub mod request;
pub mod selection;
pub mod streaming;

pub use alignment::{align, build_canonical, strip_version, CanonicalFeatureOrder, FeatureAlignment};
pub use full_memory::{merge_all, merge_tables, FeatureTable, MergedTable};
pub use orchestrator::{integrate, integrate_with, IntegrationSummary, MergeMode};
pub use remap::remap;
pub use request::{
    Broadcast, DatasetSpec, IntegrationOptions, IntegrationRequest, TargetParams,
    DEFAULT_BATCH_SIZE, DEFAULT_CELL_ATTR, DEFAULT_FEATURE_ATTR,
};
pub use selection::{resolve_selection, ValiditySelection};
pub use streaming::{stream_dataset, PreparedDataset, StreamStats};
