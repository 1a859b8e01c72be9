//! Tab-separated target lists
//!
//! One target per line under the header
//! `file layer feat_attr cell_attr valid_ra valid_ca label`. Only `file` is
//! required; empty or missing cells take the default.

use anyhow::{Context, Result};
use cellfuse_lib::core::prelude::get_reader;
use cellfuse_lib::integrate::DatasetSpec;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct ManifestRecord {
    file: String,
    #[serde(default)]
    layer: Option<String>,
    #[serde(default)]
    feat_attr: Option<String>,
    #[serde(default)]
    cell_attr: Option<String>,
    #[serde(default)]
    valid_ra: Option<String>,
    #[serde(default)]
    valid_ca: Option<String>,
    #[serde(default)]
    label: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ManifestRecord {
    fn into_spec(self) -> DatasetSpec {
        let mut spec = DatasetSpec::new(self.file);
        if let Some(layer) = non_empty(self.layer) {
            spec.layer = layer;
        }
        if let Some(attr) = non_empty(self.feat_attr) {
            spec.feat_attr = attr;
        }
        if let Some(attr) = non_empty(self.cell_attr) {
            spec.cell_attr = attr;
        }
        spec.valid_rows = non_empty(self.valid_ra);
        spec.valid_cols = non_empty(self.valid_ca);
        spec.label = non_empty(self.label);
        spec
    }
}

/// Read every target of a manifest, in file order.
pub fn read_manifest<P: AsRef<Path>>(path: P) -> Result<Vec<DatasetSpec>> {
    let path = path.as_ref();
    let mut reader = get_reader(path, true)
        .with_context(|| format!("Failed to open manifest {}", path.display()))?;

    let mut specs = Vec::new();
    for (line, record) in reader.deserialize::<ManifestRecord>().enumerate() {
        let record = record.with_context(|| {
            format!("Malformed manifest record {} in {}", line + 1, path.display())
        })?;
        if record.file.trim().is_empty() {
            anyhow::bail!("Manifest record {} in {} has no file", line + 1, path.display());
        }
        specs.push(record.into_spec());
    }

    if specs.is_empty() {
        anyhow::bail!("Manifest {} lists no targets", path.display());
    }
    Ok(specs)
}
