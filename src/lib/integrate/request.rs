//! Merge request: per-dataset parameters, broadcasting and options

use crate::core::error::{CellfuseError, Result};

pub const DEFAULT_FEATURE_ATTR: &str = "Accession";
pub const DEFAULT_CELL_ATTR: &str = "CellID";
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Everything needed to read one dataset into a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSpec {
    /// File reference; also recorded as the `OriginalFile` label of its samples.
    pub file: String,
    /// Counts layer; empty for the main matrix.
    pub layer: String,
    pub feat_attr: String,
    pub cell_attr: String,
    pub valid_rows: Option<String>,
    pub valid_cols: Option<String>,
    /// Modality label.
    pub label: Option<String>,
}

impl DatasetSpec {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            layer: String::new(),
            feat_attr: DEFAULT_FEATURE_ATTR.to_string(),
            cell_attr: DEFAULT_CELL_ATTR.to_string(),
            valid_rows: None,
            valid_cols: None,
            label: None,
        }
    }

    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = layer.into();
        self
    }

    pub fn with_feat_attr(mut self, attr: impl Into<String>) -> Self {
        self.feat_attr = attr.into();
        self
    }

    pub fn with_cell_attr(mut self, attr: impl Into<String>) -> Self {
        self.cell_attr = attr.into();
        self
    }

    pub fn with_valid_rows(mut self, attr: impl Into<String>) -> Self {
        self.valid_rows = Some(attr.into());
        self
    }

    pub fn with_valid_cols(mut self, attr: impl Into<String>) -> Self {
        self.valid_cols = Some(attr.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A target parameter given either once for all targets or once per target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Broadcast<T> {
    Scalar(T),
    PerTarget(Vec<T>),
}

impl<T: Clone> Broadcast<T> {
    /// Expand to exactly `n` values.
    pub fn expand(self, name: &str, n: usize) -> Result<Vec<T>> {
        match self {
            Broadcast::Scalar(value) => Ok(vec![value; n]),
            Broadcast::PerTarget(values) if values.len() == n => Ok(values),
            Broadcast::PerTarget(values) => Err(CellfuseError::ParameterShape(format!(
                "{} has {} value(s) for {} target(s)",
                name,
                values.len(),
                n
            ))),
        }
    }

    /// One value broadcasts, several are taken per target.
    pub fn from_values(mut values: Vec<T>) -> Option<Self> {
        match values.len() {
            0 => None,
            1 => values.pop().map(Broadcast::Scalar),
            _ => Some(Broadcast::PerTarget(values)),
        }
    }
}

/// Scalar-or-list parameters shared by the targets of a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetParams {
    pub layer: Broadcast<String>,
    pub feat_attr: Broadcast<String>,
    pub cell_attr: Broadcast<String>,
    pub valid_rows: Broadcast<Option<String>>,
    pub valid_cols: Broadcast<Option<String>>,
    pub label: Broadcast<Option<String>>,
}

impl Default for TargetParams {
    fn default() -> Self {
        Self {
            layer: Broadcast::Scalar(String::new()),
            feat_attr: Broadcast::Scalar(DEFAULT_FEATURE_ATTR.to_string()),
            cell_attr: Broadcast::Scalar(DEFAULT_CELL_ATTR.to_string()),
            valid_rows: Broadcast::Scalar(None),
            valid_cols: Broadcast::Scalar(None),
            label: Broadcast::Scalar(None),
        }
    }
}

impl TargetParams {
    /// Normalize into one [`DatasetSpec`] per file.
    pub fn resolve(self, files: &[String]) -> Result<Vec<DatasetSpec>> {
        let n = files.len();
        let layers = self.layer.expand("layer", n)?;
        let feat_attrs = self.feat_attr.expand("feature attribute", n)?;
        let cell_attrs = self.cell_attr.expand("cell attribute", n)?;
        let valid_rows = self.valid_rows.expand("row validity attribute", n)?;
        let valid_cols = self.valid_cols.expand("column validity attribute", n)?;
        let labels = self.label.expand("label", n)?;

        let specs = files
            .iter()
            .enumerate()
            .map(|(i, file)| DatasetSpec {
                file: file.clone(),
                layer: layers[i].clone(),
                feat_attr: feat_attrs[i].clone(),
                cell_attr: cell_attrs[i].clone(),
                valid_rows: valid_rows[i].clone(),
                valid_cols: valid_cols[i].clone(),
                label: labels[i].clone(),
            })
            .collect();
        Ok(specs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrationOptions {
    /// Remove a trailing `.<digits>` version from feature identifiers.
    pub strip_feature_version: bool,
    /// Stream samples in batches instead of joining complete matrices.
    pub low_memory: bool,
    pub batch_size: usize,
}

impl Default for IntegrationOptions {
    fn default() -> Self {
        Self {
            strip_feature_version: false,
            low_memory: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// A validated merge request. Construction performs every check that needs no I/O.
#[derive(Debug, Clone)]
pub struct IntegrationRequest {
    source: DatasetSpec,
    targets: Vec<DatasetSpec>,
    options: IntegrationOptions,
}

impl IntegrationRequest {
    pub fn new(
        source: DatasetSpec,
        targets: Vec<DatasetSpec>,
        options: IntegrationOptions,
    ) -> Result<Self> {
        if targets.is_empty() {
            return Err(CellfuseError::ParameterShape(
                "at least one target dataset is required".to_string(),
            ));
        }
        if options.batch_size == 0 {
            return Err(CellfuseError::InvalidInput(
                "batch size must be greater than 0".to_string(),
            ));
        }
        let labelled = targets.iter().filter(|t| t.label.is_some()).count();
        let consistent = match source.label {
            Some(_) => labelled == targets.len(),
            None => labelled == 0,
        };
        if !consistent {
            return Err(CellfuseError::ParameterShape(format!(
                "modality labels must be given for the source and all {} target(s) or for none \
                 (source {}, {} target(s) labelled)",
                targets.len(),
                if source.label.is_some() { "labelled" } else { "unlabelled" },
                labelled
            )));
        }
        Ok(Self {
            source,
            targets,
            options,
        })
    }

    pub fn source(&self) -> &DatasetSpec {
        &self.source
    }

    pub fn targets(&self) -> &[DatasetSpec] {
        &self.targets
    }

    pub fn options(&self) -> &IntegrationOptions {
        &self.options
    }

    pub fn with_modality(&self) -> bool {
        self.source.label.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn files(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("t{i}.h5ad")).collect()
    }

    #[test]
    fn scalars_broadcast_to_every_target() -> Result<()> {
        let params = TargetParams {
            layer: Broadcast::Scalar("spliced".to_string()),
            ..TargetParams::default()
        };
        let specs = params.resolve(&files(3))?;
        assert_eq!(specs.len(), 3);
        assert!(specs.iter().all(|s| s.layer == "spliced" && s.feat_attr == "Accession"));
        assert_eq!(specs[2].file, "t2.h5ad");
        Ok(())
    }

    #[test]
    fn per_target_lists_must_match_target_count() {
        let params = TargetParams {
            label: Broadcast::PerTarget(vec![Some("rna".to_string()), Some("atac".to_string())]),
            ..TargetParams::default()
        };
        let err = params.resolve(&files(3)).unwrap_err();
        assert!(matches!(err, CellfuseError::ParameterShape(_)));
    }

    #[test]
    fn per_target_lists_are_taken_in_order() -> Result<()> {
        let params = TargetParams {
            cell_attr: Broadcast::PerTarget(vec!["a".to_string(), "b".to_string()]),
            ..TargetParams::default()
        };
        let specs = params.resolve(&files(2))?;
        assert_eq!(specs[0].cell_attr, "a");
        assert_eq!(specs[1].cell_attr, "b");
        Ok(())
    }

    #[test]
    fn from_values_broadcasts_single_entries() {
        assert_eq!(Broadcast::<u8>::from_values(vec![]), None);
        assert_eq!(Broadcast::from_values(vec![1]), Some(Broadcast::Scalar(1)));
        assert_eq!(
            Broadcast::from_values(vec![1, 2]),
            Some(Broadcast::PerTarget(vec![1, 2]))
        );
    }

    #[test]
    fn modality_labels_are_all_or_none() {
        let source = DatasetSpec::new("s.h5ad").with_label("rna");
        let targets = vec![
            DatasetSpec::new("a.h5ad").with_label("atac"),
            DatasetSpec::new("b.h5ad"),
        ];
        let err =
            IntegrationRequest::new(source, targets, IntegrationOptions::default()).unwrap_err();
        assert!(matches!(err, CellfuseError::ParameterShape(_)));

        let unlabelled = IntegrationRequest::new(
            DatasetSpec::new("s.h5ad"),
            vec![DatasetSpec::new("a.h5ad")],
            IntegrationOptions::default(),
        );
        assert!(matches!(unlabelled, Ok(ref r) if !r.with_modality()));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let options = IntegrationOptions {
            batch_size: 0,
            ..IntegrationOptions::default()
        };
        let err = IntegrationRequest::new(
            DatasetSpec::new("s"),
            vec![DatasetSpec::new("t")],
            options,
        )
        .unwrap_err();
        assert!(matches!(err, CellfuseError::InvalidInput(_)));
    }
}
