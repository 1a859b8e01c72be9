use cellfuse_lib::integrate::{Broadcast, DatasetSpec, IntegrationOptions, TargetParams};
use std::path::PathBuf;
use structopt::StructOpt;

/// Arguments for the `integrate` command.
///
/// Options ending in `-target` may be given once (applied to every target) or once
/// per `--target`, in the same order.
#[derive(Debug, Clone, StructOpt)]
#[structopt(
    name = "integrate",
    about = "Merge target datasets into the feature order of a source dataset"
)]
pub struct IntegrateArgs {
    /// Source dataset (.h5ad); its features define the output row order.
    #[structopt(short, long)]
    pub source: String,

    /// Target dataset (.h5ad). Repeat for several targets.
    #[structopt(
        short,
        long = "target",
        number_of_values = 1,
        required_unless = "manifest"
    )]
    pub targets: Vec<String>,

    /// Tab-separated target list (.tsv or .tsv.gz) with header
    /// `file layer feat_attr cell_attr valid_ra valid_ca label`.
    #[structopt(long, parse(from_os_str), conflicts_with = "targets")]
    pub manifest: Option<PathBuf>,

    /// Output path for the merged `.h5ad` file.
    #[structopt(short, long, parse(from_os_str))]
    pub output: PathBuf,

    /// Layer of the source dataset (main matrix when empty).
    #[structopt(long)]
    pub layer_source: Option<String>,

    #[structopt(long, number_of_values = 1)]
    pub layer_target: Vec<String>,

    /// Feature identifier attribute of the source dataset.
    #[structopt(long, default_value = "Accession")]
    pub feat_source: String,

    #[structopt(long, number_of_values = 1)]
    pub feat_target: Vec<String>,

    /// Sample identifier attribute of the source dataset.
    #[structopt(long, default_value = "CellID")]
    pub cell_source: String,

    #[structopt(long, number_of_values = 1)]
    pub cell_target: Vec<String>,

    /// Modality label of the source samples. Requires `--label-target`.
    #[structopt(long)]
    pub label_source: Option<String>,

    #[structopt(long, number_of_values = 1)]
    pub label_target: Vec<String>,

    /// Row attribute selecting the source features to keep.
    #[structopt(long)]
    pub valid_ra_source: Option<String>,

    #[structopt(long, number_of_values = 1)]
    pub valid_ra_target: Vec<String>,

    /// Column attribute selecting the source samples to keep.
    #[structopt(long)]
    pub valid_ca_source: Option<String>,

    #[structopt(long, number_of_values = 1)]
    pub valid_ca_target: Vec<String>,

    /// Strip a trailing `.<digits>` version from feature identifiers.
    #[structopt(long)]
    pub remove_version: bool,

    /// Stream samples in batches instead of loading every dataset at once.
    #[structopt(long)]
    pub low_mem: bool,

    /// Samples per batch in low-memory mode.
    #[structopt(long, default_value = "5000")]
    pub batch_size: usize,

    /// Number of threads to use.
    #[structopt(short = "T", long, default_value = "4")]
    pub threads: usize,
}

impl IntegrateArgs {
    pub fn source_spec(&self) -> DatasetSpec {
        DatasetSpec {
            file: self.source.clone(),
            layer: self.layer_source.clone().unwrap_or_default(),
            feat_attr: self.feat_source.clone(),
            cell_attr: self.cell_source.clone(),
            valid_rows: self.valid_ra_source.clone(),
            valid_cols: self.valid_ca_source.clone(),
            label: self.label_source.clone(),
        }
    }

    /// Whether any per-target option was given on the command line.
    pub fn has_target_options(&self) -> bool {
        [
            &self.layer_target,
            &self.feat_target,
            &self.cell_target,
            &self.label_target,
            &self.valid_ra_target,
            &self.valid_ca_target,
        ]
        .iter()
        .any(|values| !values.is_empty())
    }

    pub fn target_params(&self) -> TargetParams {
        let defaults = TargetParams::default();
        TargetParams {
            layer: Broadcast::from_values(self.layer_target.clone()).unwrap_or(defaults.layer),
            feat_attr: Broadcast::from_values(self.feat_target.clone())
                .unwrap_or(defaults.feat_attr),
            cell_attr: Broadcast::from_values(self.cell_target.clone())
                .unwrap_or(defaults.cell_attr),
            valid_rows: optional(&self.valid_ra_target).unwrap_or(defaults.valid_rows),
            valid_cols: optional(&self.valid_ca_target).unwrap_or(defaults.valid_cols),
            label: optional(&self.label_target).unwrap_or(defaults.label),
        }
    }

    pub fn options(&self) -> IntegrationOptions {
        IntegrationOptions {
            strip_feature_version: self.remove_version,
            low_memory: self.low_mem,
            batch_size: self.batch_size,
        }
    }
}

fn optional(values: &[String]) -> Option<Broadcast<Option<String>>> {
    Broadcast::from_values(values.iter().cloned().map(Some).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn parses_minimal_arguments() -> Result<()> {
        let args = IntegrateArgs::from_iter_safe(&[
            "integrate",
            "--source",
            "ref.h5ad",
            "--target",
            "a.h5ad",
            "--output",
            "merged.h5ad",
        ])?;

        assert_eq!(args.targets, vec!["a.h5ad"]);
        assert_eq!(args.batch_size, 5000);
        assert!(!args.low_mem);
        assert_eq!(args.source_spec().feat_attr, "Accession");
        assert_eq!(args.source_spec().cell_attr, "CellID");
        assert!(!args.has_target_options());
        Ok(())
    }

    #[test]
    fn single_target_option_broadcasts() -> Result<()> {
        let args = IntegrateArgs::from_iter_safe(&[
            "integrate",
            "--source",
            "ref.h5ad",
            "--target",
            "a.h5ad",
            "--target",
            "b.h5ad",
            "--output",
            "merged.h5ad",
            "--layer-target",
            "spliced",
            "--label-source",
            "rna",
            "--label-target",
            "atac",
            "--label-target",
            "protein",
        ])?;

        let specs = args.target_params().resolve(&args.targets)?;
        assert_eq!(specs.len(), 2);
        assert!(specs.iter().all(|s| s.layer == "spliced"));
        assert_eq!(specs[0].label.as_deref(), Some("atac"));
        assert_eq!(specs[1].label.as_deref(), Some("protein"));
        Ok(())
    }

    #[test]
    fn mismatched_target_option_count_fails_resolution() -> Result<()> {
        let args = IntegrateArgs::from_iter_safe(&[
            "integrate",
            "--source",
            "ref.h5ad",
            "--target",
            "a.h5ad",
            "--target",
            "b.h5ad",
            "--target",
            "c.h5ad",
            "--output",
            "merged.h5ad",
            "--cell-target",
            "x",
            "--cell-target",
            "y",
        ])?;
        assert!(args.target_params().resolve(&args.targets).is_err());
        Ok(())
    }

    #[test]
    fn manifest_and_targets_are_exclusive() {
        let parsed = IntegrateArgs::from_iter_safe(&[
            "integrate",
            "--source",
            "ref.h5ad",
            "--target",
            "a.h5ad",
            "--manifest",
            "targets.tsv",
            "--output",
            "merged.h5ad",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn targets_are_required_without_manifest() {
        let parsed = IntegrateArgs::from_iter_safe(&[
            "integrate",
            "--source",
            "ref.h5ad",
            "--output",
            "merged.h5ad",
        ]);
        assert!(parsed.is_err());
    }
}
