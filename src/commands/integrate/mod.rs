mod args;
mod manifest;

use anyhow::{bail, Context, Result};
use cellfuse_lib::integrate::{integrate, DatasetSpec};
use log::info;
use std::time::Instant;

use crate::commands::common;

pub use args::IntegrateArgs;
use manifest::read_manifest;

/// Target datasets from the manifest, or from `--target` and the per-target options.
fn target_specs(args: &IntegrateArgs) -> Result<Vec<DatasetSpec>> {
    match &args.manifest {
        Some(path) => {
            if args.has_target_options() {
                bail!("per-target options cannot be combined with --manifest");
            }
            let specs = read_manifest(path)?;
            info!("Read {} target(s) from {}", specs.len(), path.display());
            Ok(specs)
        }
        None => Ok(args.target_params().resolve(&args.targets)?),
    }
}

/// Entry point for the `integrate` command.
pub fn run_integrate(args: IntegrateArgs) -> Result<()> {
    let start = Instant::now();
    let threads = common::configure_global_thread_pool(args.threads)?;
    info!("Using {} worker thread(s)", threads);

    let source = args.source_spec();
    let targets = target_specs(&args)?;
    let output = integrate(source, targets, &args.output, args.options())
        .with_context(|| format!("Failed to integrate into {}", args.output.display()))?;

    info!(
        "Integrated matrix written to {} in {:.2?}",
        output.display(),
        start.elapsed()
    );
    Ok(())
}
