//! cellfuse - merge single-cell count matrices onto a shared feature order
//!
//! # Usage
//!
//! ```bash
//! # Merge two targets into the feature order of a reference, streaming in batches
//! cellfuse integrate --source ref.h5ad --target a.h5ad --target b.h5ad \
//!     --output merged.h5ad --remove-version --low-mem --batch-size 5000
//!
//! # Per-target settings from a manifest
//! cellfuse integrate --source ref.h5ad --manifest targets.tsv --output merged.h5ad
//! ```

extern crate cellfuse_lib;
pub mod commands;
use anyhow::Result;
use cellfuse_lib::core::prelude::is_broken_pipe;
use env_logger::Env;
use log::*;
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case", author, about)]
/// Merge feature × sample count matrices from several datasets
struct Args {
    #[structopt(subcommand)]
    subcommand: Subcommand,
}

#[derive(StructOpt)]
enum Subcommand {
    /// Align target datasets to a source dataset and merge their samples
    Integrate(commands::IntegrateArgs),
}

impl Subcommand {
    fn run(self) -> Result<()> {
        match self {
            Subcommand::Integrate(args) => commands::run_integrate(args)?,
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    if let Err(err) = Args::from_args().subcommand.run() {
        if is_broken_pipe(&err) {
            std::process::exit(0);
        }
        error!("{:#}", err);
        std::process::exit(1);
    }
    Ok(())
}
