//! Standalone `fwcompare` CLI
//!
//! Same as `fwscrape compare`, for use inside decode pipelines:
//!   fwcompare              → fwscrape compare .
//!   fwcompare out/ -f json → fwscrape compare out/ --format json

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use fwscrape::commands::compare::run_comparison;
use fwscrape::core::compare::{HarnessOptions, DEFAULT_NEW_SUFFIX, DEFAULT_OLD_SUFFIX};
use fwscrape::utils::logging;

#[derive(Parser)]
#[clap(name = "fwcompare")]
#[clap(about = "Compare old/new decoded firmware variants by SHA-256")]
#[clap(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Directory to scan (default: current directory)
    #[clap(default_value = ".")]
    dir: PathBuf,
    /// Suffix of the old decoded variant
    #[clap(long, default_value = DEFAULT_OLD_SUFFIX)]
    old_suffix: String,
    /// Suffix of the new decoded variant
    #[clap(long, default_value = DEFAULT_NEW_SUFFIX)]
    new_suffix: String,
    /// Output format: text or json
    #[clap(short, long, default_value = "text")]
    format: String,
    /// Enable debug output
    #[clap(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let options = HarnessOptions {
        root: cli.dir,
        old_suffix: cli.old_suffix,
        new_suffix: cli.new_suffix,
    };

    if let Err(e) = run_comparison(&options, &cli.format) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    Ok(())
}
