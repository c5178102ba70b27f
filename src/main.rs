use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

// Use the library modules
use fwscrape::core::compare::{HarnessOptions, DEFAULT_NEW_SUFFIX, DEFAULT_OLD_SUFFIX};
use fwscrape::core::config::Overrides;
use fwscrape::core::retry::BackoffPolicy;
use fwscrape::{commands, utils};

#[derive(Parser)]
#[clap(name = "fwscrape")]
#[clap(about = "Crawl a vendor download tree for firmware and compare decoded artifacts")]
#[clap(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Enable debug output
    #[clap(short, long, global = true)]
    verbose: bool,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the listing tree and download firmware files
    Scrape {
        /// Config file (default: <config dir>/fwscrape/config.toml if present)
        #[clap(short, long)]
        config: Option<PathBuf>,
        /// Root listing URL
        #[clap(long)]
        root_url: Option<String>,
        /// Model prefix to include (repeatable)
        #[clap(short, long = "model")]
        models: Vec<String>,
        /// File extension to skip (repeatable)
        #[clap(short, long = "ignore-ext")]
        ignore_ext: Vec<String>,
        /// Local directory mirroring the remote tree
        #[clap(short, long)]
        download_root: Option<PathBuf>,
        /// Attempts per request (at least 1)
        #[clap(long)]
        max_attempts: Option<u32>,
        /// Backoff between retries: fixed or exponential
        #[clap(long)]
        backoff: Option<String>,
        /// Base backoff interval in milliseconds (default: 1000)
        #[clap(long)]
        backoff_ms: Option<u64>,
        /// Download files again even if they already exist locally
        #[clap(long)]
        refetch: bool,
    },
    /// Compare old/new decoded variants of every artifact under a directory
    Compare {
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
    },
    /// Write a default configuration file
    InitConfig {
        /// Where to write it (default: <config dir>/fwscrape/config.toml)
        #[clap(short, long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[clap(long)]
        force: bool,
    },
}

fn parse_backoff(kind: &str, base_ms: u64) -> Result<BackoffPolicy> {
    let base = Duration::from_millis(base_ms);
    match kind {
        "fixed" => Ok(BackoffPolicy::fixed(base)),
        "exponential" => Ok(BackoffPolicy::exponential(base)),
        other => Err(anyhow::anyhow!(
            "unknown backoff '{other}' (expected fixed or exponential)"
        )),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    utils::logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Scrape {
            config,
            root_url,
            models,
            ignore_ext,
            download_root,
            max_attempts,
            backoff,
            backoff_ms,
            refetch,
        } => {
            let backoff = match (backoff, backoff_ms) {
                (None, None) => None,
                (kind, base_ms) => Some(parse_backoff(
                    kind.as_deref().unwrap_or("exponential"),
                    base_ms.unwrap_or(1000),
                )?),
            };
            let overrides = Overrides {
                root_url,
                target_prefixes: models,
                ignored_extensions: ignore_ext,
                download_root,
                max_attempts,
                backoff,
                refetch,
            };
            commands::scrape::scrape(config.as_deref(), overrides)
                .map(|_| ())
                .map_err(|e| anyhow::anyhow!(e))
        }
        Commands::Compare {
            dir,
            old_suffix,
            new_suffix,
            format,
        } => {
            let options = HarnessOptions {
                root: dir,
                old_suffix,
                new_suffix,
            };
            commands::compare::run_comparison(&options, &format)
                .map(|_| ())
                .map_err(|e| anyhow::anyhow!(e))
        }
        Commands::InitConfig { path, force } => commands::init::init_config(path.as_deref(), force)
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!(e)),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    Ok(())
}
