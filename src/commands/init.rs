use crate::core::config::{default_config_path, TargetSpec};
use crate::error::Result;
use std::path::{Path, PathBuf};

pub fn init_config(path: Option<&Path>, force: bool) -> Result<PathBuf> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };

    TargetSpec::default().save(&path, force)?;

    println!("🔧 Wrote default configuration to {}", path.display());
    println!();
    println!("Edit root_url, target_prefixes and download_root, then run:");
    println!("  fwscrape scrape --config {}", path.display());

    Ok(path)
}
