use crate::core::config::{Overrides, TargetSpec};
use crate::core::download::{Orchestrator, RunSummary};
use crate::core::fetch::ReqwestTransport;
use crate::error::Result;
use std::path::Path;

pub fn scrape(config_path: Option<&Path>, overrides: Overrides) -> Result<RunSummary> {
    let spec = TargetSpec::resolve(config_path)?
        .with_overrides(overrides)
        .validate()?;

    print_banner(&spec);

    let transport = ReqwestTransport::new(&spec)?;
    let orchestrator = Orchestrator::new(spec, transport);
    let summary = orchestrator.run()?;

    print_summary(&summary);
    Ok(summary)
}

fn print_banner(spec: &TargetSpec) {
    println!();
    println!("=== Firmware Scraper ===");
    println!("Started: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!("Base URL: {}", spec.root_url);
    println!("Target Models: {}", spec.target_prefixes.join(", "));
    println!("Download Path: {}", spec.download_root.display());
    println!("Ignored Extensions: {}", spec.ignored_extensions.join(", "));
    println!("Existing Files: {:?}", spec.existing_files);
    println!("{}", "=".repeat(30));
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("=== Summary ===");
    println!(
        "✅ Downloaded: {} ({} bytes)",
        summary.downloaded, summary.bytes_written
    );
    println!(
        "⏭️  Skipped: {} ({} ignored, {} already present)",
        summary.skipped(),
        summary.skipped_ignored,
        summary.skipped_existing
    );
    println!("❌ Failed: {}", summary.failed);
    if summary.listing_failures > 0 {
        println!("⚠️  Unreadable listings: {}", summary.listing_failures);
    }
    if summary.rejected_paths > 0 {
        println!("⚠️  Rejected unsafe paths: {}", summary.rejected_paths);
    }

    println!();
    println!(
        "Found {} firmware directories:",
        summary.firmware_dirs.len()
    );
    for dir in &summary.firmware_dirs {
        println!("📁 {dir}");
    }
}
