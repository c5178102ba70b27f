use crate::core::config::{ExistingFilePolicy, TargetSpec};
use crate::core::crawler::{discover, DownloadCandidate};
use crate::core::fetch::{Fetcher, StreamError, Transport};
use crate::core::filter::is_ignored;
use crate::error::{Result, ScrapeError};
use crate::utils::fs;
use std::io;
use std::path::PathBuf;
use tracing::{error, info};

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Downloaded { path: PathBuf, bytes: u64 },
    SkippedIgnored,
    SkippedExisting { path: PathBuf },
    Failed { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub downloaded: usize,
    pub bytes_written: u64,
    pub skipped_ignored: usize,
    pub skipped_existing: usize,
    pub failed: usize,
    pub listing_failures: usize,
    pub rejected_paths: usize,
    /// Every firmware folder URL found, sorted.
    pub firmware_dirs: Vec<String>,
}

impl RunSummary {
    pub fn skipped(&self) -> usize {
        self.skipped_ignored + self.skipped_existing
    }

    fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Downloaded { bytes, .. } => {
                self.downloaded += 1;
                self.bytes_written += *bytes;
            }
            ItemOutcome::SkippedIgnored => self.skipped_ignored += 1,
            ItemOutcome::SkippedExisting { .. } => self.skipped_existing += 1,
            ItemOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Drives the crawler and stores every accepted candidate under the download root.
///
/// Per-item failures end up in the [`RunSummary`]; only filesystem faults under
/// the download root abort the run.
pub struct Orchestrator<T> {
    spec: TargetSpec,
    fetcher: Fetcher<T>,
}

impl<T: Transport> Orchestrator<T> {
    pub fn new(spec: TargetSpec, transport: T) -> Self {
        let fetcher = Fetcher::from_spec(transport, &spec);
        Self { spec, fetcher }
    }

    pub fn run(&self) -> Result<RunSummary> {
        fs::ensure_dir_with_retry(&self.spec.download_root)?;
        info!(root = %self.spec.root_url, "starting crawl");

        let mut summary = RunSummary::default();
        let mut crawler = discover(&self.fetcher, &self.spec)?;

        for candidate in crawler.by_ref() {
            let outcome = self.process(&candidate)?;
            summary.record(&outcome);
        }

        let stats = crawler.into_stats();
        summary.listing_failures = stats.listing_failures;
        summary.rejected_paths = stats.rejected_paths;
        summary.firmware_dirs = stats.firmware_dirs.into_iter().collect();

        Ok(summary)
    }

    /// Filter, fetch and persist a single candidate.
    pub fn process(&self, candidate: &DownloadCandidate) -> Result<ItemOutcome> {
        if is_ignored(&candidate.file_name, &self.spec.ignored_extensions) {
            info!("⏭️ Skipping ignored file type: {}", candidate.file_name);
            return Ok(ItemOutcome::SkippedIgnored);
        }

        let local_path = self.spec.download_root.join(&candidate.relative_path);
        if local_path.exists() && self.spec.existing_files == ExistingFilePolicy::Skip {
            info!("⏭️ Skipping: {} (already exists)", local_path.display());
            return Ok(ItemOutcome::SkippedExisting { path: local_path });
        }

        let parent = local_path
            .parent()
            .unwrap_or(self.spec.download_root.as_path());
        if let Err(err) = fs::ensure_dir_with_retry(parent) {
            return name_fault_or_abort(candidate, err);
        }

        let mut staged = fs::stage_in(parent)?;
        match self.fetcher.fetch_into(&candidate.url, staged.as_file_mut()) {
            Ok(streamed) => {
                if let Err(err) = fs::commit(staged, &local_path) {
                    return name_fault_or_abort(candidate, err);
                }
                info!("✅ Downloaded: {}", local_path.display());
                Ok(ItemOutcome::Downloaded {
                    path: local_path,
                    bytes: streamed.bytes,
                })
            }
            Err(StreamError::Fetch(failure)) => {
                error!("❌ Failed to download {}", failure);
                Ok(ItemOutcome::Failed {
                    reason: failure.to_string(),
                })
            }
            Err(StreamError::Sink(e)) => Err(ScrapeError::filesystem(parent, e)),
        }
    }
}

/// True when the filesystem refused the candidate's own name (too long, or
/// not representable on this platform) rather than the download root itself.
fn is_name_fault(err: &ScrapeError) -> bool {
    match err {
        ScrapeError::Filesystem { source, .. } => matches!(
            source.kind(),
            io::ErrorKind::InvalidFilename | io::ErrorKind::InvalidInput
        ),
        _ => false,
    }
}

/// A bad remote name fails only its own item; every other filesystem fault
/// stops the run.
fn name_fault_or_abort(candidate: &DownloadCandidate, err: ScrapeError) -> Result<ItemOutcome> {
    if is_name_fault(&err) {
        error!("❌ Cannot store {}: {err}", candidate.url);
        Ok(ItemOutcome::Failed {
            reason: err.to_string(),
        })
    } else {
        Err(err)
    }
}
