use crate::error::{Result, ScrapeError};
use std::path::Path;
use tempfile::NamedTempFile;

pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| ScrapeError::filesystem(path, e))?;
    }
    Ok(())
}

/// Like [`ensure_dir_exists`], but gives a transient failure one more chance
/// before reporting it.
pub fn ensure_dir_with_retry(path: &Path) -> Result<()> {
    match ensure_dir_exists(path) {
        Ok(()) => Ok(()),
        Err(ScrapeError::PermissionDenied { path }) => Err(ScrapeError::PermissionDenied { path }),
        Err(first) => {
            tracing::debug!(path = %path.display(), "retrying directory creation after: {first}");
            ensure_dir_exists(path)
        }
    }
}

/// Create a temporary file in `dir`, to be moved into place with [`commit`].
/// Dropping it without committing removes it.
pub fn stage_in(dir: &Path) -> Result<NamedTempFile> {
    NamedTempFile::new_in(dir).map_err(|e| ScrapeError::filesystem(dir, e))
}

/// Flush `staged` to disk and rename it to `path`, so `path` either keeps its
/// old content or holds all of the new content.
pub fn commit(staged: NamedTempFile, path: &Path) -> Result<()> {
    staged
        .as_file()
        .sync_all()
        .map_err(|e| ScrapeError::filesystem(staged.path(), e))?;
    staged
        .persist(path)
        .map_err(|e| ScrapeError::filesystem(path, e.error))?;

    Ok(())
}
