//! Offline comparison of decoded firmware variants.
//!
//! For every `<base><old-suffix>` file under a tree, the base artifact, the old
//! decoded variant and the new decoded variant (`<base><new-suffix>`) are hashed
//! with SHA-256 and classified. The harness only reads; producing the decoded
//! variants is somebody else's job.

use crate::error::{Result, ScrapeError};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

pub const DEFAULT_OLD_SUFFIX: &str = ".old.dec";
pub const DEFAULT_NEW_SUFFIX: &str = ".new.dec";

/// Number of leading bytes shown as the magic column.
const MAGIC_LEN: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Identical,
    Different,
    Missing,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::Identical => "IDENTICAL",
            Status::Different => "DIFFERENT",
            Status::Missing => "MISSING",
        };
        // Pad through the formatter so width flags apply.
        f.pad(label)
    }
}

/// Hashes and verdict for one base artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonRecord {
    pub base_path: PathBuf,
    pub base_hash: Option<String>,
    pub old_hash: Option<String>,
    pub new_hash: Option<String>,
    pub magic: String,
    pub status: Status,
}

impl ComparisonRecord {
    /// One fixed-width report line: status, base path, base hash, magic.
    pub fn row(&self) -> String {
        let row = format!(
            "{:<9}  {:<60}  {:<64}  {}",
            self.status,
            self.base_path.display(),
            self.base_hash.as_deref().unwrap_or("-"),
            self.magic
        );
        row.trim_end().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct HarnessOptions {
    pub root: PathBuf,
    pub old_suffix: String,
    pub new_suffix: String,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            old_suffix: DEFAULT_OLD_SUFFIX.to_string(),
            new_suffix: DEFAULT_NEW_SUFFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub identical: usize,
    pub different: usize,
    pub missing: usize,
}

impl Tally {
    pub fn of(records: &[ComparisonRecord]) -> Self {
        records.iter().fold(Tally::default(), |mut tally, record| {
            match record.status {
                Status::Identical => tally.identical += 1,
                Status::Different => tally.different += 1,
                Status::Missing => tally.missing += 1,
            }
            tally
        })
    }
}

/// MISSING depends only on whether the new variant exists. Otherwise the two
/// decoded digests must both be known and equal to count as IDENTICAL.
pub fn derive_status(old_hash: Option<&str>, new_exists: bool, new_hash: Option<&str>) -> Status {
    if !new_exists {
        return Status::Missing;
    }
    match (old_hash, new_hash) {
        (Some(old), Some(new)) if old == new => Status::Identical,
        _ => Status::Different,
    }
}

/// Hex SHA-256 of the file's bytes.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// First bytes of the file with everything non-printable dropped.
pub fn magic_bytes(path: &Path) -> io::Result<String> {
    let mut head = Vec::with_capacity(MAGIC_LEN as usize);
    File::open(path)?.take(MAGIC_LEN).read_to_end(&mut head)?;

    Ok(head
        .into_iter()
        .filter(|b| b.is_ascii_graphic() || *b == b' ')
        .map(char::from)
        .collect())
}

fn hash_or_warn(path: &Path) -> Option<String> {
    match hash_file(path) {
        Ok(hash) => Some(hash),
        Err(e) => {
            warn!(path = %path.display(), "cannot hash: {e}");
            None
        }
    }
}

/// Build the record for one old-decoded file. Returns `None` when the file name
/// is nothing but the suffix.
pub fn compare_one(old_path: &Path, options: &HarnessOptions) -> Option<ComparisonRecord> {
    let file_name = old_path.file_name()?.to_str()?;
    let base_name = file_name.strip_suffix(options.old_suffix.as_str())?;
    if base_name.is_empty() {
        return None;
    }

    let base_path = old_path.with_file_name(base_name);
    let new_path = old_path.with_file_name(format!("{base_name}{}", options.new_suffix));

    let base_hash = hash_or_warn(&base_path);
    let old_hash = hash_or_warn(old_path);
    let new_exists = new_path.exists();
    let new_hash = if new_exists {
        hash_or_warn(&new_path)
    } else {
        None
    };

    let magic = magic_bytes(&base_path).unwrap_or_default();
    let status = derive_status(old_hash.as_deref(), new_exists, new_hash.as_deref());

    Some(ComparisonRecord {
        base_path,
        base_hash,
        old_hash,
        new_hash,
        magic,
        status,
    })
}

/// Walk `options.root` and compare every base artifact that has an
/// old-decoded sibling. Records come back sorted by their report row.
pub fn compare_tree(options: &HarnessOptions) -> Result<Vec<ComparisonRecord>> {
    if !options.root.is_dir() {
        return Err(ScrapeError::filesystem(
            &options.root,
            io::Error::new(io::ErrorKind::NotFound, "not a directory"),
        ));
    }
    if options.old_suffix.is_empty() || options.old_suffix == options.new_suffix {
        return Err(ScrapeError::config_error(
            "old and new suffixes must be non-empty and distinct",
        ));
    }

    let mut records = Vec::new();
    for entry in WalkDir::new(&options.root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry: {e}");
                continue;
            }
        };

        if !entry.path().is_file() {
            continue;
        }
        let matches_old = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(options.old_suffix.as_str()));
        if !matches_old {
            continue;
        }

        if let Some(record) = compare_one(entry.path(), options) {
            records.push(record);
        }
    }

    sort_records(&mut records);
    Ok(records)
}

pub fn sort_records(records: &mut [ComparisonRecord]) {
    records.sort_by_cached_key(ComparisonRecord::row);
}

/// Report lines in lexicographic order of the full row text.
pub fn render_report(records: &[ComparisonRecord]) -> Vec<String> {
    let mut rows: Vec<String> = records.iter().map(ComparisonRecord::row).collect();
    rows.sort();
    rows
}
