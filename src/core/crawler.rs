//! Lazy walk of the vendor's listing tree.
//!
//! The tree is expected to look like `root/<model>/<submodel>/<firmware>/...`.
//! Below a submodel the crawler looks for a firmware folder and, when it does not
//! find one, descends exactly one more level. Inside a firmware folder every file
//! is a candidate and subfolders are followed up to `firmware_max_depth`.
//!
//! Work is kept on an explicit stack, so only one listing page is held at a time
//! and candidates come out in the order the pages list them.

use crate::core::config::TargetSpec;
use crate::core::fetch::{Fetcher, Transport};
use crate::core::listing::{AutoindexExtractor, LinkExtractor, ListingNode};
use crate::error::Result;
use percent_encoding::percent_decode_str;
use reqwest::Url;
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// How many non-firmware levels below a submodel are searched.
const SUBMODEL_EXTRA_LEVELS: usize = 1;

/// A file found inside a firmware folder, not yet fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadCandidate {
    pub url: Url,
    /// Decoded final segment of the URL.
    pub file_name: String,
    /// Decoded path below the root URL, mirrored under the download root.
    pub relative_path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct CrawlStats {
    pub listings_fetched: usize,
    pub listing_failures: usize,
    pub rejected_paths: usize,
    pub firmware_dirs: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Root,
    Model,
    Submodel { extra_levels: usize },
    Firmware { depth: usize },
}

enum Work {
    List { url: Url, level: Level },
    Emit(DownloadCandidate),
}

pub struct Crawler<'a, T, E = AutoindexExtractor> {
    fetcher: &'a Fetcher<T>,
    spec: &'a TargetSpec,
    extractor: E,
    root: Url,
    stack: Vec<Work>,
    /// Local paths already handed out; distinct URLs can decode to the same one.
    emitted: HashSet<PathBuf>,
    stats: CrawlStats,
}

/// Start a crawl of `spec.root_url` for `spec.target_prefixes`.
pub fn discover<'a, T: Transport>(
    fetcher: &'a Fetcher<T>,
    spec: &'a TargetSpec,
) -> Result<Crawler<'a, T>> {
    Crawler::new(fetcher, spec)
}

impl<'a, T: Transport> Crawler<'a, T> {
    pub fn new(fetcher: &'a Fetcher<T>, spec: &'a TargetSpec) -> Result<Self> {
        let root = spec.root()?;
        Ok(Self {
            fetcher,
            spec,
            extractor: AutoindexExtractor::new(),
            stack: vec![Work::List {
                url: root.clone(),
                level: Level::Root,
            }],
            root,
            emitted: HashSet::new(),
            stats: CrawlStats::default(),
        })
    }
}

impl<'a, T: Transport, E: LinkExtractor> Crawler<'a, T, E> {
    pub fn with_extractor<F: LinkExtractor>(self, extractor: F) -> Crawler<'a, T, F> {
        Crawler {
            fetcher: self.fetcher,
            spec: self.spec,
            extractor,
            root: self.root,
            stack: self.stack,
            emitted: self.emitted,
            stats: self.stats,
        }
    }

    pub fn into_stats(self) -> CrawlStats {
        self.stats
    }

    fn list(&mut self, url: &Url) -> Option<ListingNode> {
        let fetched = match self.fetcher.fetch(url) {
            Ok(fetched) => fetched,
            Err(failure) => {
                warn!(%url, "⚠️ Skipping listing: {failure}");
                self.stats.listing_failures += 1;
                return None;
            }
        };

        match self.extractor.extract(url, &fetched.body) {
            Ok(node) => {
                self.stats.listings_fetched += 1;
                Some(node)
            }
            Err(e) => {
                warn!(%url, "⚠️ Skipping unreadable listing: {e}");
                self.stats.listing_failures += 1;
                None
            }
        }
    }

    fn expand(&mut self, url: Url, level: Level) {
        let Some(node) = self.list(&url) else {
            return;
        };

        let mut children = Vec::new();
        for link in &node.links {
            match level {
                Level::Root => {
                    if link.is_dir
                        && self
                            .spec
                            .prefix_match
                            .matches(&link.name, &self.spec.target_prefixes)
                    {
                        info!("👉 Processing model: {}", link.name);
                        children.push(Work::List {
                            url: link.url.clone(),
                            level: Level::Model,
                        });
                    }
                }
                Level::Model => {
                    if link.is_dir {
                        debug!(url = %link.url, "submodel directory");
                        children.push(Work::List {
                            url: link.url.clone(),
                            level: Level::Submodel {
                                extra_levels: SUBMODEL_EXTRA_LEVELS,
                            },
                        });
                    }
                }
                Level::Submodel { extra_levels } => {
                    if !link.is_dir {
                        continue;
                    }
                    if self.spec.folder_match.matches(&link.name) {
                        info!("📁 Found firmware directory: {}", link.url);
                        self.stats.firmware_dirs.insert(link.url.to_string());
                        children.push(Work::List {
                            url: link.url.clone(),
                            level: Level::Firmware { depth: 0 },
                        });
                    } else if extra_levels > 0 {
                        children.push(Work::List {
                            url: link.url.clone(),
                            level: Level::Submodel {
                                extra_levels: extra_levels - 1,
                            },
                        });
                    } else {
                        debug!(url = %link.url, "no firmware folder within search depth");
                    }
                }
                Level::Firmware { depth } => {
                    if link.is_dir {
                        if depth < self.spec.firmware_max_depth {
                            info!("📂 Found subdirectory: {}", link.url);
                            children.push(Work::List {
                                url: link.url.clone(),
                                level: Level::Firmware { depth: depth + 1 },
                            });
                        } else {
                            warn!("⚠️ Maximum depth reached at {}", link.url);
                        }
                    } else if let Some(candidate) = self.candidate(&link.url, &link.name) {
                        children.push(Work::Emit(candidate));
                    }
                }
            }
        }

        self.stack.extend(children.into_iter().rev());
    }

    fn candidate(&mut self, url: &Url, file_name: &str) -> Option<DownloadCandidate> {
        let Some(relative_path) = relative_path(&self.root, url) else {
            warn!(%url, "⚠️ Rejected candidate with unsafe local path");
            self.stats.rejected_paths += 1;
            return None;
        };

        if !self.emitted.insert(relative_path.clone()) {
            warn!(
                %url,
                "⚠️ Rejected candidate colliding with {}",
                relative_path.display()
            );
            self.stats.rejected_paths += 1;
            return None;
        }

        Some(DownloadCandidate {
            url: url.clone(),
            file_name: file_name.to_string(),
            relative_path,
        })
    }
}

impl<T: Transport, E: LinkExtractor> Iterator for Crawler<'_, T, E> {
    type Item = DownloadCandidate;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(work) = self.stack.pop() {
            match work {
                Work::Emit(candidate) => return Some(candidate),
                Work::List { url, level } => self.expand(url, level),
            }
        }
        None
    }
}

/// Decoded path of `url` below `root`, or `None` if it is outside the root or
/// would escape the download directory once decoded.
pub fn relative_path(root: &Url, url: &Url) -> Option<PathBuf> {
    let remainder = url.path().strip_prefix(root.path())?;

    let mut path = PathBuf::new();
    for raw in remainder.trim_end_matches('/').split('/') {
        let segment = percent_decode_str(raw).decode_utf8().ok()?;
        if segment.is_empty()
            || segment == "."
            || segment == ".."
            || segment.contains(['/', '\\', '\0'])
        {
            return None;
        }
        path.push(segment.as_ref());
    }

    if path.as_os_str().is_empty() {
        None
    } else {
        Some(path)
    }
}
