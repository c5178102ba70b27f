#![allow(dead_code)]

use fwscrape::core::config::TargetSpec;
use fwscrape::core::fetch::{AttemptError, HttpResponse, Transport};
use fwscrape::core::retry::BackoffPolicy;
use reqwest::Url;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const ROOT: &str = "http://fw.test/pub/";

/// In-memory web server: URL -> (status, body). Unknown URLs answer 404.
#[derive(Default)]
pub struct StaticSite {
    pages: HashMap<String, (u16, Vec<u8>)>,
    hits: RefCell<HashMap<String, u32>>,
}

impl StaticSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an autoindex page at `path` (relative to ROOT) listing `entries`.
    pub fn dir(mut self, path: &str, entries: &[&str]) -> Self {
        self.pages
            .insert(url(path), (200, listing(path, entries).into_bytes()));
        self
    }

    pub fn file(mut self, path: &str, body: &[u8]) -> Self {
        self.pages.insert(url(path), (200, body.to_vec()));
        self
    }

    pub fn status(mut self, path: &str, status: u16) -> Self {
        self.pages.insert(url(path), (status, Vec::new()));
        self
    }

    pub fn hits(&self, path: &str) -> u32 {
        self.hits.borrow().get(&url(path)).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> u32 {
        self.hits.borrow().values().sum()
    }
}

impl Transport for StaticSite {
    fn get(&self, url: &Url) -> Result<HttpResponse, AttemptError> {
        *self.hits.borrow_mut().entry(url.to_string()).or_insert(0) += 1;
        let (status, body) = self
            .pages
            .get(url.as_str())
            .cloned()
            .unwrap_or((404, Vec::new()));
        Ok(HttpResponse { status, body })
    }
}

pub fn url(path: &str) -> String {
    format!("{ROOT}{path}")
}

/// Apache-style index page, including the sort and parent links real servers emit.
pub fn listing(path: &str, entries: &[&str]) -> String {
    let mut html = format!(
        "<html><head><title>Index of /pub/{path}</title></head><body>\n\
         <a href=\"?C=N;O=D\">Name</a> <a href=\"?C=M;O=A\">Last modified</a>\n\
         <a href=\"../\">Parent Directory</a>\n"
    );
    for entry in entries {
        html.push_str(&format!("<a href=\"{entry}\">{entry}</a>\n"));
    }
    html.push_str("</body></html>");
    html
}

pub fn spec(download_root: &Path, prefixes: &[&str]) -> TargetSpec {
    TargetSpec {
        root_url: ROOT.to_string(),
        target_prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
        ignored_extensions: vec!["pdf".to_string(), "TXT".to_string()],
        download_root: download_root.to_path_buf(),
        max_attempts: 2,
        backoff: BackoffPolicy::fixed(Duration::ZERO),
        ..TargetSpec::default()
    }
    .validate()
    .unwrap()
}
