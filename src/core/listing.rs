//! Directory listing pages and link extraction.
//!
//! The remote site's markup is not specified anywhere, so extraction is a
//! [`LinkExtractor`] strategy. [`AutoindexExtractor`] handles Apache/nginx style
//! index pages.

use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::Url;
use thiserror::Error;

/// One child link of a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// The raw href as written in the page.
    pub href: String,
    /// Absolute URL the href resolves to.
    pub url: Url,
    /// Decoded final path segment, e.g. `DIR-825 Rev B`.
    pub name: String,
    /// Guessed from a trailing slash.
    pub is_dir: bool,
}

/// A fetched listing page. Lives only as long as one crawl step.
#[derive(Debug, Clone)]
pub struct ListingNode {
    pub url: Url,
    pub links: Vec<Link>,
}

impl ListingNode {
    pub fn directories(&self) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(|link| link.is_dir)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ListingError {
    #[error("listing at {url} is not text")]
    NotText { url: String },
    #[error("listing at {url} has no markup")]
    NoMarkup { url: String },
}

pub trait LinkExtractor {
    fn extract(&self, page_url: &Url, body: &[u8]) -> Result<ListingNode, ListingError>;
}

impl<E: LinkExtractor + ?Sized> LinkExtractor for Box<E> {
    fn extract(&self, page_url: &Url, body: &[u8]) -> Result<ListingNode, ListingError> {
        (**self).extract(page_url, body)
    }
}

/// Pulls `href` attributes out of anchors and keeps only links that point
/// strictly below the listing's own directory.
pub struct AutoindexExtractor {
    anchor: Regex,
}

impl Default for AutoindexExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoindexExtractor {
    pub fn new() -> Self {
        let anchor = Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
            .expect("anchor pattern is a valid regex");
        Self { anchor }
    }

    fn resolve(&self, page_url: &Url, href: &str) -> Option<Link> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('?') || href.starts_with('#') {
            return None;
        }

        let mut url = page_url.join(href).ok()?;
        url.set_query(None);
        url.set_fragment(None);

        // Parent links, absolute links elsewhere and the page itself.
        if url.scheme() != page_url.scheme()
            || url.host_str() != page_url.host_str()
            || url.port_or_known_default() != page_url.port_or_known_default()
        {
            return None;
        }
        let base_path = directory_path(page_url);
        let child_path = url.path();
        if !child_path.starts_with(base_path) || child_path.len() <= base_path.len() {
            return None;
        }

        let remainder = &child_path[base_path.len()..];
        let is_dir = remainder.ends_with('/');
        let segment = remainder.trim_end_matches('/');
        // Only direct children belong to this listing.
        if segment.is_empty() || segment.contains('/') {
            return None;
        }

        let name = percent_decode_str(segment).decode_utf8_lossy().into_owned();
        Some(Link {
            href: href.to_string(),
            url,
            name,
            is_dir,
        })
    }
}

impl LinkExtractor for AutoindexExtractor {
    fn extract(&self, page_url: &Url, body: &[u8]) -> Result<ListingNode, ListingError> {
        let text = std::str::from_utf8(body).map_err(|_| ListingError::NotText {
            url: page_url.to_string(),
        })?;
        if !text.contains('<') {
            return Err(ListingError::NoMarkup {
                url: page_url.to_string(),
            });
        }

        let mut links: Vec<Link> = Vec::new();
        for captures in self.anchor.captures_iter(text) {
            let Some(href) = captures
                .get(1)
                .or_else(|| captures.get(2))
                .or_else(|| captures.get(3))
            else {
                continue;
            };

            let href = decode_entities(href.as_str());
            if let Some(link) = self.resolve(page_url, &href) {
                if !links.iter().any(|known| known.url == link.url) {
                    links.push(link);
                }
            }
        }

        Ok(ListingNode {
            url: page_url.clone(),
            links,
        })
    }
}

/// Path of the directory a page represents, always ending in `/`.
fn directory_path(url: &Url) -> &str {
    let path = url.path();
    match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "/",
    }
}

fn decode_entities(href: &str) -> String {
    href.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}
