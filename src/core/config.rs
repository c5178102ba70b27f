use crate::core::retry::BackoffPolicy;
use crate::error::{Result, ScrapeError};
use crate::utils::fs;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_ROOT_URL: &str = "http://downloads.d-link.co.za/";
const DEFAULT_DOWNLOAD_ROOT: &str = "dlink_firmware";
const DEFAULT_MODELS: &[&str] = &["DAP", "DIR", "DRA", "E", "G", "M", "R"];
const DEFAULT_IGNORED: &[&str] = &["doc", "pdf", "txt", "xls", "docx", "md5"];
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Everything a scrape run needs, loaded once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub root_url: String,
    pub target_prefixes: Vec<String>,
    #[serde(default)]
    pub ignored_extensions: Vec<String>,
    pub download_root: PathBuf,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: BackoffPolicy,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub prefix_match: PrefixMatch,
    #[serde(default)]
    pub folder_match: FolderMatch,
    /// How deep the crawler may recurse below a firmware folder.
    #[serde(default = "default_firmware_max_depth")]
    pub firmware_max_depth: usize,
    #[serde(default)]
    pub existing_files: ExistingFilePolicy,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_firmware_max_depth() -> usize {
    5
}

/// How model directory names on the root listing are matched against the
/// configured prefixes. Always case-sensitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefixMatch {
    #[default]
    Prefix,
    Exact,
}

impl PrefixMatch {
    pub fn matches(self, name: &str, prefixes: &[String]) -> bool {
        prefixes.iter().any(|prefix| match self {
            PrefixMatch::Prefix => name.starts_with(prefix.as_str()),
            PrefixMatch::Exact => name == prefix,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    Exact,
    Contains,
}

/// Rule for recognizing a firmware folder by its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderMatch {
    #[serde(default = "default_folder_pattern")]
    pub pattern: String,
    #[serde(default)]
    pub mode: MatchMode,
    #[serde(default)]
    pub case_sensitive: bool,
}

fn default_folder_pattern() -> String {
    "firmware".to_string()
}

impl Default for FolderMatch {
    fn default() -> Self {
        Self {
            pattern: default_folder_pattern(),
            mode: MatchMode::Exact,
            case_sensitive: false,
        }
    }
}

impl FolderMatch {
    pub fn matches(&self, name: &str) -> bool {
        let (name, pattern) = if self.case_sensitive {
            (name.to_string(), self.pattern.clone())
        } else {
            (name.to_lowercase(), self.pattern.to_lowercase())
        };

        match self.mode {
            MatchMode::Exact => name == pattern,
            MatchMode::Contains => name.contains(&pattern),
        }
    }
}

/// What to do when the local target of a candidate already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingFilePolicy {
    #[default]
    Skip,
    Refetch,
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub root_url: Option<String>,
    pub target_prefixes: Vec<String>,
    pub ignored_extensions: Vec<String>,
    pub download_root: Option<PathBuf>,
    pub max_attempts: Option<u32>,
    pub backoff: Option<BackoffPolicy>,
    pub refetch: bool,
}

impl Default for TargetSpec {
    fn default() -> Self {
        Self {
            root_url: DEFAULT_ROOT_URL.to_string(),
            target_prefixes: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            ignored_extensions: DEFAULT_IGNORED.iter().map(|e| e.to_string()).collect(),
            download_root: PathBuf::from(DEFAULT_DOWNLOAD_ROOT),
            max_attempts: default_max_attempts(),
            backoff: BackoffPolicy::default(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            prefix_match: PrefixMatch::default(),
            folder_match: FolderMatch::default(),
            firmware_max_depth: default_firmware_max_depth(),
            existing_files: ExistingFilePolicy::default(),
        }
    }
}

impl TargetSpec {
    /// Load a spec from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ScrapeError::config_error(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load the given file, or the default config file if present, or the
    /// built-in defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match default_config_path() {
                Ok(path) if path.exists() => Self::load(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the spec as TOML, refusing to clobber an existing file unless `force`.
    pub fn save(&self, path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            return Err(ScrapeError::ConfigExists {
                path: path.to_path_buf(),
            });
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::ensure_dir_exists(parent)?;
            }
        }

        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(root_url) = overrides.root_url {
            self.root_url = root_url;
        }
        if !overrides.target_prefixes.is_empty() {
            self.target_prefixes = overrides.target_prefixes;
        }
        if !overrides.ignored_extensions.is_empty() {
            self.ignored_extensions = overrides.ignored_extensions;
        }
        if let Some(download_root) = overrides.download_root {
            self.download_root = download_root;
        }
        if let Some(max_attempts) = overrides.max_attempts {
            self.max_attempts = max_attempts;
        }
        if let Some(backoff) = overrides.backoff {
            self.backoff = backoff;
        }
        if overrides.refetch {
            self.existing_files = ExistingFilePolicy::Refetch;
        }
        self
    }

    /// Normalize and check the spec. The returned value is what the engine runs on.
    pub fn validate(mut self) -> Result<Self> {
        if !self.root_url.ends_with('/') {
            self.root_url.push('/');
        }
        let root = Url::parse(&self.root_url)
            .map_err(|e| ScrapeError::invalid_url(self.root_url.clone(), e))?;
        if root.cannot_be_a_base() {
            return Err(ScrapeError::invalid_url(
                self.root_url.clone(),
                "URL cannot be used as a base",
            ));
        }

        self.target_prefixes.retain(|p| !p.trim().is_empty());
        if self.target_prefixes.is_empty() {
            return Err(ScrapeError::config_error(
                "at least one target prefix is required",
            ));
        }

        if self.max_attempts == 0 {
            return Err(ScrapeError::config_error("max_attempts must be at least 1"));
        }

        if self.folder_match.pattern.is_empty() {
            return Err(ScrapeError::config_error(
                "folder_match.pattern must not be empty",
            ));
        }

        self.ignored_extensions = self
            .ignored_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        Ok(self)
    }

    pub fn root(&self) -> Result<Url> {
        Url::parse(&self.root_url).map_err(|e| ScrapeError::invalid_url(self.root_url.clone(), e))
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("fwscrape").join("config.toml"))
        .ok_or(ScrapeError::ConfigDirectoryNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_minimal_config() {
        let content = r#"
root_url = "http://example.test/pub"
target_prefixes = ["DIR"]
download_root = "out"
"#;

        let spec = TargetSpec::parse(content).unwrap().validate().unwrap();
        assert_eq!(spec.root_url, "http://example.test/pub/");
        assert_eq!(spec.max_attempts, 3);
        assert_eq!(spec.timeout_secs, 30);
        assert_eq!(spec.firmware_max_depth, 5);
        assert_eq!(spec.existing_files, ExistingFilePolicy::Skip);
        assert!(spec.ignored_extensions.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let content = r#"
root_url = "http://example.test/"
target_prefixes = ["DAP", "DIR"]
ignored_extensions = [".PDF", "txt", " "]
download_root = "/tmp/fw"
max_attempts = 5
prefix_match = "exact"
existing_files = "refetch"

[backoff]
kind = "fixed"
base_ms = 250

[folder_match]
pattern = "Firmware"
mode = "contains"
case_sensitive = true
"#;

        let spec = TargetSpec::parse(content).unwrap().validate().unwrap();
        assert_eq!(spec.ignored_extensions, vec!["pdf", "txt"]);
        assert_eq!(spec.max_attempts, 5);
        assert_eq!(spec.prefix_match, PrefixMatch::Exact);
        assert_eq!(spec.existing_files, ExistingFilePolicy::Refetch);
        assert_eq!(spec.backoff.delay(3), Duration::from_millis(250));
        assert!(spec.folder_match.matches("Old-Firmware"));
        assert!(!spec.folder_match.matches("old-firmware"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut spec = TargetSpec::default();
        spec.target_prefixes = vec!["  ".to_string()];
        assert!(spec.validate().is_err());

        let mut spec = TargetSpec::default();
        spec.max_attempts = 0;
        assert!(spec.validate().is_err());

        let mut spec = TargetSpec::default();
        spec.root_url = "not a url".to_string();
        assert!(matches!(
            spec.validate(),
            Err(ScrapeError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_prefix_match() {
        let prefixes = vec!["DIR".to_string(), "E".to_string()];
        assert!(PrefixMatch::Prefix.matches("DIR-825", &prefixes));
        assert!(PrefixMatch::Prefix.matches("E15", &prefixes));
        assert!(!PrefixMatch::Prefix.matches("dir-825", &prefixes));
        assert!(PrefixMatch::Exact.matches("DIR", &prefixes));
        assert!(!PrefixMatch::Exact.matches("DIR-825", &prefixes));
    }

    #[test]
    fn test_default_folder_match() {
        let rule = FolderMatch::default();
        assert!(rule.matches("firmware"));
        assert!(rule.matches("Firmware"));
        assert!(rule.matches("FIRMWARE"));
        assert!(!rule.matches("firmware-old"));
        assert!(!rule.matches("drivers"));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let spec = TargetSpec::default().with_overrides(Overrides {
            root_url: Some("http://mirror.test/".to_string()),
            target_prefixes: vec!["DAP".to_string()],
            max_attempts: Some(7),
            refetch: true,
            ..Overrides::default()
        });

        assert_eq!(spec.root_url, "http://mirror.test/");
        assert_eq!(spec.target_prefixes, vec!["DAP"]);
        assert_eq!(spec.max_attempts, 7);
        assert_eq!(spec.existing_files, ExistingFilePolicy::Refetch);
        assert_eq!(spec.download_root, PathBuf::from(DEFAULT_DOWNLOAD_ROOT));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let spec = TargetSpec::default();
        spec.save(&path, false).unwrap();
        assert!(matches!(
            spec.save(&path, false),
            Err(ScrapeError::ConfigExists { .. })
        ));
        spec.save(&path, true).unwrap();

        let loaded = TargetSpec::load(&path).unwrap();
        assert_eq!(loaded, spec);
    }
}
