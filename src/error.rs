use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScrapeError>;

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("HTTP client error: {message}")]
    HttpClient { message: String },

    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config file already exists: {path}")]
    ConfigExists { path: PathBuf },

    #[error("Config directory not found")]
    ConfigDirectoryNotFound,
}

impl ScrapeError {
    pub fn config_error<S: Into<String>>(message: S) -> Self {
        ScrapeError::Config {
            message: message.into(),
        }
    }

    pub fn invalid_url<U: Into<String>, M: ToString>(url: U, message: M) -> Self {
        ScrapeError::InvalidUrl {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Wrap an IO error with the path it happened on, keeping permission
    /// problems distinguishable.
    pub fn filesystem(path: &std::path::Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => ScrapeError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => ScrapeError::Filesystem {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}
