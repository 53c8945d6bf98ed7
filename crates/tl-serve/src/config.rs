use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_DB_PATH: &str = ".tally/analytics.db";
pub const DEFAULT_PORT: u16 = 4830;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },
    #[error("failed to parse config: {message}")]
    Parse { message: String },
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Which inbound requests the capture middleware records.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CapturePolicy {
    pub track_page_views: bool,
    pub track_api_calls: bool,
    pub api_prefix: String,
    /// Exact paths or path prefixes (segment-aligned) that are never recorded.
    pub ignore_paths: Vec<String>,
    /// File extensions (with the dot) treated as static assets.
    pub ignore_extensions: Vec<String>,
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self {
            track_page_views: true,
            track_api_calls: true,
            api_prefix: "/api".to_string(),
            ignore_paths: [
                "/health",
                "/favicon.ico",
                "/static",
                "/assets",
                "/analytics",
                "/openapi.json",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            ignore_extensions: [
                ".js", ".css", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff",
                ".woff2", ".map",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

fn under_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

impl CapturePolicy {
    pub fn is_ignored(&self, path: &str) -> bool {
        if self
            .ignore_paths
            .iter()
            .any(|ignored| under_prefix(path, ignored))
        {
            return true;
        }
        let lower = path.to_ascii_lowercase();
        self.ignore_extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
    }

    pub fn is_api(&self, path: &str) -> bool {
        under_prefix(path, &self.api_prefix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub db_path: String,
    pub host: IpAddr,
    pub port: u16,
    pub capture: CapturePolicy,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            capture: CapturePolicy::default(),
        }
    }
}

impl ServeConfig {
    /// File (if any), then `TALLY_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| ConfigError::Parse {
            message: err.to_string(),
        })
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("TALLY_DB_PATH") {
            self.db_path = value;
        }
        if let Some(value) = lookup("TALLY_HOST") {
            self.host = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "TALLY_HOST",
                value,
            })?;
        }
        if let Some(value) = lookup("TALLY_PORT") {
            self.port = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "TALLY_PORT",
                value,
            })?;
        }
        if let Some(value) = lookup("TALLY_TRACK_PAGE_VIEWS") {
            self.capture.track_page_views = parse_flag("TALLY_TRACK_PAGE_VIEWS", value)?;
        }
        if let Some(value) = lookup("TALLY_TRACK_API_CALLS") {
            self.capture.track_api_calls = parse_flag("TALLY_TRACK_API_CALLS", value)?;
        }
        Ok(())
    }
}

fn parse_flag(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue { key, value }),
    }
}
