use crate::error::ViewerError;
use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api/cliente";
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Parser, Debug)]
#[clap(name = "job-log-viewer", version, about)]
pub struct Cli {
    /// Path to an optional TOML configuration file
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Override the backend base URL
    #[clap(long)]
    pub base_url: Option<String>,

    /// Override the HTTP polling period in milliseconds
    #[clap(long)]
    pub poll_interval_ms: Option<u64>,

    /// Diagnostic log level (RUST_LOG takes precedence)
    #[clap(long, default_value = "warn")]
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(&self.base_url)
    }

    pub fn validate(&self) -> Result<(), ViewerError> {
        if self.poll_interval_ms == 0 {
            return Err(ViewerError::Config("poll_interval_ms must be positive".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ViewerError::Config("request_timeout_secs must be positive".into()));
        }
        if reqwest::Url::parse(&self.base_url).is_err() {
            return Err(ViewerError::Config(format!("invalid base_url: {}", self.base_url)));
        }
        Ok(())
    }
}

/// Backend routes under the configured base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: String,
}

impl Endpoints {
    pub fn new(base_url: &str) -> Self {
        Self {
            base: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn logs(&self) -> String {
        format!("{}/logs", self.base)
    }

    pub fn stream(&self) -> String {
        format!("{}/logs/stream", self.base)
    }

    pub fn test(&self) -> String {
        format!("{}/test", self.base)
    }
}

pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match cli.config {
        Some(ref path) => {
            let config_content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            parse_config(&config_content)?
        }
        None => Config::default(),
    };

    // Apply CLI overrides
    if let Some(ref base_url) = cli.base_url {
        config.base_url = base_url.clone();
    }

    if let Some(poll_interval_ms) = cli.poll_interval_ms {
        config.poll_interval_ms = poll_interval_ms;
    }

    config.validate()?;

    Ok(config)
}

fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).context("Failed to parse config file")
}
