//! Importer configuration.
//!
//! Loaded from an optional YAML file with `${VAR}` and `${VAR:-default}`
//! substitution. The database URL falls back to `DATABASE_URL`, then to the
//! `API_POSTGRES_*` variables.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::ValueEnum;
use ingestion::{CatalogConfig, IngestConfig};
use serde::Deserialize;
use storage::StorageConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
    pub catalog: CatalogConfig,
    pub fetch: FetchSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub max_retries: u32,
    pub initial_retry_delay_secs: u64,
    pub max_retry_delay_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_retry_delay_secs: 2,
            max_retry_delay_secs: 120,
            request_timeout_secs: 600,
        }
    }
}

impl FetchSettings {
    pub fn initial_retry_delay(&self) -> Duration {
        Duration::from_secs(self.initial_retry_delay_secs)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_secs(self.max_retry_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl AppConfig {
    /// Load `path` if given, otherwise start from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config from {:?}", path))?;
                Self::from_yaml(&content)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;
        serde_yaml::from_str(&expanded).context("Failed to parse config YAML")
    }

    fn validate(&self) -> Result<()> {
        self.ingest.validate()?;
        anyhow::ensure!(
            self.database.max_connections > 0,
            "database.max_connections must be greater than 0"
        );
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        anyhow::ensure!(
            valid_levels.contains(&self.logging.level.as_str()),
            "Invalid log level: {}. Must be one of: {:?}",
            self.logging.level,
            valid_levels
        );
        anyhow::ensure!(
            self.fetch.initial_retry_delay_secs <= self.fetch.max_retry_delay_secs,
            "fetch.initial_retry_delay_secs exceeds fetch.max_retry_delay_secs"
        );
        Ok(())
    }

    /// Connection settings, resolving the URL from the environment when the
    /// file has none.
    pub fn storage(&self) -> Result<StorageConfig> {
        let url = match &self.database.url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => database_url_from_env()?,
        };
        Ok(StorageConfig {
            url,
            max_connections: self.database.max_connections,
        })
    }
}

fn database_url_from_env() -> Result<String> {
    if let Ok(url) = env::var("DATABASE_URL") {
        if !url.is_empty() {
            return Ok(url);
        }
    }
    let var = |name: &str| {
        env::var(name).with_context(|| {
            format!("Database not configured: set DATABASE_URL or {name} and the other API_POSTGRES_* variables")
        })
    };
    Ok(format!(
        "postgresql://{}:{}@{}:{}/{}",
        var("API_POSTGRES_USERNAME")?,
        var("API_POSTGRES_PASSWORD")?,
        var("API_POSTGRES_HOST")?,
        env::var("API_POSTGRES_PORT").unwrap_or_else(|_| "5432".to_string()),
        var("API_POSTGRES_DATABASE")?,
    ))
}

/// Expand `${VAR}` and `${VAR:-default}` references.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(c) => var_expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
                }
            }
            result.push_str(&resolve_var_expr(&var_expr)?);
        } else {
            result.push(ch);
        }
    }
    Ok(result)
}

fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr))
    }
}
