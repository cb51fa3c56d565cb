//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Database configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_pool_size: usize,
    pub use_tls: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "postgres".to_string(),
            max_pool_size: 10,
            use_tls: false,
        }
    }
}

/// Where metadata records are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataBackend {
    /// JSON document on disk, next to the baseline snapshot by default
    #[default]
    File,
    /// Process-local; every run starts from nothing
    Memory,
    Postgres,
}

impl FromStr for MetadataBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "json" => Ok(MetadataBackend::File),
            "memory" => Ok(MetadataBackend::Memory),
            "postgres" | "postgresql" => Ok(MetadataBackend::Postgres),
            other => Err(ConfigError::InvalidValue(format!(
                "METADATA_BACKEND must be 'file', 'memory' or 'postgres', got '{}'",
                other
            ))),
        }
    }
}

/// One generated artifact per table: a template and the output path pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    pub template: String,
    /// Relative to the output root; `{table}` and `{schema}` are substituted
    pub path_pattern: String,
}

impl ArtifactSpec {
    pub fn output_path(&self, schema: &str, table: &str) -> PathBuf {
        PathBuf::from(
            self.path_pattern
                .replace("{schema}", schema)
                .replace("{table}", table),
        )
    }
}

impl FromStr for ArtifactSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (template, pattern) = s
            .split_once(':')
            .map(|(t, p)| (t.trim(), p.trim()))
            .filter(|(t, p)| !t.is_empty() && !p.is_empty())
            .ok_or_else(|| {
                ConfigError::InvalidValue(format!(
                    "artifact '{}' must look like template:path-pattern",
                    s
                ))
            })?;
        Ok(Self {
            template: template.to_string(),
            path_pattern: pattern.to_string(),
        })
    }
}

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub database: Option<DatabaseConfig>,
    pub template_root: PathBuf,
    pub output_root: PathBuf,
    pub snapshot_path: PathBuf,
    pub metadata_backend: MetadataBackend,
    /// Used by the file backend
    pub metadata_path: PathBuf,
    pub artifacts: Vec<ArtifactSpec>,
    pub include_unchanged: bool,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let max_pool_size = match lookup("DB_MAX_CONNECTIONS") {
            Some(v) => v.trim().parse().map_err(|_| {
                ConfigError::InvalidValue(format!("DB_MAX_CONNECTIONS must be a number, got '{}'", v))
            })?,
            None => 10,
        };

        let database = lookup("DATABASE_URL")
            .map(|url| Self::parse_database_url(&url, max_pool_size))
            .transpose()?;

        let metadata_backend = lookup("METADATA_BACKEND")
            .map(|v| v.parse::<MetadataBackend>())
            .transpose()?
            .unwrap_or_default();
        if metadata_backend == MetadataBackend::Postgres && database.is_none() {
            return Err(ConfigError::MissingVar("DATABASE_URL".to_string()));
        }

        let artifacts = lookup("ARTIFACTS")
            .unwrap_or_else(|| "entity:{table}.cs".to_string())
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(str::parse::<ArtifactSpec>)
            .collect::<Result<Vec<_>, _>>()?;

        let include_unchanged = match lookup("INCLUDE_UNCHANGED") {
            Some(v) => parse_bool("INCLUDE_UNCHANGED", &v)?,
            None => false,
        };

        let snapshot_path = lookup("SNAPSHOT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".schemaforge/snapshot.json"));
        let metadata_path = lookup("METADATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                snapshot_path
                    .parent()
                    .map(|dir| dir.join("metadata.json"))
                    .unwrap_or_else(|| PathBuf::from("metadata.json"))
            });

        Ok(Self {
            database,
            template_root: lookup("TEMPLATE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("templates")),
            output_root: lookup("OUTPUT_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("generated")),
            snapshot_path,
            metadata_backend,
            metadata_path,
            artifacts,
            include_unchanged,
        })
    }

    /// Parse a DATABASE_URL connection string (postgresql://...)
    fn parse_database_url(url: &str, max_pool_size: usize) -> Result<DatabaseConfig, ConfigError> {
        let parsed = url::Url::parse(url).map_err(|_| {
            ConfigError::InvalidValue(
                "Invalid DATABASE_URL format (expected postgresql://...)".to_string(),
            )
        })?;

        let host = parsed
            .host_str()
            .ok_or_else(|| ConfigError::InvalidValue("Missing host in DATABASE_URL".to_string()))?
            .to_string();

        let database = parsed.path().trim_start_matches('/').to_string();
        if database.is_empty() {
            return Err(ConfigError::InvalidValue(
                "Missing database name in DATABASE_URL".to_string(),
            ));
        }

        // Hosted providers such as Neon refuse plain connections
        let use_tls = host.contains("neon.tech")
            || parsed
                .query_pairs()
                .any(|(k, v)| k == "sslmode" && (v == "require" || v == "verify-full"));

        Ok(DatabaseConfig {
            port: parsed.port().unwrap_or(5432),
            user: parsed.username().to_string(),
            password: parsed.password().map(|p| p.to_string()).unwrap_or_default(),
            host,
            database,
            max_pool_size,
            use_tls,
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue(format!(
            "{} must be true or false, got '{}'",
            key, value
        ))),
    }
}
