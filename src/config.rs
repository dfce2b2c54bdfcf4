//! Run configuration.
//!
//! Values come from three layers: an optional YAML file, then CLI flags /
//! `ADDRCOUNT_*` environment variables, which override the file. Anything
//! still unset falls back to the defaults below; the store coordinates have
//! no default and must be supplied.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::error::{EnrichError, Result};

pub const DEFAULT_INPUT_PATH: &str = "input.csv";
pub const DEFAULT_OUTPUT_PATH: &str = "output.csv";
pub const DEFAULT_TYPE_FILTER: &str = "NFT_COLLECTION";

/// One partially-filled configuration source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub endpoint: Option<String>,
    pub database: Option<String>,
    pub collection: Option<String>,
    pub input_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub type_filter_value: Option<String>,
    pub query_timeout_secs: Option<u64>,
}

impl ConfigLayer {
    /// Parse a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            EnrichError::config(format!("reading config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
            .map_err(|e| EnrichError::config(format!("{}: {}", path.display(), e)))
    }

    fn from_yaml(text: &str) -> std::result::Result<Self, serde_yaml::Error> {
        // an empty file deserializes to unit, not a mapping
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Fields set in `over` replace the ones in `self`.
    pub fn merge(self, over: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            endpoint: over.endpoint.or(self.endpoint),
            database: over.database.or(self.database),
            collection: over.collection.or(self.collection),
            input_path: over.input_path.or(self.input_path),
            output_path: over.output_path.or(self.output_path),
            type_filter_value: over.type_filter_value.or(self.type_filter_value),
            query_timeout_secs: over.query_timeout_secs.or(self.query_timeout_secs),
        }
    }
}

/// Where and how to count documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// MongoDB connection string.
    pub endpoint: String,
    pub database: String,
    pub collection: String,
    /// `None` waits as long as the driver does.
    pub query_timeout: Option<Duration>,
}

impl StoreConfig {
    /// Connection string with any `user:password@` part masked, for logs and errors.
    pub fn redacted_endpoint(&self) -> String {
        redact_credentials(&self.endpoint)
    }
}

/// Fully resolved configuration handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub store: StoreConfig,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Rows whose type column does not match this (ignoring case) are dropped.
    pub type_filter_value: String,
}

impl Config {
    /// Resolve a merged layer into a validated config.
    pub fn resolve(layer: ConfigLayer) -> Result<Self> {
        let endpoint = required(layer.endpoint, "endpoint")?;
        let database = required(layer.database, "database")?;
        let collection = required(layer.collection, "collection")?;
        let type_filter_value = match layer.type_filter_value {
            Some(v) => non_empty(v, "type_filter_value")?,
            None => DEFAULT_TYPE_FILTER.to_string(),
        };
        let query_timeout = match layer.query_timeout_secs {
            Some(0) => {
                return Err(EnrichError::config(
                    "query_timeout_secs must be greater than zero",
                ))
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        Ok(Config {
            store: StoreConfig {
                endpoint,
                database,
                collection,
                query_timeout,
            },
            input_path: layer
                .input_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT_PATH)),
            output_path: layer
                .output_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH)),
            type_filter_value,
        })
    }
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    match value {
        Some(v) => non_empty(v, name),
        None => Err(EnrichError::config(format!("{} is required", name))),
    }
}

fn non_empty(value: String, name: &str) -> Result<String> {
    if value.trim().is_empty() {
        Err(EnrichError::config(format!("{} must not be empty", name)))
    } else {
        Ok(value)
    }
}

fn redact_credentials(uri: &str) -> String {
    let Some(scheme_end) = uri.find("://") else {
        return uri.to_string();
    };
    let rest = &uri[scheme_end + 3..];
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}://***@{}", &uri[..scheme_end], &rest[at + 1..]),
        None => uri.to_string(),
    }
}
