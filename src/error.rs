//! Error types for addrcount.
//!
//! Every stage returns [`EnrichError`]; nothing below `main` decides how the
//! process exits. The binary wraps this with `anyhow` and maps the kind to an
//! exit status via [`EnrichError::exit_code`].

use std::path::PathBuf;
use std::time::Duration;

/// Failure of a single call against the document store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Driver, transport or server-side failure.
    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),

    /// No reply within the per-query timeout.
    #[error("no reply within {0:?}")]
    Timeout(Duration),
}

/// Top-level error for a run. All variants are fatal.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    /// Missing or invalid configuration.
    #[error("config error: {message}")]
    Config { message: String },

    /// Store unreachable, bad URI or rejected credentials.
    #[error("cannot connect to {endpoint}: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: StoreError,
    },

    /// Input file could not be opened or read.
    #[error("cannot read input {path:?}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed input (bad UTF-8, ragged record, ...).
    #[error("malformed input {path:?}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Input contained no header row.
    #[error("input {path:?} is empty, expected a header row")]
    EmptyInput { path: PathBuf },

    /// A required column is absent from the header.
    #[error("required column {column:?} not found in header")]
    Schema { column: String },

    /// Count query failed for a row.
    #[error("count query for address {address:?} failed: {source}")]
    Query {
        address: String,
        #[source]
        source: StoreError,
    },

    /// Output could not be created, written or flushed.
    #[error("cannot write output {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

pub type Result<T> = std::result::Result<T, EnrichError>;

impl EnrichError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn schema(column: impl Into<String>) -> Self {
        Self::Schema {
            column: column.into(),
        }
    }

    /// Process exit status for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            EnrichError::Config { .. } => 2,
            EnrichError::Connection { .. } => 3,
            EnrichError::Input { .. }
            | EnrichError::Format { .. }
            | EnrichError::EmptyInput { .. } => 4,
            EnrichError::Schema { .. } => 5,
            EnrichError::Query { .. } => 6,
            EnrichError::Write { .. } => 7,
        }
    }
}
