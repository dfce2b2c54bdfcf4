//! Append per-address document counts from MongoDB to the rows of a CSV file.

pub mod config;
pub mod enrich;
pub mod error;
pub mod store;
pub mod table;

pub use config::Config;
pub use enrich::{run, RunSummary};
pub use error::{EnrichError, StoreError};
