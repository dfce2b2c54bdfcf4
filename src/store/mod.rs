// src/store/mod.rs
pub mod mongo;

pub use mongo::MongoStore;

use crate::error::StoreError;

/// A document store that can count documents by address.
///
/// The pipeline awaits one call at a time, so implementations need not be
/// `Send` or reentrant.
#[allow(async_fn_in_trait)]
pub trait CountStore {
    /// Number of documents whose address field equals `address` exactly.
    /// Callers normalize the key before calling.
    async fn count(&self, address: &str) -> Result<u64, StoreError>;
}
