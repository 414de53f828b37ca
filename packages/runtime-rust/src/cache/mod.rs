//! Transaction-scoped context cache.
//!
//! The inbound side of a boundary persists each call's [`CallInformation`]
//! under its transaction id; the outbound side reads it back so a client can
//! resume the original locale, tenant and identities.

pub mod memory;

use async_trait::async_trait;
use opwire_core::{CallInformation, TransactionId};

pub use memory::InMemoryContextCache;

/// Store for call contexts keyed by transaction id.
#[async_trait]
pub trait ContextCache: Send + Sync {
    /// Persists `call`. `Ok(false)` means the store declined the write.
    async fn put(&self, transaction_id: TransactionId, call: &CallInformation) -> anyhow::Result<bool>;

    /// Returns the stored context, or `None` when absent or expired.
    async fn get(&self, transaction_id: TransactionId) -> anyhow::Result<Option<CallInformation>>;
}
