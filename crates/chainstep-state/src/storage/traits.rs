//! Storage trait definition.
//!
//! Defines the interface for ledger document storage backends.

use async_trait::async_trait;
use chainstep_types::{Environment, LedgerDocument};

use crate::error::Result;

/// Trait for ledger document storage backends.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load the document for an environment.
    ///
    /// `Ok(None)` means the environment has never been written to.
    async fn load(&self, env: &Environment) -> Result<Option<LedgerDocument>>;

    /// Persist the full document for an environment.
    ///
    /// Keys present in the stored document but absent from `document` are
    /// preserved. Returns the document as written.
    async fn save(&self, env: &Environment, document: &LedgerDocument) -> Result<LedgerDocument>;

    /// Load the document, starting from an empty one on first run.
    async fn load_or_default(&self, env: &Environment) -> Result<LedgerDocument> {
        Ok(self.load(env).await?.unwrap_or_default())
    }
}
