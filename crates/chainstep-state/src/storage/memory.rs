//! In-memory ledger store.
//!
//! Useful for testing and dry runs.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chainstep_types::{Environment, LedgerDocument};
use dashmap::DashMap;

use super::traits::LedgerStore;
use crate::error::Result;

/// In-memory ledger store keyed by environment name.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    documents: DashMap<String, LedgerDocument>,
    saves: AtomicUsize,
}

impl InMemoryLedgerStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with a document.
    pub fn with_document(env: &Environment, document: LedgerDocument) -> Self {
        let store = Self::new();
        store.documents.insert(env.name.clone(), document);
        store
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Current stored document, if any.
    pub fn snapshot(&self, env: &Environment) -> Option<LedgerDocument> {
        self.documents.get(&env.name).map(|d| d.clone())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn load(&self, env: &Environment) -> Result<Option<LedgerDocument>> {
        Ok(self.snapshot(env))
    }

    async fn save(&self, env: &Environment, document: &LedgerDocument) -> Result<LedgerDocument> {
        let mut merged = document.clone();
        if let Some(existing) = self.documents.get(&env.name) {
            merged.merge_missing_from(&existing);
        }
        self.documents.insert(env.name.clone(), merged.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(merged)
    }
}
