//! Ledger document - the per-environment record of completed work
//!
//! The document is the single source of truth for what has already been
//! done in an environment. A present key is proof of completion: values are
//! only ever written once through [`LedgerDocument::record`], and the only
//! overwrite path is the explicit [`LedgerDocument::replace`].

use crate::address::Address;
use crate::artifact::{ArtifactKey, ArtifactRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ledger document mutation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("artifact {0} is already recorded")]
    AlreadyRecorded(ArtifactKey),

    #[error("artifact {key} expects a {expected} reference")]
    KindMismatch {
        key: ArtifactKey,
        expected: &'static str,
    },
}

/// Typed ledger document for one environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LedgerDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    master: Option<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    uri: Option<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    governor_initializer: Option<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    jurisdictions: Option<Vec<Address>>,

    /// Names of completed call steps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    calls: Vec<String>,

    /// Dataset position below which every record is migrated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    migrated_count: Option<u64>,

    /// Incremented on every recorded change
    #[serde(default)]
    revision: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,

    /// Call markers removed since load; a merge never restores them
    #[serde(skip)]
    unmarked_calls: Vec<String>,
}

// Equality covers the persisted fields only.
impl PartialEq for LedgerDocument {
    fn eq(&self, other: &Self) -> bool {
        let Self {
            master,
            uri,
            governor_initializer,
            timestamp,
            jurisdictions,
            calls,
            migrated_count,
            revision,
            updated_at,
            unmarked_calls: _,
        } = self;
        *master == other.master
            && *uri == other.uri
            && *governor_initializer == other.governor_initializer
            && *timestamp == other.timestamp
            && *jurisdictions == other.jurisdictions
            && *calls == other.calls
            && *migrated_count == other.migrated_count
            && *revision == other.revision
            && *updated_at == other.updated_at
    }
}

impl Eq for LedgerDocument {}

impl LedgerDocument {
    /// Create an empty document for a fresh environment
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Get the reference stored under `key`, if any
    pub fn artifact(&self, key: ArtifactKey) -> Option<ArtifactRef> {
        match key {
            ArtifactKey::Jurisdictions => self.jurisdictions.clone().map(ArtifactRef::List),
            single => self.single(single).cloned().map(ArtifactRef::Single),
        }
    }

    pub fn contains(&self, key: ArtifactKey) -> bool {
        match key {
            ArtifactKey::Jurisdictions => self.jurisdictions.is_some(),
            single => self.single(single).is_some(),
        }
    }

    /// Number of entries held by a list artifact (0 when absent)
    pub fn list_len(&self, key: ArtifactKey) -> usize {
        match key {
            ArtifactKey::Jurisdictions => self.jurisdictions.as_ref().map_or(0, Vec::len),
            _ => 0,
        }
    }

    /// All recorded artifacts, in document order
    pub fn entries(&self) -> Vec<(ArtifactKey, ArtifactRef)> {
        ArtifactKey::ALL
            .iter()
            .filter_map(|key| self.artifact(*key).map(|r| (*key, r)))
            .collect()
    }

    /// Write a reference under a key that has not been recorded yet
    pub fn record(&mut self, key: ArtifactKey, reference: ArtifactRef) -> Result<(), LedgerError> {
        if self.contains(key) {
            return Err(LedgerError::AlreadyRecorded(key));
        }
        self.store(key, reference)?;
        self.touch();
        Ok(())
    }

    /// Explicit update step: overwrite the reference under `key`
    ///
    /// Returns the previous reference.
    pub fn replace(
        &mut self,
        key: ArtifactKey,
        reference: ArtifactRef,
    ) -> Result<Option<ArtifactRef>, LedgerError> {
        let previous = self.artifact(key);
        self.store(key, reference)?;
        self.touch();
        Ok(previous)
    }

    /// Append one confirmed element to a list artifact
    ///
    /// Returns the new length of the list.
    pub fn append(&mut self, key: ArtifactKey, address: Address) -> Result<usize, LedgerError> {
        let list = match key {
            ArtifactKey::Jurisdictions => self.jurisdictions.get_or_insert_with(Vec::new),
            other => {
                return Err(LedgerError::KindMismatch {
                    key: other,
                    expected: "single",
                })
            }
        };
        list.push(address);
        let len = list.len();
        self.touch();
        Ok(len)
    }

    pub fn has_call(&self, name: &str) -> bool {
        self.calls.iter().any(|c| c == name)
    }

    /// Record a completed call step; returns false if it was already recorded
    pub fn mark_call(&mut self, name: &str) -> bool {
        if self.has_call(name) {
            return false;
        }
        self.calls.push(name.to_string());
        self.unmarked_calls.retain(|c| c != name);
        self.touch();
        true
    }

    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    /// Remove a call marker so the call step runs again; returns false if it
    /// was not recorded
    pub fn unmark_call(&mut self, name: &str) -> bool {
        let before = self.calls.len();
        self.calls.retain(|c| c != name);
        if self.calls.len() == before {
            return false;
        }
        self.unmarked_calls.push(name.to_string());
        self.touch();
        true
    }

    /// Dataset position below which every record is migrated
    pub fn migrated_count(&self) -> u64 {
        self.migrated_count.unwrap_or(0)
    }

    /// Record that the dataset is migrated up to `position` (exclusive)
    pub fn set_migrated(&mut self, position: u64) {
        self.migrated_count = Some(position);
        self.touch();
    }

    /// Copy everything present in `other` but absent here
    ///
    /// Used for read-merge-write so that keys written by a different plan are
    /// never dropped when this document is saved.
    pub fn merge_missing_from(&mut self, other: &LedgerDocument) {
        for key in ArtifactKey::ALL {
            if !self.contains(key) {
                if let Some(reference) = other.artifact(key) {
                    // Kinds always match since both come from the same key.
                    let _ = self.store(key, reference);
                }
            }
        }
        for call in &other.calls {
            if !self.has_call(call) && !self.unmarked_calls.contains(call) {
                self.calls.push(call.clone());
            }
        }
        if self.migrated_count.is_none() {
            self.migrated_count = other.migrated_count;
        }
        if self.updated_at.is_none() {
            self.updated_at = other.updated_at;
        }
        self.revision = self.revision.max(other.revision);
    }

    fn single(&self, key: ArtifactKey) -> Option<&Address> {
        match key {
            ArtifactKey::Master => self.master.as_ref(),
            ArtifactKey::Uri => self.uri.as_ref(),
            ArtifactKey::GovernorInitializer => self.governor_initializer.as_ref(),
            ArtifactKey::Timestamp => self.timestamp.as_ref(),
            ArtifactKey::Jurisdictions => None,
        }
    }

    fn store(&mut self, key: ArtifactKey, reference: ArtifactRef) -> Result<(), LedgerError> {
        match (key, reference) {
            (ArtifactKey::Jurisdictions, ArtifactRef::List(list)) => {
                self.jurisdictions = Some(list);
            }
            (ArtifactKey::Jurisdictions, ArtifactRef::Single(_)) => {
                return Err(LedgerError::KindMismatch {
                    key,
                    expected: "list",
                });
            }
            (_, ArtifactRef::List(_)) => {
                return Err(LedgerError::KindMismatch {
                    key,
                    expected: "single",
                });
            }
            (ArtifactKey::Master, ArtifactRef::Single(a)) => self.master = Some(a),
            (ArtifactKey::Uri, ArtifactRef::Single(a)) => self.uri = Some(a),
            (ArtifactKey::GovernorInitializer, ArtifactRef::Single(a)) => {
                self.governor_initializer = Some(a)
            }
            (ArtifactKey::Timestamp, ArtifactRef::Single(a)) => self.timestamp = Some(a),
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = Some(Utc::now());
    }
}
