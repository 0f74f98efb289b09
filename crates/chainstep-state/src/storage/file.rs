//! File-backed ledger store.
//!
//! One pretty-printed JSON document per environment at
//! `<dir>/<environment>.json`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chainstep_types::{Environment, LedgerDocument};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use super::traits::LedgerStore;
use crate::error::{Result, StateError};
use crate::lease::LedgerLease;

/// Ledger store writing JSON documents into a directory.
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    dir: PathBuf,
}

impl FileLedgerStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the documents.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for an environment.
    pub fn document_path(&self, env: &Environment) -> Result<PathBuf> {
        Ok(self.dir.join(format!("{}.json", file_stem(env)?)))
    }

    /// Take the exclusive run lease for an environment.
    pub fn acquire_lease(&self, env: &Environment) -> Result<LedgerLease> {
        let path = self.dir.join(format!("{}.lock", file_stem(env)?));
        std::fs::create_dir_all(&self.dir).map_err(|e| StateError::io(&self.dir, e))?;
        LedgerLease::acquire(&env.name, path)
    }

    async fn read_document(path: &Path) -> Result<Option<LedgerDocument>> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StateError::io(path, e)),
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StateError::Malformed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }
}

/// Environment names become file stems, so they must not escape the directory.
fn file_stem(env: &Environment) -> Result<&str> {
    let name = env.name.as_str();
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !name.starts_with('.');
    if valid {
        Ok(name)
    } else {
        Err(StateError::InvalidEnvironment(name.to_string()))
    }
}

#[async_trait]
impl LedgerStore for FileLedgerStore {
    #[instrument(skip(self), fields(environment = %env.name))]
    async fn load(&self, env: &Environment) -> Result<Option<LedgerDocument>> {
        let path = self.document_path(env)?;
        let document = Self::read_document(&path).await?;
        debug!(path = %path.display(), found = document.is_some(), "Loaded ledger document");
        Ok(document)
    }

    #[instrument(skip(self, document), fields(environment = %env.name, revision = document.revision()))]
    async fn save(&self, env: &Environment, document: &LedgerDocument) -> Result<LedgerDocument> {
        let path = self.document_path(env)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StateError::io(&self.dir, e))?;

        let mut merged = document.clone();
        if let Some(existing) = Self::read_document(&path).await? {
            merged.merge_missing_from(&existing);
        }

        let body = serde_json::to_string_pretty(&merged)
            .map_err(|e| StateError::Serialization(e.to_string()))?;

        let tmp_path = path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| StateError::io(&tmp_path, e))?;
        file.write_all(body.as_bytes())
            .await
            .map_err(|e| StateError::io(&tmp_path, e))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| StateError::io(&tmp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| StateError::io(&tmp_path, e))?;
        drop(file);

        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| StateError::io(&path, e))?;

        debug!(path = %path.display(), "Saved ledger document");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainstep_types::{Address, ArtifactKey, ArtifactRef};

    fn env() -> Environment {
        Environment::new("sepolia", 11155111)
    }

    #[tokio::test]
    async fn test_missing_document_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLedgerStore::new(dir.path());
        assert!(store.load(&env()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLedgerStore::new(dir.path().join("deploys"));

        let mut doc = LedgerDocument::new();
        doc.record(
            ArtifactKey::Master,
            ArtifactRef::Single(Address::from_low_u64(1)),
        )
        .unwrap();
        store.save(&env(), &doc).await.unwrap();

        let loaded = store.load(&env()).await.unwrap().unwrap();
        assert_eq!(loaded, doc);
        assert!(!dir.path().join("deploys/sepolia.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_save_preserves_unrelated_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLedgerStore::new(dir.path());
        std::fs::write(
            dir.path().join("sepolia.json"),
            r#"{ "timestamp": "0x0000000000000000000000000000000000000009" }"#,
        )
        .unwrap();

        let mut doc = LedgerDocument::new();
        doc.record(
            ArtifactKey::Uri,
            ArtifactRef::Single(Address::from_low_u64(2)),
        )
        .unwrap();
        let written = store.save(&env(), &doc).await.unwrap();

        assert!(written.contains(ArtifactKey::Timestamp));
        let loaded = store.load(&env()).await.unwrap().unwrap();
        assert!(loaded.contains(ArtifactKey::Timestamp));
        assert!(loaded.contains(ArtifactKey::Uri));
    }

    #[tokio::test]
    async fn test_malformed_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLedgerStore::new(dir.path());
        std::fs::write(dir.path().join("sepolia.json"), "{ not json").unwrap();

        let err = store.load(&env()).await.unwrap_err();
        assert!(matches!(err, StateError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_repeated_save_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLedgerStore::new(dir.path());

        let mut doc = LedgerDocument::new();
        store.save(&env(), &doc).await.unwrap();
        doc.set_migrated(100);
        store.save(&env(), &doc).await.unwrap();
        doc.set_migrated(200);
        store.save(&env(), &doc).await.unwrap();

        let loaded = store.load(&env()).await.unwrap().unwrap();
        assert_eq!(loaded.migrated_count(), 200);
    }

    #[test]
    fn test_environment_names_cannot_escape() {
        let store = FileLedgerStore::new("deploys");
        assert!(store
            .document_path(&Environment::new("../etc", 1))
            .is_err());
        assert!(store.document_path(&Environment::new("", 1)).is_err());
        assert!(store
            .document_path(&Environment::new("polygon-mumbai", 80001))
            .is_ok());
    }
}
