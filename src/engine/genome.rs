//! Genome storage and retrieval behind a trait.
//!
//! Storage is an external collaborator; the service only needs
//! `load(id) -> genome | NotFound`. Inline genome payloads bypass the
//! store entirely.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

/// Genomes are opaque to this service.
pub type Genome = serde_json::Value;

#[derive(Debug, Error)]
pub enum GenomeStoreError {
    #[error("genome {0} not found")]
    NotFound(String),

    #[error("invalid genome id: {0}")]
    InvalidId(String),

    #[error("genome {0} is malformed: {1}")]
    Malformed(String, String),

    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// External genome lookup interface.
#[async_trait]
pub trait GenomeStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Genome, GenomeStoreError>;
}

/// In-memory store, used by the default binary and in tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Genome>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: impl Into<String>, genome: Genome) {
        self.entries.write().insert(id.into(), genome);
    }
}

#[async_trait]
impl GenomeStore for MemoryStore {
    async fn load(&self, id: &str) -> Result<Genome, GenomeStoreError> {
        self.entries
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| GenomeStoreError::NotFound(id.to_string()))
    }
}

/// Directory-backed store: one `<id>.json` file per genome.
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn validate_id(id: &str) -> Result<(), GenomeStoreError> {
        let ok = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !id.contains("..");
        if ok {
            Ok(())
        } else {
            Err(GenomeStoreError::InvalidId(id.to_string()))
        }
    }
}

#[async_trait]
impl GenomeStore for DirStore {
    async fn load(&self, id: &str) -> Result<Genome, GenomeStoreError> {
        Self::validate_id(id)?;
        let path = self.root.join(format!("{id}.json"));
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GenomeStoreError::NotFound(id.to_string()));
            }
            Err(e) => return Err(GenomeStoreError::Io(e)),
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| GenomeStoreError::Malformed(id.to_string(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.insert("g1", serde_json::json!({"nodes": []}));
        let genome = store.load("g1").await.unwrap();
        assert_eq!(genome["nodes"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn memory_store_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.load("absent").await.unwrap_err();
        assert!(matches!(err, GenomeStoreError::NotFound(id) if id == "absent"));
    }

    #[tokio::test]
    async fn dir_store_loads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc.json"), br#"{"kind":"test"}"#).unwrap();
        let store = DirStore::new(dir.path());
        let genome = store.load("abc").await.unwrap();
        assert_eq!(genome["kind"], "test");
    }

    #[tokio::test]
    async fn dir_store_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::new(dir.path());
        let err = store.load("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, GenomeStoreError::InvalidId(_)));
    }

    #[tokio::test]
    async fn dir_store_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::new(dir.path());
        let err = store.load("nope").await.unwrap_err();
        assert!(matches!(err, GenomeStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn dir_store_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), b"{not json").unwrap();
        let store = DirStore::new(dir.path());
        let err = store.load("bad").await.unwrap_err();
        assert!(matches!(err, GenomeStoreError::Malformed(..)));
    }
}
