//! The `BlobStore` seam: threshold batches, admin boundary GeoJSON, and the
//! population raster all arrive as bytes fetched from object storage, which
//! is out of scope here (spec §6). Two implementations are provided: one
//! backed by the local filesystem for production-shaped wiring, and an
//! in-memory one for the demonstration binary and tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::PipelineError;

pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Vec<u8>, PipelineError>;
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), PipelineError>;
}

/// Treats `key` as a path relative to `root`.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl BlobStore for FsBlobStore {
    fn get(&self, key: &str) -> Result<Vec<u8>, PipelineError> {
        std::fs::read(self.root.join(key)).map_err(|e| PipelineError::RetryableIo(format!("blob get {key}: {e}")))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), PipelineError> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PipelineError::RetryableIo(format!("blob put {key}: {e}")))?;
        }
        std::fs::write(path, bytes).map_err(|e| PipelineError::RetryableIo(format!("blob put {key}: {e}")))
    }
}

/// In-process blob store for tests and the demonstration binary.
#[derive(Default)]
pub struct InMemoryBlobStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.data.lock().unwrap().insert(key.into(), bytes.into());
    }
}

impl BlobStore for InMemoryBlobStore {
    fn get(&self, key: &str) -> Result<Vec<u8>, PipelineError> {
        self.data
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| PipelineError::SourceUnavailable(format!("no blob at key {key}")))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), PipelineError> {
        self.data.lock().unwrap().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_round_trip() {
        let store = InMemoryBlobStore::new();
        store.seed("thresholds/PHL.json", b"[]".to_vec());
        assert_eq!(store.get("thresholds/PHL.json").unwrap(), b"[]");
        assert!(store.get("missing").is_err());
    }

    #[test]
    fn in_memory_put_then_get() {
        let store = InMemoryBlobStore::new();
        store.put("a", b"hello").unwrap();
        assert_eq!(store.get("a").unwrap(), b"hello");
    }
}
