//! The `ObjectStore` trait: one of the two narrow external-collaborator
//! interfaces the core defines rather than implements (spec §6; the
//! other is `docpipe_llm::LlmBackend`). A real deployment backs this
//! with an S3/MinIO client; `LocalFsObjectStore` is a filesystem-backed
//! stand-in used by the CLI smoke-test path and by tests, the same role
//! `docpipe_ocr::local::NullEngine` plays for the OCR backend trait.

use async_trait::async_trait;
use docpipe_utils::{DocpipeError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ObjectStat {
    pub size: u64,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
    async fn get_to_file(&self, key: &str, path: &Path) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn stat(&self, key: &str) -> Result<ObjectStat>;
    /// A presigned GET URL valid for `ttl` (spec §4.6 uses a 1-hour TTL
    /// for the webhook template's `file_url` placeholder).
    async fn presigned_get_url(&self, key: &str, ttl: Duration) -> Result<String>;
}

/// Filesystem-backed object store rooted at `base_dir`, keyed by the
/// same `YYYY/MM/DD/{job_id}/{filename}` object key the upload path
/// assigns. `presigned_get_url` returns a `file://` URL with the TTL
/// encoded as a query parameter rather than a real expiring signature —
/// there is no HTTP server behind this store to enforce one.
pub struct LocalFsObjectStore {
    base_dir: PathBuf,
}

impl LocalFsObjectStore {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.base_dir.join(key)
    }
}

#[async_trait]
impl ObjectStore for LocalFsObjectStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(DocpipeError::Io)?;
        }
        tokio::fs::write(&path, bytes).await.map_err(DocpipeError::Io)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        tokio::fs::read(self.resolve(key)).await.map_err(DocpipeError::Io)
    }

    async fn get_to_file(&self, key: &str, path: &Path) -> Result<()> {
        let bytes = self.get(key).await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(DocpipeError::Io)?;
        }
        tokio::fs::write(path, bytes).await.map_err(DocpipeError::Io)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.resolve(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DocpipeError::Io(e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::metadata(self.resolve(key)).await.is_ok())
    }

    async fn stat(&self, key: &str) -> Result<ObjectStat> {
        let meta = tokio::fs::metadata(self.resolve(key)).await.map_err(DocpipeError::Io)?;
        Ok(ObjectStat { size: meta.len(), content_type: None })
    }

    async fn presigned_get_url(&self, key: &str, ttl: Duration) -> Result<String> {
        let path = self.resolve(key);
        Ok(format!("file://{}?ttl={}", path.display(), ttl.as_secs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_bytes_through_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsObjectStore::new(dir.path());
        store.put("2026/01/01/j1/invoice.pdf", b"%PDF-1.4").await.unwrap();
        assert!(store.exists("2026/01/01/j1/invoice.pdf").await.unwrap());
        let bytes = store.get("2026/01/01/j1/invoice.pdf").await.unwrap();
        assert_eq!(bytes, b"%PDF-1.4");
    }

    #[tokio::test]
    async fn missing_key_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsObjectStore::new(dir.path());
        assert!(!store.exists("missing").await.unwrap());
        assert!(store.get("missing").await.is_err());
    }

    #[tokio::test]
    async fn presigned_url_carries_the_requested_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsObjectStore::new(dir.path());
        store.put("k", b"x").await.unwrap();
        let url = store.presigned_get_url("k", Duration::from_secs(3600)).await.unwrap();
        assert!(url.contains("ttl=3600"));
    }
}
