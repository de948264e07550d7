use std::io;
use std::path::PathBuf;

use axum::async_trait;
use gradreg_config::StorageConfig;
use tokio::fs;
use tracing::debug;

use crate::error::AppError;

/// Durable object storage for uploaded portraits.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes (or overwrites) the object and returns its public URL.
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<String, AppError>;
}

/// Deterministic path for a registration photo. The stable name makes a
/// retried upload an idempotent overwrite rather than a new orphan.
#[must_use]
pub fn photo_object_path(event_id: &str, student_id: &str) -> String {
    format!("registrations/{event_id}/{student_id}.jpg")
}

/// Filesystem-backed store, served back out under a public URL prefix.
pub struct FsObjectStore {
    root: PathBuf,
    public_base: String,
}

impl FsObjectStore {
    #[must_use]
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: PathBuf::from(&config.root),
            public_base: config.public_base.trim_end_matches('/').to_owned(),
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<String, AppError> {
        // paths are built from normalized ids, but never trust them as
        // filesystem input
        if path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(AppError::Storage(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing object path {path}"),
            )));
        }
        let target = self.root.join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(AppError::Storage)?;
        }
        fs::write(&target, bytes).await.map_err(AppError::Storage)?;
        debug!(%path, bytes = bytes.len(), "stored object");
        Ok(format!("{}/{path}", self.public_base))
    }
}
