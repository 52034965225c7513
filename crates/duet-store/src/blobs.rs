//! Blob storage for avatars.
//!
//! Only the upload contract matters to the sync engine; [`FsBlobStore`] is a
//! filesystem implementation used by the demo binary and tests.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{Result, StoreError};

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at the slash-separated `path` and return a URL for it.
    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<String>;
}

/// Verify that a resolved path stays within the expected base directory.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf> {
    // Target may not exist yet, so only the base is canonicalized.
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    let mut resolved = canonical_base.clone();
    for component in target
        .strip_prefix(base)
        .unwrap_or(target)
        .components()
    {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::ParentDir => {
                return Err(StoreError::Blob("Path traversal detected".to_string()));
            }
            _ => {}
        }
    }
    if !resolved.starts_with(&canonical_base) {
        return Err(StoreError::Blob("Path traversal detected".to_string()));
    }
    Ok(resolved)
}

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    base_path: PathBuf,
    base_url: String,
    max_size: usize,
}

impl FsBlobStore {
    /// Default upload limit (5 MiB).
    pub const DEFAULT_MAX_SIZE: usize = 5 * 1024 * 1024;

    pub async fn new(base_path: PathBuf, base_url: Option<String>, max_size: usize) -> Result<Self> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            StoreError::Blob(format!(
                "Failed to create blob directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        let base_url = match base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let absolute = base_path.canonicalize().unwrap_or_else(|_| base_path.clone());
                format!("file://{}", absolute.display())
            }
        };

        info!(path = %base_path.display(), url = %base_url, "Blob store initialized");

        Ok(Self {
            base_path,
            base_url,
            max_size,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.safe_path(path)?;
        fs::read(&full)
            .await
            .map_err(|e| StoreError::Blob(format!("Failed to read blob {}: {}", path, e)))
    }

    /// Resolve a slash-separated blob path under the base directory.
    fn safe_path(&self, path: &str) -> Result<PathBuf> {
        let segments: Vec<&str> = path.split('/').collect();
        if segments
            .iter()
            .any(|s| s.is_empty() || *s == "." || *s == ".." || s.contains('\\'))
        {
            return Err(StoreError::Blob(format!("Invalid blob path: {path}")));
        }
        let target = segments
            .iter()
            .fold(self.base_path.clone(), |acc, s| acc.join(s));
        ensure_within(&self.base_path, &target)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<String> {
        if bytes.is_empty() {
            return Err(StoreError::Blob("Empty blob".to_string()));
        }
        if bytes.len() > self.max_size {
            return Err(StoreError::BlobTooLarge {
                size: bytes.len(),
                max: self.max_size,
            });
        }

        let full = self.safe_path(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full, bytes)
            .await
            .map_err(|e| StoreError::Blob(format!("Failed to write blob {}: {}", path, e)))?;

        // Content version so caches pick up a replaced avatar.
        let hash = blake3::hash(bytes).to_hex();
        let url = format!("{}/{}?v={}", self.base_url, path, &hash.as_str()[..16]);

        debug!(path, size = bytes.len(), "Stored blob");
        Ok(url)
    }
}
