//! Filesystem object storage, laid out as `{root}/{bucket}/{key}`.

use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use crate::error::{Result, StoreError};

/// Resolve `relative` under `base`, rejecting anything that would escape it.
fn ensure_within(base: &Path, relative: &str) -> Result<PathBuf> {
    let mut resolved = base.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::CurDir => {}
            _ => {
                return Err(StoreError::Invalid(format!(
                    "object path '{relative}' escapes its bucket"
                )))
            }
        }
    }
    if resolved == base {
        return Err(StoreError::Invalid("empty object path".to_string()));
    }
    Ok(resolved)
}

fn valid_bucket(bucket: &str) -> bool {
    !bucket.is_empty()
        && bucket
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
    public_base: String,
}

impl ObjectStore {
    /// Directories are created lazily on first upload.
    pub fn new(root: PathBuf) -> Self {
        let public_base = format!("file://{}", root.display());
        Self { root, public_base }
    }

    pub fn with_public_base(mut self, base: impl Into<String>) -> Self {
        self.public_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        if !valid_bucket(bucket) {
            return Err(StoreError::Invalid(format!("bad bucket name '{bucket}'")));
        }
        ensure_within(&self.root.join(bucket), key)
    }

    /// Store `bytes` under `bucket/key` and return the stored path (the key).
    /// Existing objects are never overwritten.
    pub async fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<PutOutcome> {
        let path = self.object_path(bucket, key)?;
        if fs::try_exists(&path).await? {
            debug!(bucket, key, "object already present");
            return Ok(PutOutcome::AlreadyExists);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        info!(bucket, key, size = bytes.len(), "stored object");
        Ok(PutOutcome::Created)
    }

    pub async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove objects; missing keys are ignored. Returns how many were removed.
    pub async fn remove(&self, bucket: &str, keys: &[String]) -> Result<usize> {
        let mut removed = 0;
        for key in keys {
            let path = self.object_path(bucket, key)?;
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!(bucket, removed, "removed objects");
        Ok(removed)
    }

    pub fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{bucket}/{key}", self.public_base)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    AlreadyExists,
}
