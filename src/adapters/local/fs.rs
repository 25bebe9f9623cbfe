use crate::error::BoxError;
use crate::ports::storage::BlobStorePort;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Blob store backed by a local directory. Keys are paths relative to `root`.
#[derive(Clone, Debug)]
pub struct FsAdapter {
    root: PathBuf,
}

impl FsAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, BoxError> {
        let relative = Path::new(key);
        if !key_is_valid(relative) {
            return Err(format!("invalid key {:?}", key).into());
        }
        Ok(self.root.join(relative))
    }
}

fn key_is_valid(path: &Path) -> bool {
    path.components().next().is_some()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

#[async_trait]
impl BlobStorePort for FsAdapter {
    async fn fetch(&self, key: &str, local_path: &Path) -> Result<(), BoxError> {
        let source = self.resolve(key)?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&source, local_path).await?;
        Ok(())
    }

    async fn put(&self, local_path: &Path, key: &str, content_type: &str) -> Result<(), BoxError> {
        let destination = self.resolve(key)?;
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local_path, &destination).await?;
        debug!(key, content_type, "stored file");
        Ok(())
    }
}
