use crate::error::BoxError;
use async_trait::async_trait;
use std::path::Path;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStorePort: Send + Sync {
    /// Download the object stored under `key` to `local_path`
    async fn fetch(&self, key: &str, local_path: &Path) -> Result<(), BoxError>;

    /// Upload a local file to the output area under `key`
    async fn put(&self, local_path: &Path, key: &str, content_type: &str) -> Result<(), BoxError>;
}
