use crate::error::BoxError;
use crate::ports::storage::BlobStorePort;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::path::Path;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

/// S3Adapter implements BlobStorePort for AWS S3.
///
/// Sources are read from `input_bucket`, renditions are written to `output_bucket`.
#[derive(Clone, Debug)]
pub struct S3Adapter {
    client: Client,
    input_bucket: String,
    output_bucket: String,
}

impl S3Adapter {
    pub fn new(client: Client, input_bucket: String, output_bucket: String) -> Self {
        Self {
            client,
            input_bucket,
            output_bucket,
        }
    }
}

#[async_trait]
impl BlobStorePort for S3Adapter {
    async fn fetch(&self, key: &str, local_path: &Path) -> Result<(), BoxError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.input_bucket)
            .key(key)
            .send()
            .await?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut body = resp.body.into_async_read();
        let mut file = BufWriter::new(tokio::fs::File::create(local_path).await?);
        let bytes = tokio::io::copy(&mut body, &mut file).await?;
        file.flush().await?;

        debug!(bucket = %self.input_bucket, key, bytes, "downloaded object");
        Ok(())
    }

    async fn put(&self, local_path: &Path, key: &str, content_type: &str) -> Result<(), BoxError> {
        let byte_stream = ByteStream::from_path(local_path).await?;

        self.client
            .put_object()
            .bucket(&self.output_bucket)
            .key(key)
            .content_type(content_type)
            .body(byte_stream)
            .send()
            .await?;

        debug!(bucket = %self.output_bucket, key, content_type, "uploaded object");
        Ok(())
    }
}
