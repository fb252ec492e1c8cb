//! Asset uploads to object storage.
//!
//! Image and video inputs are uploaded ahead of submission and referenced by
//! public URL in the generation payload, since the provider fetches inputs
//! itself and never sees raw bytes.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::instrument;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::errors::{Error, Result};
use crate::types::AccountId;

#[async_trait]
pub trait Uploader: Send + Sync {
    /// Store the bytes and return a publicly fetchable URL.
    async fn upload(&self, account_id: AccountId, filename: &str, content_type: Option<&str>, bytes: Bytes)
    -> Result<String>;
}

pub struct S3Uploader {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base_url: String,
}

impl S3Uploader {
    pub async fn new(config: &UploadConfig) -> Self {
        let mut loader = aws_config::from_env();
        if let Some(region) = &config.region {
            loader = loader.region(aws_sdk_s3::config::Region::new(region.clone()));
        }
        let aws_config = loader.load().await;

        Self {
            client: aws_sdk_s3::Client::new(&aws_config),
            bucket: config.bucket.clone(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Uploader for S3Uploader {
    #[instrument(skip(self, bytes), fields(account_id = %account_id, filename, size = bytes.len()))]
    async fn upload(
        &self,
        account_id: AccountId,
        filename: &str,
        content_type: Option<&str>,
        bytes: Bytes,
    ) -> Result<String> {
        // Random prefix so repeated filenames never collide or overwrite.
        let key = format!("{}/{}-{}", account_id, Uuid::new_v4(), filename);

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes));
        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        request.send().await.map_err(|e| Error::UploadFailed {
            message: e.to_string(),
        })?;

        Ok(format!("{}/{}", self.public_base_url, key))
    }
}
