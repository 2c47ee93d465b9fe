// ai
//! 🪣📡 S3ObjectStore — the real bucket. The one with the invoice.
//!
//! COLD OPEN — EXT. AWS CONSOLE — 3:47 AM
//!
//! Somewhere in us-east-1, a multipart upload was opened six weeks ago and never
//! completed. It has been quietly billing someone ever since. This module exists so
//! that never happens on our watch: the uploader opens sessions through here, and the
//! uploader always closes them, one way or the other.
//!
//! 🧠 Knowledge graph:
//! - Credentials: default AWS chain (env vars → ~/.aws/config → IAM role → hope)
//! - `region`, `endpoint_url`, `force_path_style`: optional overrides (MinIO, LocalStack, tests)
//! - Transport retries are the SDK's business. This layer does not retry.
//! - `download_to`: `GetObject` → `ByteStream::into_async_read()` → tokio file

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart};
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{self, AsyncWriteExt};
use tracing::trace;

use crate::locations::ObjectLocation;
use crate::stores::{CompletedPart, ObjectStore};

/// 🔧 Configuration for the S3 store. Everything optional — the AWS default chain fills in the rest.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct S3StoreConfig {
    /// 🌎 Region override. None = whatever the environment says.
    #[serde(default)]
    pub region: Option<String>,
    /// 🔌 Custom endpoint (MinIO, LocalStack). None = real S3.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// 🛣️ `http://host/bucket/key` instead of `http://bucket.host/key`
    #[serde(default)]
    pub force_path_style: bool,
}

/// 🪣 Object store backed by the AWS SDK.
pub struct S3ObjectStore {
    client: Client,
}

// 🐛 Debug impl excludes the client — it's large and mostly credentials-adjacent.
impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore").finish_non_exhaustive()
    }
}

impl S3ObjectStore {
    /// 🚀 Build an S3 client from the environment plus whatever overrides the config carries.
    pub async fn new(config: S3StoreConfig) -> Self {
        let mut the_loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            the_loader = the_loader.region(Region::new(region.clone()));
        }
        let the_shared_config = the_loader.load().await;

        let mut the_builder = aws_sdk_s3::config::Builder::from(&the_shared_config)
            .force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint_url {
            the_builder = the_builder.endpoint_url(endpoint);
        }
        Self::from_client(Client::from_conf(the_builder.build()))
    }

    /// 🔌 Wrap an already-configured client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn create_multipart_session(&self, location: &ObjectLocation) -> Result<String> {
        let the_response = self
            .client
            .create_multipart_upload()
            .bucket(&location.container)
            .key(&location.key)
            .send()
            .await
            .with_context(|| {
                format!(
                    "💀 CreateMultipartUpload failed for {location}. The bucket ghosted us. \
                     Check: bucket name, region, credentials, and s3:PutObject permission."
                )
            })?;
        let the_upload_id = the_response
            .upload_id()
            .context("💀 CreateMultipartUpload succeeded but returned no UploadId. Bold.")?;
        Ok(the_upload_id.to_string())
    }

    async fn upload_part(
        &self,
        location: &ObjectLocation,
        session_id: &str,
        part_number: i32,
        bytes: Vec<u8>,
    ) -> Result<String> {
        trace!(
            "🪣 shipping part {} ({} bytes) to {}",
            part_number,
            bytes.len(),
            location
        );
        let the_response = self
            .client
            .upload_part()
            .bucket(&location.container)
            .key(&location.key)
            .upload_id(session_id)
            .part_number(part_number)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .with_context(|| format!("💀 UploadPart {part_number} failed for {location}"))?;
        let the_tag = the_response
            .e_tag()
            .with_context(|| format!("💀 UploadPart {part_number} came back without an ETag"))?;
        Ok(the_tag.to_string())
    }

    async fn complete_multipart_session(
        &self,
        location: &ObjectLocation,
        session_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let the_parts: Vec<S3CompletedPart> = parts
            .iter()
            .map(|part| {
                S3CompletedPart::builder()
                    .part_number(part.part_number)
                    .e_tag(&part.tag)
                    .build()
            })
            .collect();
        self.client
            .complete_multipart_upload()
            .bucket(&location.container)
            .key(&location.key)
            .upload_id(session_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(the_parts))
                    .build(),
            )
            .send()
            .await
            .with_context(|| {
                format!(
                    "💀 CompleteMultipartUpload failed for {location} ({} parts)",
                    parts.len()
                )
            })?;
        Ok(())
    }

    async fn abort_multipart_session(
        &self,
        location: &ObjectLocation,
        session_id: &str,
    ) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&location.container)
            .key(&location.key)
            .upload_id(session_id)
            .send()
            .await
            .with_context(|| format!("💀 AbortMultipartUpload failed for {location}"))?;
        Ok(())
    }

    async fn put_object(&self, location: &ObjectLocation, bytes: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&location.container)
            .key(&location.key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .with_context(|| format!("💀 PutObject failed for {location}"))?;
        Ok(())
    }

    async fn download_to(&self, location: &ObjectLocation, destination: &Path) -> Result<u64> {
        let the_response = self
            .client
            .get_object()
            .bucket(&location.container)
            .key(&location.key)
            .send()
            .await
            .with_context(|| {
                format!(
                    "💀 GetObject failed for {location}. \
                     Check: key path, IAM permissions, bucket policy, KMS key access."
                )
            })?;

        let mut the_reader = the_response.body.into_async_read();
        let mut the_file = File::create(destination)
            .await
            .with_context(|| format!("💀 Could not create '{}'", destination.display()))?;
        let the_size = io::copy(&mut the_reader, &mut the_file)
            .await
            .with_context(|| format!("💀 Download of {location} was interrupted"))?;
        the_file.flush().await?;
        Ok(the_size)
    }
}
