//! 🪣 Stores — where the CSV bytes go to live.
//!
//! 🎬 *[a buffer fills up. five mebibytes. it's time.]*
//! *["Take me to the bucket," it whispers. The store obliges, one numbered part at a time.]*
//!
//! This is the object-store capability the uploader drives: open a multipart session,
//! upload numbered parts, complete or abort, or just put the whole object in one go
//! when it's small. Plus `download_to`, because the workbook has to come from somewhere.
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls (S3, Local, InMemory) → `ObjectStoreBackend` enum
//! - Same shape as the sources: the enum dispatches, callers never care which one it is
//! - Stores are pure I/O. No buffering, no retries. Buffering lives in the uploader.
//! - Ancient proverb: "He who retries inside the store, uploads part 3 twice."

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::app_config::ObjectStoreConfig;
use crate::locations::ObjectLocation;

pub(crate) mod in_mem;
pub(crate) mod local;
pub(crate) mod s3;

pub use in_mem::{FailurePoint, InMemoryObjectStore, StoreCall};
pub use local::{LocalObjectStore, LocalStoreConfig};
pub use s3::{S3ObjectStore, S3StoreConfig};

/// 🏷️ One acknowledged part: its 1-based number and the tag the store handed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub tag: String,
}

/// 🪣 The object-store capability.
///
/// # Contract 📜
/// - Every call is a side effect. Nothing here is idempotent from the caller's side.
/// - Part numbers are 1-based. The store does not check ordering; the uploader does.
/// - `download_to` writes the whole object to `destination` and returns its size in bytes.
#[async_trait]
pub trait ObjectStore: std::fmt::Debug + Send + Sync {
    /// 🚪 Open a multipart session. Returns the session id.
    async fn create_multipart_session(&self, location: &ObjectLocation) -> Result<String>;

    /// 📦 Upload one numbered part. Returns the part tag (ETag on S3).
    async fn upload_part(
        &self,
        location: &ObjectLocation,
        session_id: &str,
        part_number: i32,
        bytes: Vec<u8>,
    ) -> Result<String>;

    /// ✅ Stitch the parts together in the order given.
    async fn complete_multipart_session(
        &self,
        location: &ObjectLocation,
        session_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()>;

    /// 🗑️ Throw the session and every part in it away.
    async fn abort_multipart_session(&self, location: &ObjectLocation, session_id: &str)
    -> Result<()>;

    /// 📬 Write the whole object in one request.
    async fn put_object(&self, location: &ObjectLocation, bytes: Vec<u8>) -> Result<()>;

    /// 📥 Pull an object down to a local file.
    async fn download_to(&self, location: &ObjectLocation, destination: &Path) -> Result<u64>;
}

/// 🎭 The many faces of an object store.
///
/// `S3` for real life, `Local` for running against a directory, `InMemory` for tests.
#[derive(Debug)]
pub enum ObjectStoreBackend {
    S3(S3ObjectStore),
    Local(LocalObjectStore),
    InMemory(InMemoryObjectStore),
}

impl ObjectStoreBackend {
    /// 🏗️ Build the backend the config asks for.
    pub async fn from_config(config: &ObjectStoreConfig) -> Result<Self> {
        match config {
            ObjectStoreConfig::S3(s3_config) => {
                Ok(Self::S3(S3ObjectStore::new(s3_config.clone()).await))
            }
            ObjectStoreConfig::Local(local_config) => {
                Ok(Self::Local(LocalObjectStore::new(local_config.clone())?))
            }
        }
    }
}

#[async_trait]
impl ObjectStore for ObjectStoreBackend {
    async fn create_multipart_session(&self, location: &ObjectLocation) -> Result<String> {
        match self {
            Self::S3(store) => store.create_multipart_session(location).await,
            Self::Local(store) => store.create_multipart_session(location).await,
            Self::InMemory(store) => store.create_multipart_session(location).await,
        }
    }

    async fn upload_part(
        &self,
        location: &ObjectLocation,
        session_id: &str,
        part_number: i32,
        bytes: Vec<u8>,
    ) -> Result<String> {
        match self {
            Self::S3(store) => store.upload_part(location, session_id, part_number, bytes).await,
            Self::Local(store) => {
                store.upload_part(location, session_id, part_number, bytes).await
            }
            Self::InMemory(store) => {
                store.upload_part(location, session_id, part_number, bytes).await
            }
        }
    }

    async fn complete_multipart_session(
        &self,
        location: &ObjectLocation,
        session_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        match self {
            Self::S3(store) => store.complete_multipart_session(location, session_id, parts).await,
            Self::Local(store) => {
                store.complete_multipart_session(location, session_id, parts).await
            }
            Self::InMemory(store) => {
                store.complete_multipart_session(location, session_id, parts).await
            }
        }
    }

    async fn abort_multipart_session(
        &self,
        location: &ObjectLocation,
        session_id: &str,
    ) -> Result<()> {
        match self {
            Self::S3(store) => store.abort_multipart_session(location, session_id).await,
            Self::Local(store) => store.abort_multipart_session(location, session_id).await,
            Self::InMemory(store) => store.abort_multipart_session(location, session_id).await,
        }
    }

    async fn put_object(&self, location: &ObjectLocation, bytes: Vec<u8>) -> Result<()> {
        match self {
            Self::S3(store) => store.put_object(location, bytes).await,
            Self::Local(store) => store.put_object(location, bytes).await,
            Self::InMemory(store) => store.put_object(location, bytes).await,
        }
    }

    async fn download_to(&self, location: &ObjectLocation, destination: &Path) -> Result<u64> {
        match self {
            Self::S3(store) => store.download_to(location, destination).await,
            Self::Local(store) => store.download_to(location, destination).await,
            Self::InMemory(store) => store.download_to(location, destination).await,
        }
    }
}
