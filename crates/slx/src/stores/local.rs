//! 📂 LocalObjectStore — a bucket, but it's a directory, and it doesn't bill you.
//!
//! `s3://container/some/key.csv` lands at `root_dir/container/some/key.csv`.
//! Multipart sessions are staged under `root_dir/.multipart/<session>/` as numbered part
//! files, concatenated in part order on completion, and the staging directory is removed
//! on completion or abort. Same contract as S3, minus the network and the invoice. 🦆

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    fs::{self, File},
    io::{self, AsyncWriteExt},
};
use tracing::trace;

use crate::locations::ObjectLocation;
use crate::stores::{CompletedPart, ObjectStore};

const STAGING_DIR_NAME: &str = ".multipart";

// -- 📂 LocalStoreConfig — lives here, next to the store that reads it. One backend, one config, one file.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LocalStoreConfig {
    pub root_dir: PathBuf,
}

/// 📂 Object store rooted at a local directory.
#[derive(Debug)]
pub struct LocalObjectStore {
    config: LocalStoreConfig,
    next_session: AtomicU64,
}

impl LocalObjectStore {
    /// 🚀 Point at a root directory. It doesn't have to exist yet; writes create what they need.
    pub fn new(config: LocalStoreConfig) -> Result<Self> {
        if config.root_dir.as_os_str().is_empty() {
            bail!("💀 Local object store needs a root_dir. An empty path is not a place.");
        }
        Ok(Self {
            config,
            next_session: AtomicU64::new(0),
        })
    }

    /// 🗺️ Where an object lives on disk. Keys may not climb out of the root.
    fn object_path(&self, location: &ObjectLocation) -> Result<PathBuf> {
        let the_relative = Path::new(&location.container).join(&location.key);
        let escapes_the_root = the_relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes_the_root || location.key.is_empty() {
            bail!("💀 Location {location} does not map to a file under the local store root");
        }
        Ok(self.config.root_dir.join(the_relative))
    }

    fn staging_dir(&self, session_id: &str) -> PathBuf {
        self.config.root_dir.join(STAGING_DIR_NAME).join(session_id)
    }

    fn part_path(&self, session_id: &str, part_number: i32) -> PathBuf {
        self.staging_dir(session_id)
            .join(format!("{part_number:05}.part"))
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("💀 Could not create directory '{}'", parent.display()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn create_multipart_session(&self, location: &ObjectLocation) -> Result<String> {
        // -- 🔍 fail now on a bad key, not at completion time
        self.object_path(location)?;
        let the_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let the_session_id = format!(
            "{}-{}-{}",
            std::process::id(),
            the_nanos,
            self.next_session.fetch_add(1, Ordering::Relaxed)
        );
        let the_staging = self.staging_dir(&the_session_id);
        fs::create_dir_all(&the_staging).await.with_context(|| {
            format!(
                "💀 Could not create the staging directory '{}'",
                the_staging.display()
            )
        })?;
        Ok(the_session_id)
    }

    async fn upload_part(
        &self,
        _location: &ObjectLocation,
        session_id: &str,
        part_number: i32,
        bytes: Vec<u8>,
    ) -> Result<String> {
        if !fs::try_exists(self.staging_dir(session_id)).await.unwrap_or(false) {
            bail!("💀 No open multipart session '{session_id}' in the local store");
        }
        let the_part_path = self.part_path(session_id, part_number);
        trace!(
            "📬 part {} ({} bytes) walked into the local store",
            part_number,
            bytes.len()
        );
        fs::write(&the_part_path, &bytes).await.with_context(|| {
            format!("💀 Could not write part file '{}'", the_part_path.display())
        })?;
        Ok(format!("\"{part_number}-{}\"", bytes.len()))
    }

    async fn complete_multipart_session(
        &self,
        location: &ObjectLocation,
        session_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let the_target = self.object_path(location)?;
        Self::ensure_parent(&the_target).await?;
        let the_file = File::create(&the_target)
            .await
            .with_context(|| format!("💀 Could not create '{}'", the_target.display()))?;
        // -- 📦 BufWriter: because one syscall per part chunk is a war crime
        let mut the_writer = io::BufWriter::new(the_file);
        for part in parts {
            let the_part_path = self.part_path(session_id, part.part_number);
            let mut the_part_file = File::open(&the_part_path).await.with_context(|| {
                format!(
                    "💀 Part {} of session '{session_id}' is missing at '{}'",
                    part.part_number,
                    the_part_path.display()
                )
            })?;
            io::copy(&mut the_part_file, &mut the_writer).await?;
        }
        the_writer
            .flush()
            .await
            .with_context(|| format!("💀 Error flushing '{}'", the_target.display()))?;
        fs::remove_dir_all(self.staging_dir(session_id))
            .await
            .with_context(|| format!("💀 Could not clean up staging for session '{session_id}'"))?;
        Ok(())
    }

    async fn abort_multipart_session(
        &self,
        _location: &ObjectLocation,
        session_id: &str,
    ) -> Result<()> {
        fs::remove_dir_all(self.staging_dir(session_id))
            .await
            .with_context(|| format!("💀 Could not abort session '{session_id}' in the local store"))
    }

    async fn put_object(&self, location: &ObjectLocation, bytes: Vec<u8>) -> Result<()> {
        let the_target = self.object_path(location)?;
        Self::ensure_parent(&the_target).await?;
        fs::write(&the_target, &bytes)
            .await
            .with_context(|| format!("💀 Could not write '{}'", the_target.display()))
    }

    async fn download_to(&self, location: &ObjectLocation, destination: &Path) -> Result<u64> {
        let the_source = self.object_path(location)?;
        fs::copy(&the_source, destination).await.with_context(|| {
            format!(
                "💀 Could not copy '{}' to '{}'",
                the_source.display(),
                destination.display()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> LocalObjectStore {
        LocalObjectStore::new(LocalStoreConfig {
            root_dir: dir.to_path_buf(),
        })
        .expect("💀")
    }

    #[tokio::test]
    async fn the_one_where_parts_become_one_file_and_staging_disappears() {
        let the_dir = tempfile::tempdir().expect("💀");
        let the_store = store_in(the_dir.path());
        let the_location = ObjectLocation::new("bucket", "out/data.csv");

        let the_session = the_store
            .create_multipart_session(&the_location)
            .await
            .expect("💀");
        let mut the_parts = Vec::new();
        for (n, chunk) in [(1, "alpha,"), (2, "beta,"), (3, "gamma")] {
            let the_tag = the_store
                .upload_part(&the_location, &the_session, n, chunk.as_bytes().to_vec())
                .await
                .expect("💀");
            the_parts.push(CompletedPart {
                part_number: n,
                tag: the_tag,
            });
        }
        the_store
            .complete_multipart_session(&the_location, &the_session, &the_parts)
            .await
            .expect("💀");

        let the_written =
            std::fs::read_to_string(the_dir.path().join("bucket/out/data.csv")).expect("💀");
        assert_eq!(the_written, "alpha,beta,gamma");
        assert!(!the_store.staging_dir(&the_session).exists());
    }

    #[tokio::test]
    async fn the_one_where_abort_leaves_no_trace() {
        let the_dir = tempfile::tempdir().expect("💀");
        let the_store = store_in(the_dir.path());
        let the_location = ObjectLocation::new("bucket", "never.csv");

        let the_session = the_store
            .create_multipart_session(&the_location)
            .await
            .expect("💀");
        the_store
            .upload_part(&the_location, &the_session, 1, b"doomed".to_vec())
            .await
            .expect("💀");
        the_store
            .abort_multipart_session(&the_location, &the_session)
            .await
            .expect("💀");

        assert!(!the_store.staging_dir(&the_session).exists());
        assert!(!the_dir.path().join("bucket/never.csv").exists());
        // -- 🚫 the session is gone, so more parts bounce
        assert!(
            the_store
                .upload_part(&the_location, &the_session, 2, b"late".to_vec())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn the_one_where_put_and_download_are_mirror_images() {
        let the_dir = tempfile::tempdir().expect("💀");
        let the_store = store_in(the_dir.path());
        let the_location = ObjectLocation::new("bucket", "nested/deeper/file.bin");

        the_store
            .put_object(&the_location, vec![0, 1, 2, 3])
            .await
            .expect("💀");
        let the_copy = the_dir.path().join("copy.bin");
        let the_size = the_store
            .download_to(&the_location, &the_copy)
            .await
            .expect("💀");

        assert_eq!(the_size, 4);
        assert_eq!(std::fs::read(the_copy).expect("💀"), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn the_one_where_keys_cannot_climb_out_of_the_root() {
        let the_dir = tempfile::tempdir().expect("💀");
        let the_store = store_in(the_dir.path());
        let the_sneaky = ObjectLocation::new("bucket", "../../etc/passwd");
        assert!(the_store.put_object(&the_sneaky, vec![1]).await.is_err());
        assert!(the_store.create_multipart_session(&the_sneaky).await.is_err());
    }
}
