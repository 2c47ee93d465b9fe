//! # Previously, on Sheetlift...
//!
//! 🎬 The uploader needed a bucket. A real one costs money and needs credentials and
//! occasionally returns 503 at 3am. So we built one out of a HashMap and a Mutex.
//! It remembers every call in order, so tests can ask "did you abort exactly once?"
//! and get a straight answer. It can also be told to fail on cue, like a stunt double.
//!
//! ⚠️ This is NOT for production. This is for tests. If you're deploying this
//! to prod, please also deploy a therapist. 🦆

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::locations::ObjectLocation;
use crate::stores::{CompletedPart, ObjectStore};

/// 📼 One recorded call, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    CreateSession,
    UploadPart { part_number: i32, size: usize },
    Complete { part_numbers: Vec<i32> },
    Abort,
    Put { size: usize },
    Download,
}

/// 💣 Where to blow up, when asked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    CreateSession,
    UploadPart(i32),
    Complete,
    Abort,
    Put,
}

#[derive(Debug, Default)]
struct InMemoryState {
    calls: Vec<StoreCall>,
    objects: HashMap<ObjectLocation, Vec<u8>>,
    sessions: HashMap<String, BTreeMap<i32, Vec<u8>>>,
    next_session: u64,
    failures: Vec<FailurePoint>,
}

/// 📦 A bucket that lives in RAM and keeps a diary.
///
/// Clone-able: every clone shares the same state, so a test can keep one handle
/// and give another to the pipeline.
#[derive(Debug, Default, Clone)]
pub struct InMemoryObjectStore {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 💣 Arm a failure. Fires every time the matching call is made.
    pub async fn fail_on(&self, point: FailurePoint) {
        self.state.lock().await.failures.push(point);
    }

    /// 🌱 Seed an object, e.g. the workbook a source will download.
    pub async fn insert_object(&self, location: ObjectLocation, bytes: Vec<u8>) {
        self.state.lock().await.objects.insert(location, bytes);
    }

    pub async fn object(&self, location: &ObjectLocation) -> Option<Vec<u8>> {
        self.state.lock().await.objects.get(location).cloned()
    }

    pub async fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().await.calls.clone()
    }

    /// 🕵️ Sessions that were opened and neither completed nor aborted.
    pub async fn open_sessions(&self) -> usize {
        self.state.lock().await.sessions.len()
    }
}

impl InMemoryState {
    fn check(&self, point: FailurePoint) -> Result<()> {
        if self.failures.contains(&point) {
            bail!("💥 injected failure at {point:?}");
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn create_multipart_session(&self, _location: &ObjectLocation) -> Result<String> {
        let mut the_state = self.state.lock().await;
        the_state.calls.push(StoreCall::CreateSession);
        the_state.check(FailurePoint::CreateSession)?;
        the_state.next_session += 1;
        let the_session_id = format!("mem-session-{}", the_state.next_session);
        the_state.sessions.insert(the_session_id.clone(), BTreeMap::new());
        Ok(the_session_id)
    }

    async fn upload_part(
        &self,
        _location: &ObjectLocation,
        session_id: &str,
        part_number: i32,
        bytes: Vec<u8>,
    ) -> Result<String> {
        let mut the_state = self.state.lock().await;
        the_state.calls.push(StoreCall::UploadPart {
            part_number,
            size: bytes.len(),
        });
        the_state.check(FailurePoint::UploadPart(part_number))?;
        let the_tag = format!("\"etag-{part_number}-{}\"", bytes.len());
        the_state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| anyhow!("💀 no such session '{session_id}'"))?
            .insert(part_number, bytes);
        Ok(the_tag)
    }

    async fn complete_multipart_session(
        &self,
        location: &ObjectLocation,
        session_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let mut the_state = self.state.lock().await;
        the_state.calls.push(StoreCall::Complete {
            part_numbers: parts.iter().map(|p| p.part_number).collect(),
        });
        the_state.check(FailurePoint::Complete)?;
        let mut the_uploaded = the_state
            .sessions
            .remove(session_id)
            .ok_or_else(|| anyhow!("💀 no such session '{session_id}'"))?;
        let mut the_object = Vec::new();
        for part in parts {
            let the_bytes = the_uploaded
                .remove(&part.part_number)
                .with_context(|| format!("💀 part {} was never uploaded", part.part_number))?;
            the_object.extend(the_bytes);
        }
        the_state.objects.insert(location.clone(), the_object);
        Ok(())
    }

    async fn abort_multipart_session(
        &self,
        _location: &ObjectLocation,
        session_id: &str,
    ) -> Result<()> {
        let mut the_state = self.state.lock().await;
        the_state.calls.push(StoreCall::Abort);
        the_state.check(FailurePoint::Abort)?;
        the_state.sessions.remove(session_id);
        Ok(())
    }

    async fn put_object(&self, location: &ObjectLocation, bytes: Vec<u8>) -> Result<()> {
        let mut the_state = self.state.lock().await;
        the_state.calls.push(StoreCall::Put { size: bytes.len() });
        the_state.check(FailurePoint::Put)?;
        the_state.objects.insert(location.clone(), bytes);
        Ok(())
    }

    async fn download_to(&self, location: &ObjectLocation, destination: &Path) -> Result<u64> {
        let the_bytes = {
            let mut the_state = self.state.lock().await;
            the_state.calls.push(StoreCall::Download);
            the_state
                .objects
                .get(location)
                .cloned()
                .with_context(|| format!("💀 no object at {location}"))?
        };
        tokio::fs::write(destination, &the_bytes)
            .await
            .with_context(|| format!("💀 failed to write {}", destination.display()))?;
        Ok(the_bytes.len() as u64)
    }
}
