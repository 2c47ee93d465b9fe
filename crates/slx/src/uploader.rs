// ai
//! 📤 Uploader — the part-upload state machine.
//!
//! 🎬 COLD OPEN — INT. WRITE BUFFER — CONTINUOUS
//!
//! Bytes pile up. At five mebibytes they leave as a numbered part and the buffer
//! starts over. When the source runs dry, one of two endings plays:
//!   - parts went out → the leftover becomes the last part, the session is completed
//!   - nothing went out → the session (opened eagerly, never used) is aborted and the
//!     whole thing goes up in a single put, because S3 rejects a lone undersized part
//!
//! And if anything breaks along the way, `fail()` aborts the session exactly once.
//! Sessions are never left open. That's the whole job. 🦆
//!
//! ```text
//!   Idle ──open_session──▶ SessionOpen ──finish (parts > 0)──▶ Completed
//!     │                        │   └──finish (parts = 0)──▶ DirectWrite ──put──▶ Completed
//!     └──fail──▶ (never created)└──fail──▶ Aborted
//! ```
//!
//! 🧠 Knowledge graph:
//! - The write buffer and the part list belong to one coordinator, one conversion. Nobody else touches them.
//! - Part numbers are 1-based, strictly increasing, no gaps.
//! - Only the last part may be smaller than the threshold.
//! - No retries here. The store's transport retries, or it doesn't.

use std::mem;

use anyhow::{Result, bail};
use tracing::{info, trace, warn};

use crate::errors::SessionDisposition;
use crate::locations::ObjectLocation;
use crate::stores::{CompletedPart, ObjectStore};

#[derive(Debug, Clone, PartialEq, Eq)]
enum UploadState {
    Idle,
    SessionOpen { session_id: String },
    /// 📬 The session is gone (aborted, or the abort was refused) and a single put is in flight.
    DirectWrite { abort_failed: bool },
    Completed,
    Aborted { abort_failed: bool },
}

/// 🏁 How the object ended up in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOutcome {
    pub disposition: SessionDisposition,
    pub parts: usize,
    pub bytes: u64,
}

/// 📤 Buffers encoded bytes and ships them as multipart parts.
#[derive(Debug)]
pub struct UploadCoordinator<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    location: ObjectLocation,
    part_threshold_bytes: usize,
    buffer: Vec<u8>,
    parts: Vec<CompletedPart>,
    bytes_uploaded: u64,
    state: UploadState,
}

impl<'a, S: ObjectStore + ?Sized> UploadCoordinator<'a, S> {
    pub fn new(store: &'a S, location: ObjectLocation, part_threshold_bytes: usize) -> Self {
        Self {
            store,
            location,
            part_threshold_bytes,
            buffer: Vec::with_capacity(part_threshold_bytes),
            parts: Vec::new(),
            bytes_uploaded: 0,
            state: UploadState::Idle,
        }
    }

    pub fn parts_uploaded(&self) -> usize {
        self.parts.len()
    }

    /// 📏 Everything handed to `append` so far, shipped or still buffered.
    pub fn bytes_accepted(&self) -> u64 {
        self.bytes_uploaded + self.buffer.len() as u64
    }

    /// 🚪 Idle → SessionOpen. Eager: the total size isn't known yet, so we can't know we won't need it.
    pub async fn open_session(&mut self) -> Result<()> {
        if self.state != UploadState::Idle {
            bail!("💀 open_session called twice. One conversion, one session.");
        }
        let the_session_id = self.store.create_multipart_session(&self.location).await?;
        info!("🚪 opened multipart session for {}", self.location);
        self.state = UploadState::SessionOpen {
            session_id: the_session_id,
        };
        Ok(())
    }

    /// 📥 Buffer some bytes. Crossing the threshold ships the whole buffer as the next part.
    pub async fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let the_session_id = self.open_session_id()?.to_string();
        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() >= self.part_threshold_bytes {
            self.ship_buffer(&the_session_id).await?;
        }
        Ok(())
    }

    /// 🏁 Called once, after the source is exhausted. Never after `fail()`.
    pub async fn finish(&mut self) -> Result<UploadOutcome> {
        let the_session_id = self.open_session_id()?.to_string();

        if self.parts.is_empty() {
            // 📬 small-file path: the session was never used, so it goes, and the bytes go up in one put
            info!(
                "📬 {} bytes is under the {} byte part threshold, writing {} directly",
                self.buffer.len(),
                self.part_threshold_bytes,
                self.location
            );
            let abort_failed = match self
                .store
                .abort_multipart_session(&self.location, &the_session_id)
                .await
            {
                Ok(()) => false,
                Err(err) => {
                    warn!("⚠️ could not abort the unused session, writing anyway: {:#}", err);
                    true
                }
            };
            self.state = UploadState::DirectWrite { abort_failed };

            let the_bytes = mem::take(&mut self.buffer);
            let the_size = the_bytes.len() as u64;
            self.store.put_object(&self.location, the_bytes).await?;
            self.bytes_uploaded += the_size;
            self.state = UploadState::Completed;
            return Ok(UploadOutcome {
                disposition: SessionDisposition::DirectWrite,
                parts: 0,
                bytes: self.bytes_uploaded,
            });
        }

        if !self.buffer.is_empty() {
            // -- the last part is the only one allowed to be small
            self.ship_buffer(&the_session_id).await?;
        }
        self.store
            .complete_multipart_session(&self.location, &the_session_id, &self.parts)
            .await?;
        info!(
            "✅ completed {} with {} parts ({} bytes)",
            self.location,
            self.parts.len(),
            self.bytes_uploaded
        );
        self.state = UploadState::Completed;
        Ok(UploadOutcome {
            disposition: SessionDisposition::Completed,
            parts: self.parts.len(),
            bytes: self.bytes_uploaded,
        })
    }

    /// 🗑️ Best-effort cleanup after any failure. Aborts an open session at most once.
    ///
    /// An abort failure is logged and reported through the disposition, never raised.
    pub async fn fail(mut self) -> SessionDisposition {
        let the_state = mem::replace(&mut self.state, UploadState::Aborted { abort_failed: false });
        let the_disposition = match the_state {
            UploadState::Idle => SessionDisposition::NeverCreated,
            UploadState::SessionOpen { session_id } => {
                match self
                    .store
                    .abort_multipart_session(&self.location, &session_id)
                    .await
                {
                    Ok(()) => {
                        warn!(
                            "🗑️ aborted the multipart session for {} after {} parts",
                            self.location,
                            self.parts.len()
                        );
                        SessionDisposition::Aborted
                    }
                    Err(err) => {
                        warn!(
                            "⚠️ could not abort the multipart session for {}: {:#}",
                            self.location, err
                        );
                        SessionDisposition::AbortFailed
                    }
                }
            }
            UploadState::DirectWrite { abort_failed } | UploadState::Aborted { abort_failed } => {
                if abort_failed {
                    SessionDisposition::AbortFailed
                } else {
                    SessionDisposition::Aborted
                }
            }
            UploadState::Completed => SessionDisposition::Completed,
        };
        self.state = UploadState::Aborted {
            abort_failed: the_disposition == SessionDisposition::AbortFailed,
        };
        the_disposition
    }

    fn open_session_id(&self) -> Result<&str> {
        match &self.state {
            UploadState::SessionOpen { session_id } => Ok(session_id),
            other => bail!("💀 no open upload session (state: {other:?})"),
        }
    }

    async fn ship_buffer(&mut self, session_id: &str) -> Result<()> {
        let the_part_number = i32::try_from(self.parts.len() + 1)?;
        let the_bytes = mem::take(&mut self.buffer);
        let the_size = the_bytes.len();
        let the_tag = self
            .store
            .upload_part(&self.location, session_id, the_part_number, the_bytes)
            .await?;
        info!("📦 uploaded part {} ({} bytes)", the_part_number, the_size);
        trace!("🏷️ part {} tag {}", the_part_number, the_tag);
        self.parts.push(CompletedPart {
            part_number: the_part_number,
            tag: the_tag,
        });
        self.bytes_uploaded += the_size as u64;
        self.buffer.reserve(self.part_threshold_bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{FailurePoint, InMemoryObjectStore, StoreCall};

    fn location() -> ObjectLocation {
        ObjectLocation::new("bucket", "out/data.csv")
    }

    fn count(calls: &[StoreCall], wanted: fn(&StoreCall) -> bool) -> usize {
        calls.iter().filter(|c| wanted(*c)).count()
    }

    #[tokio::test]
    async fn the_one_where_small_totals_never_touch_upload_part() {
        // -- 🔁 a handful of totals and chunkings, all under the threshold
        for (total, chunk) in [(0usize, 1usize), (1, 1), (99, 7), (99, 99), (50, 3)] {
            let the_store = InMemoryObjectStore::new();
            let mut the_coordinator = UploadCoordinator::new(&the_store, location(), 100);
            the_coordinator.open_session().await.expect("💀");
            let the_payload: Vec<u8> = (0..total).map(|n| (n % 251) as u8).collect();
            for piece in the_payload.chunks(chunk) {
                the_coordinator.append(piece).await.expect("💀");
            }
            let the_outcome = the_coordinator.finish().await.expect("💀");

            assert_eq!(the_outcome.disposition, SessionDisposition::DirectWrite);
            assert_eq!(the_outcome.parts, 0);
            assert_eq!(
                the_store.calls().await,
                vec![StoreCall::CreateSession, StoreCall::Abort, StoreCall::Put { size: total }],
                "total {total} chunk {chunk}"
            );
            assert_eq!(the_store.object(&location()).await, Some(the_payload));
            assert_eq!(the_store.open_sessions().await, 0);
        }
    }

    #[tokio::test]
    async fn the_one_where_parts_are_numbered_one_to_k_and_completed_as_such() {
        let the_store = InMemoryObjectStore::new();
        let mut the_coordinator = UploadCoordinator::new(&the_store, location(), 10);
        the_coordinator.open_session().await.expect("💀");

        let mut the_everything = Vec::new();
        for n in 0..5u8 {
            let the_piece = vec![b'a' + n; 6];
            the_everything.extend_from_slice(&the_piece);
            the_coordinator.append(&the_piece).await.expect("💀");
            // -- shipped parts plus whatever is still waiting in the buffer
            assert_eq!(the_coordinator.bytes_accepted(), 6 * (u64::from(n) + 1));
        }
        let the_outcome = the_coordinator.finish().await.expect("💀");

        // -- 6+6 → part 1, 6+6 → part 2, leftover 6 → part 3 (the small last one)
        assert_eq!(the_outcome.disposition, SessionDisposition::Completed);
        assert_eq!(the_outcome.parts, 3);
        assert_eq!(the_outcome.bytes, 30);
        assert_eq!(
            the_store.calls().await,
            vec![
                StoreCall::CreateSession,
                StoreCall::UploadPart { part_number: 1, size: 12 },
                StoreCall::UploadPart { part_number: 2, size: 12 },
                StoreCall::UploadPart { part_number: 3, size: 6 },
                StoreCall::Complete { part_numbers: vec![1, 2, 3] },
            ]
        );
        assert_eq!(the_store.object(&location()).await, Some(the_everything));
    }

    #[tokio::test]
    async fn the_one_where_an_exact_fit_needs_no_extra_part() {
        let the_store = InMemoryObjectStore::new();
        let mut the_coordinator = UploadCoordinator::new(&the_store, location(), 4);
        the_coordinator.open_session().await.expect("💀");
        the_coordinator.append(b"abcd").await.expect("💀");
        the_coordinator.append(b"efgh").await.expect("💀");
        let the_outcome = the_coordinator.finish().await.expect("💀");

        assert_eq!(the_outcome.parts, 2);
        assert_eq!(
            the_store.calls().await.last(),
            Some(&StoreCall::Complete { part_numbers: vec![1, 2] })
        );
    }

    #[tokio::test]
    async fn the_one_where_part_two_of_three_explodes_and_we_abort_once() {
        let the_store = InMemoryObjectStore::new();
        the_store.fail_on(FailurePoint::UploadPart(2)).await;
        let mut the_coordinator = UploadCoordinator::new(&the_store, location(), 10);
        the_coordinator.open_session().await.expect("💀");

        the_coordinator.append(&[1; 10]).await.expect("💀 part 1 is fine");
        let the_error = the_coordinator
            .append(&[2; 10])
            .await
            .expect_err("💀 part 2 was rigged");
        assert!(the_error.to_string().contains("UploadPart(2)"));
        let the_disposition = the_coordinator.fail().await;

        assert_eq!(the_disposition, SessionDisposition::Aborted);
        let the_calls = the_store.calls().await;
        assert_eq!(count(&the_calls, |c| matches!(c, StoreCall::Abort)), 1);
        assert_eq!(count(&the_calls, |c| matches!(c, StoreCall::Complete { .. })), 0);
        assert_eq!(count(&the_calls, |c| matches!(c, StoreCall::Put { .. })), 0);
        assert_eq!(the_store.open_sessions().await, 0);
    }

    #[tokio::test]
    async fn the_one_where_a_failed_completion_is_followed_by_exactly_one_abort() {
        let the_store = InMemoryObjectStore::new();
        the_store.fail_on(FailurePoint::Complete).await;
        let mut the_coordinator = UploadCoordinator::new(&the_store, location(), 4);
        the_coordinator.open_session().await.expect("💀");
        the_coordinator.append(b"abcdef").await.expect("💀");

        assert!(the_coordinator.finish().await.is_err());
        assert_eq!(the_coordinator.fail().await, SessionDisposition::Aborted);
        let the_calls = the_store.calls().await;
        assert_eq!(count(&the_calls, |c| matches!(c, StoreCall::Abort)), 1);
    }

    #[tokio::test]
    async fn the_one_where_the_unused_session_refuses_to_die_but_the_put_happens_anyway() {
        let the_store = InMemoryObjectStore::new();
        the_store.fail_on(FailurePoint::Abort).await;
        let mut the_coordinator = UploadCoordinator::new(&the_store, location(), 100);
        the_coordinator.open_session().await.expect("💀");
        the_coordinator.append(b"tiny").await.expect("💀");

        let the_outcome = the_coordinator.finish().await.expect("💀 the put should still happen");
        assert_eq!(the_outcome.disposition, SessionDisposition::DirectWrite);
        assert_eq!(the_store.object(&location()).await, Some(b"tiny".to_vec()));
    }

    #[tokio::test]
    async fn the_one_where_the_put_fails_after_the_abort_and_nobody_aborts_twice() {
        let the_store = InMemoryObjectStore::new();
        the_store.fail_on(FailurePoint::Put).await;
        let mut the_coordinator = UploadCoordinator::new(&the_store, location(), 100);
        the_coordinator.open_session().await.expect("💀");
        the_coordinator.append(b"tiny").await.expect("💀");

        assert!(the_coordinator.finish().await.is_err());
        assert_eq!(the_coordinator.fail().await, SessionDisposition::Aborted);
        assert_eq!(
            the_store.calls().await,
            vec![StoreCall::CreateSession, StoreCall::Abort, StoreCall::Put { size: 4 }]
        );
    }

    #[tokio::test]
    async fn the_one_where_failing_before_the_session_touches_nothing() {
        let the_store = InMemoryObjectStore::new();
        let the_coordinator = UploadCoordinator::new(&the_store, location(), 100);
        assert_eq!(the_coordinator.fail().await, SessionDisposition::NeverCreated);
        assert!(the_store.calls().await.is_empty());
    }

    #[tokio::test]
    async fn the_one_where_a_refused_abort_is_reported_not_raised() {
        let the_store = InMemoryObjectStore::new();
        the_store.fail_on(FailurePoint::Abort).await;
        let mut the_coordinator = UploadCoordinator::new(&the_store, location(), 100);
        the_coordinator.open_session().await.expect("💀");
        assert_eq!(the_coordinator.fail().await, SessionDisposition::AbortFailed);
    }

    #[tokio::test]
    async fn the_one_where_appending_without_a_session_is_refused() {
        let the_store = InMemoryObjectStore::new();
        let mut the_coordinator = UploadCoordinator::new(&the_store, location(), 100);
        assert!(the_coordinator.append(b"early").await.is_err());
        assert!(the_store.calls().await.is_empty());
    }
}
