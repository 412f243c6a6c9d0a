//! Request/response correlation for the stdio channel.
//!
//! Replies from the subprocess may arrive in any order relative to
//! submission, so every outstanding request is keyed by id and matched to
//! the caller that issued it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::framing::{Message, RequestId};
use crate::{Error, Result};

/// Why every pending request is being failed at once.
#[derive(Debug, Clone, Copy)]
pub enum FailureKind {
    ProcessCrashed,
    Shutdown,
}

impl FailureKind {
    fn into_error(self) -> Error {
        match self {
            FailureKind::ProcessCrashed => Error::ProcessCrashed,
            FailureKind::Shutdown => Error::NotRunning,
        }
    }
}

struct Pending {
    tx: oneshot::Sender<Result<Message>>,
    registered_at: Instant,
    /// Distinguishes this registration from a later reuse of the same id.
    serial: u64,
}

/// Maps outstanding request ids to the callers awaiting their replies.
#[derive(Default)]
pub struct Correlator {
    pending: Mutex<HashMap<RequestId, Pending>>,
    serial: AtomicU64,
}

/// Live registration of one pending request.
///
/// Dropping the guard removes its entry, so a caller that goes away
/// without a resolution (timeout, client disconnect, write failure)
/// never leaks its slot, and a late reply for it is dropped like any
/// unknown id.
pub struct PendingGuard {
    correlator: Arc<Correlator>,
    id: RequestId,
    serial: u64,
    rx: Option<oneshot::Receiver<Result<Message>>>,
}

impl PendingGuard {
    /// Wait for the reply, up to `timeout`. On expiry the entry is gone
    /// (guard drop), producing [`Error::Timeout`].
    pub async fn await_resolution(mut self, timeout: Duration) -> Result<Message> {
        let Some(rx) = self.rx.take() else {
            return Err(Error::Other("pending request already awaited".to_string()));
        };
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Other("response channel closed".to_string())),
            Err(_) => Err(Error::Timeout),
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.correlator.release(&self.id, self.serial);
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending request. The id must be unique among requests
    /// currently in flight. The returned guard owns the entry; see
    /// [`PendingGuard`].
    pub fn register(self: &Arc<Self>, id: &RequestId) -> Result<PendingGuard> {
        let (tx, rx) = oneshot::channel();
        let serial = self.serial.fetch_add(1, Ordering::Relaxed);
        let mut pending = self.pending.lock();
        if pending.contains_key(id) {
            return Err(Error::DuplicateId(id.to_string()));
        }
        pending.insert(
            id.clone(),
            Pending {
                tx,
                registered_at: Instant::now(),
                serial,
            },
        );
        debug!(%id, "registered pending request");
        Ok(PendingGuard {
            correlator: Arc::clone(self),
            id: id.clone(),
            serial,
            rx: Some(rx),
        })
    }

    /// Deliver a reply to the caller waiting on `id`.
    ///
    /// A reply for an unknown id (already timed out, or a duplicate line
    /// from the subprocess) is logged and dropped; returns false in that
    /// case. First resolution wins.
    pub fn resolve(&self, id: &RequestId, reply: Message) -> bool {
        let entry = self.pending.lock().remove(id);
        match entry {
            Some(pending) => {
                let waited_ms = pending.registered_at.elapsed().as_millis() as u64;
                if pending.tx.send(Ok(reply)).is_err() {
                    debug!(%id, "pending request receiver dropped");
                    return false;
                }
                debug!(%id, waited_ms, "resolved pending request");
                true
            }
            None => {
                debug!(%id, "dropping reply for unknown or expired id");
                false
            }
        }
    }

    /// Remove the entry a guard was issued for. The entry is left alone
    /// when it has already resolved and the id was re-registered since.
    fn release(&self, id: &RequestId, serial: u64) {
        let mut pending = self.pending.lock();
        if pending.get(id).is_some_and(|entry| entry.serial == serial) {
            pending.remove(id);
            debug!(%id, "released pending request");
        }
    }

    /// Fail every pending request. Used on subprocess crash and shutdown.
    pub fn fail_all(&self, kind: FailureKind) {
        let drained: Vec<(RequestId, Pending)> = self.pending.lock().drain().collect();
        if drained.is_empty() {
            return;
        }
        warn!(count = drained.len(), ?kind, "failing all pending requests");
        for (_, pending) in drained {
            let _ = pending.tx.send(Err(kind.into_error()));
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
