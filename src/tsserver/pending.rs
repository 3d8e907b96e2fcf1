//! Correlation of tsserver responses with the requests that produced them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::tsserver::error::ClientError;
use crate::tsserver::protocol::Response;

/// What a pending request eventually settles with.
pub type Outcome = Result<Response, ClientError>;

/// Reserved id for the readiness handshake. Real sequence numbers start at 1.
pub const READY_SENTINEL: i64 = -1;

struct PendingRequest {
    command: String,
    reply: oneshot::Sender<Outcome>,
    timer: AbortHandle,
}

#[derive(Default)]
struct Table {
    last_seq: i64,
    entries: HashMap<i64, PendingRequest>,
}

/// Outstanding requests keyed by sequence number, each with its own
/// expiry timer.
///
/// Cloning yields another handle to the same table.
#[derive(Clone, Default)]
pub struct PendingRequests {
    inner: Arc<Mutex<Table>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate the next sequence number. Never reset for the lifetime of
    /// the table.
    pub fn next_seq(&self) -> i64 {
        let mut table = self.lock();
        table.last_seq += 1;
        table.last_seq
    }

    /// Track `id` until it is resolved, rejected, drained or `timeout`
    /// elapses. Must be called from within a tokio runtime.
    pub fn register(
        &self,
        id: i64,
        command: &str,
        timeout: Duration,
    ) -> oneshot::Receiver<Outcome> {
        let (reply, rx) = oneshot::channel();

        // Hold the lock while arming the timer so it cannot fire before the
        // entry exists.
        let mut table = self.lock();
        let handle = self.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            handle.expire(id, timeout);
        })
        .abort_handle();

        // Ids come from `next_seq` or are the readiness sentinel, armed once.
        debug_assert!(!table.entries.contains_key(&id), "sequence id {id} registered twice");
        let entry = PendingRequest { command: command.to_string(), reply, timer };
        table.entries.insert(id, entry);
        tracing::debug!("Registered pending request {id} ({command}), timeout {timeout:?}");

        rx
    }

    /// Settle `id` successfully. Returns `false` if nothing was pending under
    /// that id (late, duplicate or timed-out reply); the response is dropped.
    pub fn resolve(&self, id: i64, response: Response) -> bool {
        self.settle(id, Ok(response))
    }

    /// Settle `id` with an error. Same contract as [`Self::resolve`].
    pub fn reject(&self, id: i64, error: ClientError) -> bool {
        self.settle(id, Err(error))
    }

    fn settle(&self, id: i64, outcome: Outcome) -> bool {
        let Some(entry) = self.lock().entries.remove(&id) else {
            tracing::debug!("No pending request for id {id}, discarding");
            return false;
        };
        entry.timer.abort();
        // The caller may have stopped listening; that is not our problem.
        let _ = entry.reply.send(outcome);
        true
    }

    fn expire(&self, id: i64, timeout: Duration) {
        let Some(entry) = self.lock().entries.remove(&id) else {
            return;
        };
        tracing::debug!("Request {id} ({}) timed out after {timeout:?}", entry.command);
        let _ = entry.reply.send(Err(ClientError::Timeout { command: entry.command, timeout }));
    }

    /// Fail every outstanding request, e.g. when the process goes away.
    /// Returns how many were failed.
    pub fn drain(&self, error: &ClientError) -> usize {
        let entries: Vec<(i64, PendingRequest)> = self.lock().entries.drain().collect();
        let count = entries.len();
        for (id, entry) in entries {
            tracing::debug!("Failing pending request {id} ({}): {error}", entry.command);
            entry.timer.abort();
            let _ = entry.reply.send(Err(error.clone()));
        }
        count
    }

    pub fn contains(&self, id: i64) -> bool {
        self.lock().entries.contains_key(&id)
    }

    /// Number of outstanding requests, which is also the number of armed
    /// expiry timers.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
