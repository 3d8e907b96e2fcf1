//! One-shot startup handshake.
//!
//! tsserver announces that it finished bootstrapping with a single event
//! (by default `typingsInstallerPid`). The gate parks a pending entry under
//! [`READY_SENTINEL`] before the process is spawned, so the announcement
//! cannot be missed, and arms its own startup timer on that entry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};

use crate::tsserver::error::ClientError;
use crate::tsserver::pending::{Outcome, PendingRequests, READY_SENTINEL};
use crate::tsserver::protocol::{Event, Response};

enum GateState {
    Waiting(oneshot::Receiver<Outcome>),
    Settled(Result<(), ClientError>),
}

struct GateInner {
    event: String,
    timeout: Duration,
    ready: AtomicBool,
    pending: PendingRequests,
    state: Mutex<GateState>,
}

#[derive(Clone)]
pub struct ReadinessGate {
    inner: Arc<GateInner>,
}

impl ReadinessGate {
    /// Register the sentinel entry and start the startup timer.
    pub fn arm(pending: PendingRequests, event: &str, timeout: Duration) -> Self {
        let rx = pending.register(READY_SENTINEL, "startup", timeout);
        Self {
            inner: Arc::new(GateInner {
                event: event.to_string(),
                timeout,
                ready: AtomicBool::new(false),
                pending,
                state: Mutex::new(GateState::Waiting(rx)),
            }),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// Consume `event` if it is the readiness announcement and the gate is
    /// still waiting for it. Returns whether the event was consumed.
    pub fn observe(&self, event: &Event) -> bool {
        if event.name != self.inner.event {
            return false;
        }

        let announcement = Response {
            request_seq: READY_SENTINEL,
            success: true,
            command: event.name.clone(),
            message: None,
            body: event.body.clone(),
        };
        if !self.inner.pending.resolve(READY_SENTINEL, announcement) {
            return false;
        }

        self.inner.ready.store(true, Ordering::Release);
        tracing::info!("tsserver signalled readiness via '{}'", event.name);
        true
    }

    /// Wait until the gate settles. Every caller sees the same outcome.
    pub async fn wait(&self) -> Result<(), ClientError> {
        let mut state = self.inner.state.lock().await;

        let result = match &mut *state {
            GateState::Settled(result) => return result.clone(),
            GateState::Waiting(rx) => match rx.await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(ClientError::Timeout { .. })) => {
                    Err(ClientError::StartupTimeout { timeout: self.inner.timeout })
                }
                Ok(Err(err)) => Err(err),
                Err(_) => Err(ClientError::ProcessExited),
            },
        };

        if result.is_ok() {
            self.inner.ready.store(true, Ordering::Release);
        }
        *state = GateState::Settled(result.clone());
        result
    }
}
