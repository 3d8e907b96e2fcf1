use std::time::Duration;

use thiserror::Error;

/// Everything a single tsserver call can fail with.
///
/// Decoder-level problems (`MalformedFrame`) are recovered inside the
/// ingest loop and only surface in logs; every other variant is delivered
/// to the caller whose request failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },

    #[error("'{command}' timed out after {}ms", .timeout.as_millis())]
    Timeout { command: String, timeout: Duration },

    #[error("tsserver did not signal readiness within {}ms", .timeout.as_millis())]
    StartupTimeout { timeout: Duration },

    #[error("tsserver is not ready to accept requests")]
    NotReady,

    #[error("tsserver stdin is not writable: {reason}")]
    StreamUnwritable { reason: String },

    #[error("tsserver process exited")]
    ProcessExited,

    #[error("tsserver rejected '{command}': {message}")]
    Server { command: String, message: String },

    #[error("failed to spawn tsserver: {reason}")]
    Spawn { reason: String },

    #[error("JSON error: {reason}")]
    Codec { reason: String },
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec { reason: err.to_string() }
    }
}
