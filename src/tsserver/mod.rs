//! Protocol engine for driving tsserver over stdio.
//!
//! Bytes from the server's stdout are reassembled into frames by
//! [`framing::FrameDecoder`], parsed and routed by [`dispatch::Router`] to
//! the [`pending::PendingRequests`] table, the [`readiness::ReadinessGate`]
//! or the event channel. Outgoing commands go through
//! [`dispatch::Dispatcher`], which decides per command whether a response
//! is expected.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod framing;
pub mod pending;
pub mod protocol;
pub mod readiness;
pub mod server;

pub use client::TsClient;
pub use config::ClientConfig;
pub use dispatch::Reply;
pub use error::ClientError;
pub use framing::FramingMode;
pub use protocol::{Event, Response};
