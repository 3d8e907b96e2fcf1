//! Outgoing command dispatch and incoming message routing.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::tsserver::error::ClientError;
use crate::tsserver::framing::FrameDecoder;
use crate::tsserver::pending::PendingRequests;
use crate::tsserver::protocol::{Event, Incoming, Message, Request, Response};
use crate::tsserver::readiness::ReadinessGate;
use crate::tsserver::server::ServerInput;

/// Commands tsserver never answers with a `response`. Their effects, if
/// any, show up later as events (`geterr` reports through `semanticDiag`,
/// `syntaxDiag`, `suggestionDiag` and finally `requestCompleted`).
pub const FIRE_AND_FORGET: &[&str] = &[
    "open",
    "close",
    "change",
    "geterr",
    "geterrForProject",
    "saveto",
    "reloadProjects",
    "exit",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Expects exactly one `response` carrying `request_seq == seq`.
    Correlated,
    FireAndForget,
}

pub fn delivery(command: &str) -> Delivery {
    if FIRE_AND_FORGET.contains(&command) {
        Delivery::FireAndForget
    } else {
        Delivery::Correlated
    }
}

/// What a sent command settled with.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Fire-and-forget command written; `seq` is what tsserver will echo in
    /// any `requestCompleted` event.
    Sent { seq: i64 },
    Response(Response),
}

impl Reply {
    /// Sequence number the command was sent under.
    pub fn seq(&self) -> i64 {
        match self {
            Self::Sent { seq } => *seq,
            Self::Response(response) => response.request_seq,
        }
    }

    /// Response body, or `Null` for fire-and-forget commands.
    pub fn into_body(self) -> Value {
        match self {
            Self::Sent { .. } => Value::Null,
            Self::Response(response) => response.body.unwrap_or(Value::Null),
        }
    }
}

/// Builds command envelopes and writes them to the server.
#[derive(Clone)]
pub struct Dispatcher {
    pending: PendingRequests,
    input: ServerInput,
}

impl Dispatcher {
    pub fn new(pending: PendingRequests, input: ServerInput) -> Self {
        Self { pending, input }
    }

    pub fn input(&self) -> &ServerInput {
        &self.input
    }

    /// Send `command` and wait for its outcome.
    ///
    /// Correlated commands are registered before they are written, so a
    /// reply can never overtake its own registration. Several sends may be
    /// in flight at once; each settles with the response whose
    /// `request_seq` matches its own `seq`.
    pub async fn send(
        &self,
        command: &str,
        arguments: &Value,
        timeout: Duration,
    ) -> Result<Reply, ClientError> {
        let seq = self.pending.next_seq();
        let line = serde_json::to_string(&Request::new(seq, command, arguments))?;

        if delivery(command) == Delivery::FireAndForget {
            tracing::debug!("Sending tsserver notification: {command} (seq: {seq})");
            self.input.write_line(&line).await?;
            return Ok(Reply::Sent { seq });
        }

        let rx = self.pending.register(seq, command, timeout);
        tracing::debug!("Sending tsserver request: {command} (seq: {seq})");
        if let Err(err) = self.input.write_line(&line).await {
            self.pending.reject(seq, err.clone());
            return Err(err);
        }

        let response = rx.await.map_err(|_| ClientError::ProcessExited)??;
        tracing::debug!("tsserver response received for {command} (seq: {seq})");
        Ok(Reply::Response(response))
    }
}

/// Routes decoded frames to the pending table, the readiness gate or the
/// event channel.
pub struct Router {
    pending: PendingRequests,
    gate: ReadinessGate,
    events: mpsc::UnboundedSender<Event>,
}

impl Router {
    pub fn new(
        pending: PendingRequests,
        gate: ReadinessGate,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Self { pending, gate, events }
    }

    /// Feed one stdout chunk through `decoder` and route every frame it
    /// completes.
    pub fn ingest(&self, decoder: &mut FrameDecoder, chunk: &[u8]) {
        decoder.push(chunk);
        for frame in decoder.frames() {
            match frame {
                Ok(frame) => self.on_frame(&frame),
                Err(err) => tracing::warn!("Dropping tsserver output: {err}"),
            }
        }
    }

    pub fn on_frame(&self, frame: &[u8]) {
        match serde_json::from_slice::<Message>(frame) {
            Ok(message) => self.route(message.classify()),
            Err(e) => {
                let err = ClientError::MalformedFrame { reason: e.to_string() };
                tracing::warn!(
                    "Dropping tsserver output: {err}: {}",
                    String::from_utf8_lossy(frame).chars().take(200).collect::<String>()
                );
            }
        }
    }

    pub fn route(&self, incoming: Incoming) {
        match incoming {
            Incoming::Response(response) => self.on_response(response),
            Incoming::Event(event) => self.on_event(event),
            Incoming::Other(message) => {
                tracing::debug!("Unclassified tsserver message of type '{}'", message.kind);
                self.forward(message.into_event());
            }
        }
    }

    fn on_response(&self, response: Response) {
        let seq = response.request_seq;
        let settled = if response.success {
            self.pending.resolve(seq, response)
        } else {
            let error = ClientError::Server {
                message: response.message.unwrap_or_else(|| "request failed".to_string()),
                command: response.command,
            };
            self.pending.reject(seq, error)
        };

        if !settled {
            tracing::debug!("Discarding tsserver response for unknown request_seq {seq}");
        }
    }

    fn on_event(&self, event: Event) {
        if self.gate.observe(&event) {
            return;
        }
        tracing::debug!("tsserver event: {}", event.name);
        self.forward(event);
    }

    fn forward(&self, event: Event) {
        if let Err(mpsc::error::SendError(event)) = self.events.send(event) {
            tracing::debug!("No event subscriber left, dropping '{}'", event.name);
        }
    }
}
