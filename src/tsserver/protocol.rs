use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outgoing command envelope.
///
/// Every envelope carries a `seq`. Fire-and-forget commands never get a
/// response keyed by it, but tsserver echoes it in `requestCompleted`.
#[derive(Serialize, Debug)]
pub struct Request<'a> {
    pub seq: i64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub command: &'a str,
    pub arguments: &'a Value,
}

impl<'a> Request<'a> {
    pub fn new(seq: i64, command: &'a str, arguments: &'a Value) -> Self {
        Self { seq, kind: "request", command, arguments }
    }
}

/// Anything tsserver writes to stdout, decoded loosely so unknown fields
/// and message types never break parsing.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Message {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub seq: Option<i64>,
    #[serde(default)]
    pub request_seq: Option<i64>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub body: Option<Value>,
}

/// A decoded message, classified by its `type` discriminator.
#[derive(Debug, Clone)]
pub enum Incoming {
    Response(Response),
    Event(Event),
    /// Any other `type` (tsserver does not send requests to the client, but
    /// nothing stops a future version from doing so).
    Other(Message),
}

impl Message {
    pub fn classify(self) -> Incoming {
        match (self.kind.as_str(), self.request_seq, self.event.as_deref()) {
            ("response", Some(request_seq), _) => Incoming::Response(Response {
                request_seq,
                success: self.success.unwrap_or(false),
                command: self.command.unwrap_or_default(),
                message: self.message,
                body: self.body,
            }),
            ("event", _, Some(name)) => Incoming::Event(Event {
                name: name.to_string(),
                seq: self.seq,
                body: self.body,
            }),
            _ => Incoming::Other(self),
        }
    }

    /// Present an unclassified message as an event so observers still see
    /// it. Named after its `event` field, else its `type`.
    pub fn into_event(self) -> Event {
        let name = match (self.event, self.kind) {
            (Some(event), _) => event,
            (None, kind) if !kind.is_empty() => kind,
            _ => "unknown".to_string(),
        };
        Event { name, seq: self.seq, body: self.body }
    }
}

/// Reply to a correlated command.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    pub message: Option<String>,
    pub body: Option<Value>,
}

/// Unsolicited notification from tsserver (diagnostics, project loading, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub seq: Option<i64>,
    pub body: Option<Value>,
}

impl Event {
    /// `request_seq` carried in a `requestCompleted` body.
    pub fn completed_request(&self) -> Option<i64> {
        if self.name != "requestCompleted" {
            return None;
        }
        self.body.as_ref()?.get("request_seq")?.as_i64()
    }
}
