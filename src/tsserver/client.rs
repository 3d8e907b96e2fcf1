use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, Mutex};

use crate::tsserver::config::ClientConfig;
use crate::tsserver::dispatch::{Dispatcher, Reply, Router};
use crate::tsserver::error::ClientError;
use crate::tsserver::framing::FrameDecoder;
use crate::tsserver::pending::PendingRequests;
use crate::tsserver::protocol::Event;
use crate::tsserver::readiness::ReadinessGate;
use crate::tsserver::server::{ServerInput, TsServerProcess};

/// Events that carry `geterr` results.
pub const DIAGNOSTIC_EVENTS: &[&str] = &["syntaxDiag", "semanticDiag", "suggestionDiag"];

const READ_CHUNK: usize = 8192;

/// Events waiting for the caller. `held` holds events that were read off
/// the channel by [`TsClient::collect_diagnostics`] but not consumed by it,
/// and is served before the channel.
struct EventQueue {
    held: VecDeque<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventQueue {
    async fn next(&mut self) -> Option<Event> {
        match self.held.pop_front() {
            Some(event) => Some(event),
            None => self.rx.recv().await,
        }
    }

    /// Move everything already routed into `held`, so later reads from `rx`
    /// only see events that arrived after this point.
    fn settle_backlog(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.held.push_back(event);
        }
    }
}

/// A connection to one tsserver instance.
///
/// Owns the sequence counter, the pending-request table and (when spawned)
/// the server process. Nothing is shared between clients. Shutdown is
/// explicit: dropping a client without [`TsClient::shutdown`] or
/// [`TsClient::kill`] leaves the process running.
pub struct TsClient {
    config: ClientConfig,
    pending: PendingRequests,
    gate: ReadinessGate,
    dispatcher: Dispatcher,
    events: Mutex<EventQueue>,
    process: Option<TsServerProcess>,
}

impl TsClient {
    /// Spawn tsserver and wait for its readiness announcement.
    pub async fn start(config: ClientConfig) -> Result<Self, ClientError> {
        let client = Self::spawn(config).await?;
        client.wait_ready().await?;
        Ok(client)
    }

    /// Spawn tsserver without waiting for readiness. Requests fail with
    /// `NotReady` until [`TsClient::wait_ready`] succeeds.
    pub async fn spawn(config: ClientConfig) -> Result<Self, ClientError> {
        // The sentinel must exist before the process can possibly announce
        // itself.
        let pending = PendingRequests::new();
        let gate = ReadinessGate::arm(pending.clone(), &config.ready_event, config.startup_timeout);

        let (process, input, stdout) = match TsServerProcess::start(&config, pending.clone()).await
        {
            Ok(parts) => parts,
            Err(err) => {
                pending.drain(&err);
                return Err(err);
            }
        };

        Ok(Self::attach(config, pending, gate, input, stdout, Some(process)))
    }

    /// Drive an already-connected server through arbitrary streams.
    pub fn from_streams<R, W>(config: ClientConfig, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending = PendingRequests::new();
        let gate = ReadinessGate::arm(pending.clone(), &config.ready_event, config.startup_timeout);
        Self::attach(config, pending, gate, ServerInput::new(writer), reader, None)
    }

    fn attach<R>(
        config: ClientConfig,
        pending: PendingRequests,
        gate: ReadinessGate,
        input: ServerInput,
        reader: R,
        process: Option<TsServerProcess>,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let router = Router::new(pending.clone(), gate.clone(), events_tx);
        let decoder = FrameDecoder::new(config.framing);
        tokio::spawn(read_loop(reader, decoder, router, pending.clone(), input.clone()));

        Self {
            dispatcher: Dispatcher::new(pending.clone(), input),
            config,
            pending,
            gate,
            events: Mutex::new(EventQueue { held: VecDeque::new(), rx: events_rx }),
            process,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    pub async fn wait_ready(&self) -> Result<(), ClientError> {
        self.gate.wait().await
    }

    /// Number of correlated requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Send any command with the configured timeout.
    pub async fn send(&self, command: &str, arguments: Value) -> Result<Reply, ClientError> {
        self.send_with_timeout(command, arguments, self.config.request_timeout).await
    }

    pub async fn send_with_timeout(
        &self,
        command: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<Reply, ClientError> {
        if !self.gate.is_ready() {
            return Err(ClientError::NotReady);
        }
        self.dispatcher.send(command, &arguments, timeout).await
    }

    /// Send a command and return the response body (`Null` when there is
    /// none).
    pub async fn request(&self, command: &str, arguments: Value) -> Result<Value, ClientError> {
        Ok(self.send(command, arguments).await?.into_body())
    }

    /// Next unsolicited event. Events are queued from startup, so nothing
    /// is lost before the first call. Returns `None` once the server is gone
    /// and the queue is empty.
    pub async fn next_event(&self) -> Option<Event> {
        self.events.lock().await.next().await
    }

    pub async fn open(&self, file: &Path) -> Result<(), ClientError> {
        self.send("open", json!({ "file": file.to_string_lossy() })).await.map(|_| ())
    }

    pub async fn close(&self, file: &Path) -> Result<(), ClientError> {
        self.send("close", json!({ "file": file.to_string_lossy() })).await.map(|_| ())
    }

    /// Ask for diagnostics. Returns the `seq` that the final
    /// `requestCompleted` event will carry.
    pub async fn geterr(&self, files: &[&Path], delay_ms: u64) -> Result<i64, ClientError> {
        let files: Vec<_> = files.iter().map(|file| file.to_string_lossy()).collect();
        let reply = self.send("geterr", json!({ "files": files, "delay": delay_ms })).await?;
        Ok(reply.seq())
    }

    pub async fn quickinfo(
        &self,
        file: &Path,
        line: u32,
        offset: u32,
    ) -> Result<Value, ClientError> {
        self.request("quickinfo", location(file, line, offset)).await
    }

    pub async fn definition(
        &self,
        file: &Path,
        line: u32,
        offset: u32,
    ) -> Result<Value, ClientError> {
        self.request("definition", location(file, line, offset)).await
    }

    pub async fn references(
        &self,
        file: &Path,
        line: u32,
        offset: u32,
    ) -> Result<Value, ClientError> {
        self.request("references", location(file, line, offset)).await
    }

    pub async fn completions(
        &self,
        file: &Path,
        line: u32,
        offset: u32,
    ) -> Result<Value, ClientError> {
        self.request("completionInfo", location(file, line, offset)).await
    }

    pub async fn navtree(&self, file: &Path) -> Result<Value, ClientError> {
        self.request("navtree", json!({ "file": file.to_string_lossy() })).await
    }

    pub async fn configure(&self, arguments: Value) -> Result<Value, ClientError> {
        self.request("configure", arguments).await
    }

    pub async fn reload_projects(&self) -> Result<(), ClientError> {
        self.send("reloadProjects", json!({})).await.map(|_| ())
    }

    /// Run `geterr` for `files` and gather the diagnostic events it produces,
    /// up to the `requestCompleted` event that closes it.
    ///
    /// Only diagnostics for `files` that arrive after the request is written
    /// are collected. Everything else, including diagnostics queued before
    /// the call, stays available through [`TsClient::next_event`].
    pub async fn collect_diagnostics(&self, files: &[&Path]) -> Result<Vec<Event>, ClientError> {
        let timeout = self.config.request_timeout;
        let deadline = tokio::time::Instant::now() + timeout;
        let wanted: Vec<String> =
            files.iter().map(|file| file.to_string_lossy().into_owned()).collect();

        let mut queue = self.events.lock().await;
        queue.settle_backlog();
        let seq = self.geterr(files, 0).await?;

        let mut diagnostics = Vec::new();
        loop {
            let event = tokio::time::timeout_at(deadline, queue.rx.recv())
                .await
                .map_err(|_| ClientError::Timeout { command: "geterr".to_string(), timeout })?
                .ok_or(ClientError::ProcessExited)?;

            if event.completed_request() == Some(seq) {
                return Ok(diagnostics);
            }
            if is_diagnostic_for(&event, &wanted) {
                diagnostics.push(event);
            } else {
                tracing::debug!("Holding '{}' while collecting diagnostics", event.name);
                queue.held.push_back(event);
            }
        }
    }

    /// Ask the server to exit, escalating to [`TsClient::kill`] if it is
    /// still running after `grace`.
    pub async fn shutdown(&self, grace: Duration) {
        if self.dispatcher.input().is_writable().await {
            if let Err(err) = self.dispatcher.send("exit", &json!({}), grace).await {
                tracing::debug!("Could not send exit: {err}");
            }
        }

        let exited = match &self.process {
            Some(process) => process.wait_for_exit(Some(grace)).await,
            None => true,
        };
        if exited {
            self.fail_outstanding().await;
        } else {
            tracing::debug!("tsserver still running after {grace:?}, killing it");
            self.kill().await;
        }
    }

    /// Terminate immediately. Outstanding requests fail with `ProcessExited`
    /// without waiting for their timeouts.
    pub async fn kill(&self) {
        if let Some(process) = &self.process {
            process.kill().await;
        }
        self.fail_outstanding().await;
    }

    async fn fail_outstanding(&self) {
        let failed = self.pending.drain(&ClientError::ProcessExited);
        if failed > 0 {
            tracing::debug!("Failed {failed} outstanding request(s) on shutdown");
        }
        self.dispatcher.input().close().await;
    }
}

fn is_diagnostic_for(event: &Event, files: &[String]) -> bool {
    if !DIAGNOSTIC_EVENTS.contains(&event.name.as_str()) {
        return false;
    }
    let file = event.body.as_ref().and_then(|body| body.get("file")).and_then(Value::as_str);
    file.is_some_and(|file| files.iter().any(|wanted| wanted == file))
}

fn location(file: &Path, line: u32, offset: u32) -> Value {
    json!({ "file": file.to_string_lossy(), "line": line, "offset": offset })
}

/// Read stdout until EOF, routing every complete frame. When the stream
/// ends the server is gone: fail whatever is still pending.
async fn read_loop<R>(
    mut reader: R,
    mut decoder: FrameDecoder,
    router: Router,
    pending: PendingRequests,
    input: ServerInput,
) where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => {
                tracing::debug!("tsserver stdout closed (EOF)");
                break;
            }
            Ok(n) => router.ingest(&mut decoder, &chunk[..n]),
            Err(e) => {
                tracing::debug!("tsserver stdout read error: {e}");
                break;
            }
        }
    }

    if decoder.buffered() > 0 {
        tracing::debug!("Discarding {} byte(s) of incomplete output", decoder.buffered());
    }
    let failed = pending.drain(&ClientError::ProcessExited);
    if failed > 0 {
        tracing::debug!("Failed {failed} pending request(s) after stdout closed");
    }
    input.close().await;
}
