use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tokio::sync::{oneshot, watch};

use crate::tsserver::config::ClientConfig;
use crate::tsserver::error::ClientError;
use crate::tsserver::pending::PendingRequests;

/// Log target for lines the server writes to stderr.
const STDERR_TARGET: &str = "tsbridge::stderr";

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Write half of the connection to tsserver.
///
/// Once the stream is closed (process exit, kill, or a failed write) every
/// later write fails immediately with `StreamUnwritable` instead of
/// buffering.
#[derive(Clone)]
pub struct ServerInput {
    inner: Arc<tokio::sync::Mutex<Option<BoxedWriter>>>,
}

impl ServerInput {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self { inner: Arc::new(tokio::sync::Mutex::new(Some(Box::new(writer)))) }
    }

    pub async fn is_writable(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    /// Write one newline-terminated message.
    pub async fn write_line(&self, line: &str) -> Result<(), ClientError> {
        let mut slot = self.inner.lock().await;
        let Some(writer) = slot.as_mut() else {
            return Err(ClientError::StreamUnwritable { reason: "stdin is closed".to_string() });
        };

        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = result {
            tracing::debug!("Write to tsserver stdin failed, closing it: {e}");
            *slot = None;
            return Err(ClientError::StreamUnwritable { reason: e.to_string() });
        }
        Ok(())
    }

    pub async fn close(&self) {
        if let Some(mut writer) = self.inner.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }
}

/// Owns the tsserver child process.
///
/// The child is moved into a supervisor task that waits for it to exit (or
/// for a kill request) and then fails every outstanding request with
/// `ProcessExited`. Dropping this handle does not stop the process; call
/// [`TsServerProcess::kill`] or shut the client down explicitly.
pub struct TsServerProcess {
    pid: Option<u32>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    exited: watch::Receiver<bool>,
}

impl TsServerProcess {
    /// Resolve the entry script against the workspace and make sure it exists
    /// before handing it to the interpreter.
    async fn resolve_entry_script(config: &ClientConfig) -> Result<PathBuf, ClientError> {
        let script = if config.tsserver.is_absolute() {
            config.tsserver.clone()
        } else {
            config.workspace.join(&config.tsserver)
        };

        match tokio::fs::metadata(&script).await {
            Ok(meta) if meta.is_file() => Ok(script),
            _ => Err(ClientError::Spawn {
                reason: format!(
                    "tsserver entry script not found at {}. \
                     Install it with: npm install --save-dev typescript",
                    script.display()
                ),
            }),
        }
    }

    /// Spawn the server and wire up its streams. Returns the process handle
    /// together with the stdin writer and stdout reader.
    pub async fn start(
        config: &ClientConfig,
        pending: PendingRequests,
    ) -> Result<(Self, ServerInput, ChildStdout), ClientError> {
        let script = Self::resolve_entry_script(config).await?;

        tracing::debug!(
            "Starting tsserver: {} {} {:?} in workspace: {}",
            config.node.display(),
            script.display(),
            config.args,
            config.workspace.display(),
        );

        let mut child = Command::new(&config.node)
            .arg(&script)
            .args(&config.args)
            .current_dir(&config.workspace)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ClientError::Spawn { reason: spawn_failure(&config.node, &e) })?;

        let pid = child.id();
        tracing::debug!("tsserver process started (pid: {pid:?})");

        let missing =
            |stream: &str| ClientError::Spawn { reason: format!("{stream} not captured") };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        let input = ServerInput::new(stdin);
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        let (exited_tx, exited) = watch::channel(false);

        tokio::spawn(drain_stderr(stderr));

        let supervisor_input = input.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                Ok(()) = &mut kill_rx => {
                    if let Err(e) = child.start_kill() {
                        tracing::debug!("Failed to signal tsserver: {e}");
                    }
                    child.wait().await
                }
            };

            match status {
                Ok(status) => tracing::info!("tsserver exited with {status}"),
                Err(e) => tracing::warn!("Failed to wait for tsserver: {e}"),
            }

            let failed = pending.drain(&ClientError::ProcessExited);
            if failed > 0 {
                tracing::debug!("Failed {failed} pending request(s) on process exit");
            }
            supervisor_input.close().await;
            let _ = exited_tx.send(true);
        });

        Ok((Self { pid, kill_tx: Mutex::new(Some(kill_tx)), exited }, input, stdout))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn has_exited(&self) -> bool {
        *self.exited.borrow()
    }

    /// Send the OS termination signal and wait for the process to be reaped.
    pub async fn kill(&self) {
        let kill_tx = self.kill_tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(kill_tx) = kill_tx {
            tracing::debug!("Killing tsserver (pid: {:?})", self.pid);
            let _ = kill_tx.send(());
        }
        self.wait_for_exit(None).await;
    }

    /// Wait for the process to exit, optionally bounded. Returns whether it
    /// exited.
    pub async fn wait_for_exit(&self, limit: Option<Duration>) -> bool {
        let mut exited = self.exited.clone();
        let wait = exited.wait_for(|&done| done);
        match limit {
            Some(limit) => matches!(tokio::time::timeout(limit, wait).await, Ok(Ok(_))),
            None => wait.await.is_ok(),
        }
    }
}

fn spawn_failure(node: &Path, err: &std::io::Error) -> String {
    if err.kind() == std::io::ErrorKind::NotFound {
        format!("'{}' not found on PATH. Install Node.js or pass --node", node.display())
    } else {
        format!("failed to start '{}': {err}", node.display())
    }
}

/// Log everything the server prints on stderr. Never parsed.
async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::warn!(target: STDERR_TARGET, "{line}"),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("tsserver stderr read error: {e}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_write_line_appends_newline() {
        let (client, mut server) = tokio::io::duplex(256);
        let input = ServerInput::new(client);
        input.write_line(r#"{"seq":1}"#).await.unwrap();
        input.close().await;

        let mut received = String::new();
        server.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "{\"seq\":1}\n");
    }

    #[tokio::test]
    async fn test_closed_input_fails_fast() {
        let (client, _server) = tokio::io::duplex(256);
        let input = ServerInput::new(client);
        input.close().await;
        assert!(!input.is_writable().await);
        assert!(matches!(
            input.write_line("{}").await,
            Err(ClientError::StreamUnwritable { .. })
        ));
    }

    #[tokio::test]
    async fn test_broken_pipe_closes_input() {
        let (client, server) = tokio::io::duplex(256);
        drop(server);
        let input = ServerInput::new(client);
        assert!(matches!(
            input.write_line("{}").await,
            Err(ClientError::StreamUnwritable { .. })
        ));
        assert!(!input.is_writable().await);
    }

    #[tokio::test]
    async fn test_missing_entry_script() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::new(dir.path()).with_tsserver("missing/tsserver.js");
        let err = TsServerProcess::start(&config, PendingRequests::new()).await.err().unwrap();
        assert!(matches!(err, ClientError::Spawn { ref reason } if reason.contains("not found")));
    }
}
