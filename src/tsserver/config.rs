use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::tsserver::framing::FramingMode;

/// Default per-request timeout (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default window for the readiness announcement (10 seconds).
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Event tsserver emits once it has bootstrapped.
pub const DEFAULT_READY_EVENT: &str = "typingsInstallerPid";

/// Entry script, relative to the workspace, of a locally installed TypeScript.
pub const DEFAULT_TSSERVER: &str = "node_modules/typescript/lib/tsserver.js";

/// How to launch and talk to one tsserver instance.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Interpreter executable (`node` by default).
    pub node: PathBuf,
    /// Entry script handed to the interpreter. Relative paths are resolved
    /// against `workspace`.
    pub tsserver: PathBuf,
    /// Extra arguments appended after the entry script.
    pub args: Vec<String>,
    /// Working directory of the spawned process.
    pub workspace: PathBuf,
    pub framing: FramingMode,
    pub request_timeout: Duration,
    pub startup_timeout: Duration,
    pub ready_event: String,
}

impl ClientConfig {
    pub fn new(workspace: impl AsRef<Path>) -> Self {
        Self {
            node: PathBuf::from("node"),
            tsserver: PathBuf::from(DEFAULT_TSSERVER),
            args: Vec::new(),
            workspace: workspace.as_ref().to_path_buf(),
            framing: FramingMode::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            ready_event: DEFAULT_READY_EVENT.to_string(),
        }
    }

    pub fn with_node(mut self, node: impl Into<PathBuf>) -> Self {
        self.node = node.into();
        self
    }

    pub fn with_tsserver(mut self, tsserver: impl Into<PathBuf>) -> Self {
        self.tsserver = tsserver.into();
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_framing(mut self, framing: FramingMode) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_ready_event(mut self, event: impl Into<String>) -> Self {
        self.ready_event = event.into();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.node, PathBuf::from("node"));
        assert_eq!(config.framing, FramingMode::ContentLength);
        assert_eq!(config.ready_event, "typingsInstallerPid");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::new("/project")
            .with_node("/usr/bin/node")
            .with_args(["--disableAutomaticTypingAcquisition"])
            .with_framing(FramingMode::Lines)
            .with_startup_timeout(Duration::from_millis(500));
        assert_eq!(config.workspace, PathBuf::from("/project"));
        assert_eq!(config.args, vec!["--disableAutomaticTypingAcquisition".to_string()]);
        assert_eq!(config.framing, FramingMode::Lines);
        assert_eq!(config.startup_timeout, Duration::from_millis(500));
    }
}
