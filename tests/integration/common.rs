use std::path::PathBuf;
use std::time::Duration;

use tsbridge::ClientConfig;

/// Shell script that speaks enough of the tsserver protocol for tests.
pub fn fake_tsserver() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fake_tsserver.sh")
}

/// Client configuration that runs the fake server under `sh` inside
/// `workspace`.
#[allow(dead_code)]
pub fn fake_config(workspace: &std::path::Path) -> ClientConfig {
    ClientConfig::new(workspace)
        .with_node("sh")
        .with_tsserver(fake_tsserver())
        .with_request_timeout(Duration::from_secs(10))
        .with_startup_timeout(Duration::from_secs(10))
}
