use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::args::{Cli, Commands};
use crate::cli::output::OutputFormatter;
use tsbridge::tsserver::config::{DEFAULT_REQUEST_TIMEOUT, DEFAULT_STARTUP_TIMEOUT};
use tsbridge::workspace::WorkspaceDetector;
use tsbridge::{ClientConfig, TsClient};

/// How long `exit` gets before the server is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Resolve the workspace: explicit flag first, then the nearest project
/// root above the current directory, then the current directory itself.
pub fn resolve_workspace(explicit: Option<&Path>) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let workspace = match explicit {
        Some(dir) => dir.to_path_buf(),
        None => WorkspaceDetector::find_workspace_root(&cwd).unwrap_or(cwd),
    };
    workspace
        .canonicalize()
        .with_context(|| format!("Failed to resolve workspace: {}", workspace.display()))
}

pub fn build_config(cli: &Cli, workspace: PathBuf) -> ClientConfig {
    ClientConfig::new(workspace)
        .with_node(cli.node.clone())
        .with_tsserver(cli.tsserver.clone())
        .with_framing(cli.framing)
        .with_ready_event(cli.ready_event.clone())
        .with_request_timeout(cli.timeout.map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs))
        .with_startup_timeout(
            cli.startup_timeout.map_or(DEFAULT_STARTUP_TIMEOUT, Duration::from_secs),
        )
}

/// tsserver wants absolute paths.
async fn absolute(file: &Path) -> Result<PathBuf> {
    tokio::fs::canonicalize(file)
        .await
        .with_context(|| format!("Failed to resolve path: {}", file.display()))
}

pub async fn run(cli: Cli) -> Result<()> {
    let workspace = resolve_workspace(cli.workspace.as_deref())?;
    let config = build_config(&cli, workspace);
    let formatter = OutputFormatter::new(cli.format);

    let client = TsClient::start(config).await.context("Failed to start tsserver")?;
    let result = execute(&client, cli.command, &formatter).await;
    client.shutdown(SHUTDOWN_GRACE).await;
    println!("{}", result?);
    Ok(())
}

async fn execute(
    client: &TsClient,
    command: Commands,
    formatter: &OutputFormatter,
) -> Result<String> {
    match command {
        Commands::Quickinfo { file, line, column } => {
            let path = absolute(&file).await?;
            client.open(&path).await?;
            let body = client.quickinfo(&path, line, column).await.context("quickinfo failed")?;
            Ok(formatter.format_quickinfo(&body, &query_info(&file, line, column)))
        }
        Commands::Definition { file, line, column } => {
            let path = absolute(&file).await?;
            client.open(&path).await?;
            let body = client.definition(&path, line, column).await.context("definition failed")?;
            Ok(formatter.format_definitions(&body, &query_info(&file, line, column)))
        }
        Commands::References { file, line, column } => {
            let path = absolute(&file).await?;
            client.open(&path).await?;
            let body = client.references(&path, line, column).await.context("references failed")?;
            Ok(formatter.format_references(&body, &query_info(&file, line, column)))
        }
        Commands::Diagnostics { files } => {
            let mut paths = Vec::with_capacity(files.len());
            for file in &files {
                let path = absolute(file).await?;
                client.open(&path).await?;
                paths.push(path);
            }
            let refs: Vec<&Path> = paths.iter().map(PathBuf::as_path).collect();
            let events =
                client.collect_diagnostics(&refs).await.context("collecting diagnostics failed")?;
            Ok(formatter.format_diagnostics(&events))
        }
        Commands::Raw { command, args } => {
            let arguments: Value =
                serde_json::from_str(&args).context("--args must be valid JSON")?;
            let body = client
                .request(&command, arguments)
                .await
                .with_context(|| format!("'{command}' failed"))?;
            Ok(formatter.format_raw(&body))
        }
    }
}

fn query_info(file: &Path, line: u32, column: u32) -> String {
    format!("{}:{line}:{column}", file.display())
}
