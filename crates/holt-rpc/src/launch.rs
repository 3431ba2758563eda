//! Spawning and supervising the headless editor process.
//!
//! The editor creates its listen socket asynchronously after it starts, so
//! connecting polls for the socket with backoff instead of sleeping for a
//! fixed interval.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::{Child, Command};

use holt_paths::PathResolver;
use holt_poll::{wait_until, BackoffConfig, WaitError};

use crate::client::{EditorClient, EditorClientConfig};
use crate::{RpcError, RpcResult};

#[derive(Debug, Clone)]
pub struct EditorLaunchConfig {
    /// Editor binary to run headless.
    pub program: PathBuf,
    /// Extra arguments appended after the standard headless/listen flags.
    pub args: Vec<String>,
    pub workspace_root: PathBuf,
    /// Listen socket; a per-process path under the OS temp dir by default.
    pub socket_path: Option<PathBuf>,
    /// Backoff schedule for waiting on socket creation.
    pub startup: BackoffConfig,
    pub client: EditorClientConfig,
}

impl EditorLaunchConfig {
    pub fn new(program: impl Into<PathBuf>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workspace_root: workspace_root.into(),
            socket_path: None,
            startup: BackoffConfig {
                initial: Duration::from_millis(50),
                max: Duration::from_millis(500),
                multiplier: 2.0,
                deadline: Duration::from_secs(15),
            },
            client: EditorClientConfig::default(),
        }
    }
}

/// A running headless editor plus the connection to it.
pub struct EditorHandle {
    client: EditorClient,
    child: Child,
    socket_path: PathBuf,
}

impl EditorHandle {
    pub async fn spawn(config: EditorLaunchConfig) -> RpcResult<EditorHandle> {
        let resolver = PathResolver::new(&config.workspace_root)?;
        let socket_path = config.socket_path.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(format!("holt-editor-{}.sock", std::process::id()))
        });

        let mut command = Command::new(&config.program);
        command
            .arg("--headless")
            .arg("--listen")
            .arg(&socket_path)
            .args(&config.args)
            .current_dir(resolver.root())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn()?;

        let socket = socket_path.clone();
        let waited = wait_until(&config.startup, move || {
            let socket = socket.clone();
            async move { tokio::fs::try_exists(&socket).await.unwrap_or(false) }
        })
        .await;

        if let Err(WaitError::Timeout(deadline)) = waited {
            let _ = child.kill().await;
            return Err(RpcError::Startup(format!(
                "editor did not create {} within {deadline:?}",
                socket_path.display()
            )));
        }

        let stream = tokio::net::UnixStream::connect(&socket_path).await?;
        let client = EditorClient::connect_stream(stream, resolver, config.client);

        Ok(EditorHandle {
            client,
            child,
            socket_path,
        })
    }

    pub fn client(&self) -> &EditorClient {
        &self.client
    }

    /// Stop the editor: ask it to quit, tear down the connection, and kill
    /// the process if it does not exit promptly.
    pub async fn stop(mut self) -> RpcResult<()> {
        let _ = self
            .client
            .call_with_timeout("editor/quit", Value::Null, Duration::from_secs(2))
            .await;
        self.client.shutdown();

        match tokio::time::timeout(Duration::from_secs(2), self.child.wait()).await {
            Ok(status) => {
                status?;
            }
            Err(_elapsed) => {
                self.child.kill().await?;
            }
        }

        if tokio::fs::try_exists(&self.socket_path).await.unwrap_or(false) {
            let _ = tokio::fs::remove_file(&self.socket_path).await;
        }
        Ok(())
    }
}
