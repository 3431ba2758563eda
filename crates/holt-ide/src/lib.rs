//! Code-intelligence adapters over the editor bridge.
//!
//! Stateless request/response wrappers that compose bridge calls into one
//! logical operation each: resolve the path, open the buffer, wait for the
//! language server to be ready (polling, never a fixed sleep), issue the
//! request, and normalize result paths for display. All language smarts live
//! in the editor's language servers; nothing here parses source code.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use holt_core::BufferId;
use holt_poll::{wait_for, BackoffConfig, WaitError};
use holt_rpc::{EditorClient, RpcError};

mod analysis;
mod diagnostics;
mod navigation;
pub mod types;
mod workspace;

pub use analysis::{Analysis, Direction};
pub use diagnostics::Diagnostics;
pub use navigation::Navigation;
pub use workspace::Workspace;

pub use holt_core::Position;

#[derive(Debug, Error)]
pub enum IdeError {
    #[error("language server not ready within {0:?}")]
    NotReady(Duration),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

pub type IdeResult<T> = Result<T, IdeError>;

/// Shared adapter configuration.
#[derive(Debug, Clone)]
pub struct IdeConfig {
    /// Backoff schedule for waiting on language-server attachment.
    pub lsp_ready: BackoffConfig,
    /// Default cap on returned completions.
    pub max_completions: usize,
    /// Cap on workspace-search results during dependency analysis.
    pub search_limit: usize,
}

impl Default for IdeConfig {
    fn default() -> Self {
        Self {
            lsp_ready: BackoffConfig {
                initial: Duration::from_millis(100),
                max: Duration::from_secs(1),
                multiplier: 2.0,
                deadline: Duration::from_secs(30),
            },
            max_completions: 50,
            search_limit: 200,
        }
    }
}

/// Open `path` in the editor and wait until a language server is attached
/// and ready for the buffer.
pub(crate) async fn ready_buffer(
    client: &EditorClient,
    ready: &BackoffConfig,
    path: impl AsRef<Path>,
) -> IdeResult<BufferId> {
    let buffer = client.open_buffer(path).await?;

    let waited = wait_for(ready, || {
        let client = client.clone();
        async move { Ok::<_, RpcError>(client.lsp_status(buffer).await?.ready) }
    })
    .await;

    match waited {
        Ok(()) => Ok(buffer),
        Err(WaitError::Timeout(deadline)) => Err(IdeError::NotReady(deadline)),
        Err(WaitError::Check(err)) => Err(err.into()),
    }
}
