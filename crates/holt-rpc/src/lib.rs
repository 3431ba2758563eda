//! Persistent RPC bridge to the headless editor process.
//!
//! The editor is a black-box peer that embeds language-server and
//! debug-adapter clients. This crate owns the single long-lived connection to
//! it and the async/sync boundary around it:
//! - `Content-Length`-framed JSON requests/responses with u64 correlation ids
//! - multiplexed concurrent in-flight calls, each with its own deadline
//! - a broadcast subscription for asynchronously pushed editor events,
//!   terminated by a [`EditorEvent::ConnectionLost`] sentinel
//! - canonicalization of every path argument before serialization, so the
//!   caller and the editor always name the same file identically
//!
//! Higher layers (`holt-debug`, `holt-ide`) compose the typed call surface
//! exposed by [`EditorClient`]; they never touch the wire.

use std::io;
use std::time::Duration;

use thiserror::Error;

pub mod codec;
mod client;
mod events;
#[cfg(unix)]
mod launch;
pub mod types;

#[cfg(any(test, feature = "wire-test-support"))]
pub mod mock;

pub use client::{EditorClient, EditorClientConfig};
pub use events::{EditorEvent, StopReason};
#[cfg(unix)]
pub use launch::{EditorHandle, EditorLaunchConfig};

pub use holt_core::{BufferId, Position, RemoteSessionId, SessionId};
pub use holt_paths::{PathError, PathResolver};

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("remote call {method} timed out after {timeout:?}")]
    RemoteTimeout { method: String, timeout: Duration },

    #[error("remote error: {0}")]
    Remote(String),

    #[error("connection to the editor lost")]
    ConnectionLost,

    #[error("editor startup failed: {0}")]
    Startup(String),

    #[error(transparent)]
    Path(#[from] PathError),
}

pub type RpcResult<T> = Result<T, RpcError>;
