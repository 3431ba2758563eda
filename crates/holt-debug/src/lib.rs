//! Debug session orchestration over the editor bridge.
//!
//! Each logical session is an explicit state machine reconciled against the
//! asynchronous events the editor's debug-adapter layer pushes through the
//! bridge subscription. The orchestrator:
//! - validates every control operation against the session's current state
//! - correlates events to sessions via a remote-id map it alone mutates
//! - reconciles breakpoint sets by delta, never reissuing unchanged ones
//! - invalidates cached stack/variable snapshots *before* a resume is
//!   confirmed, so a stale paused-state snapshot can never be observed
//! - moves every non-terminal session to `Lost` when the connection drops

use std::time::Duration;

use thiserror::Error;

mod breakpoints;
mod machine;
mod orchestrator;
mod session;

pub use breakpoints::{diff_breakpoints, Breakpoint, BreakpointDelta, SessionBreakpoint};
pub use machine::{control_allowed, event_transition, ControlAction, SessionEvent, SessionState};
pub use orchestrator::{BreakpointOutcome, DebugConfig, DebugOrchestrator, FailedBreakpoint};
pub use session::{ScopeVariables, SessionInfo, StateSnapshot};

pub use holt_core::{RemoteSessionId, SessionId};
pub use holt_rpc::types::LaunchRequest;
pub use holt_rpc::{RpcError, StopReason};

#[derive(Debug, Error)]
pub enum DebugError {
    #[error("operation not valid in session state {state:?}")]
    InvalidState { state: SessionState },

    #[error("unknown debug session {0}")]
    UnknownSession(SessionId),

    #[error("launch rejected: {0}")]
    LaunchFailed(String),

    #[error("timed out waiting for {what} after {elapsed:?}")]
    Timeout {
        what: &'static str,
        elapsed: Duration,
    },

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

pub type DebugResult<T> = Result<T, DebugError>;
