//! Per-session bookkeeping owned by the orchestrator.

use tokio::sync::watch;

use holt_core::{RemoteSessionId, SessionId};
use holt_rpc::types::{StackFrame, VarScope, Variable};
use holt_rpc::StopReason;

use crate::breakpoints::SessionBreakpoint;
use crate::machine::SessionState;

/// Cached view of a paused session: call stack plus the top frame's
/// variables, grouped by scope. Invalidated on every resume.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub frames: Vec<StackFrame>,
    pub scopes: Vec<ScopeVariables>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeVariables {
    pub scope: VarScope,
    pub variables: Vec<Variable>,
}

/// Caller-facing summary of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub state: SessionState,
    pub stop_reason: Option<StopReason>,
    pub breakpoints: Vec<SessionBreakpoint>,
    /// Program output accumulated from the adapter's output events.
    pub output: String,
    pub exit_code: Option<i32>,
}

pub(crate) struct SessionRecord {
    pub id: SessionId,
    pub remote: Option<RemoteSessionId>,
    state: SessionState,
    pub stop_reason: Option<StopReason>,
    pub breakpoints: Vec<SessionBreakpoint>,
    pub snapshot: Option<StateSnapshot>,
    pub output: String,
    pub exit_code: Option<i32>,
    state_tx: watch::Sender<SessionState>,
}

impl SessionRecord {
    pub fn new(id: SessionId) -> (Self, watch::Receiver<SessionState>) {
        let (state_tx, state_rx) = watch::channel(SessionState::Uninitialized);
        let record = Self {
            id,
            remote: None,
            state: SessionState::Uninitialized,
            stop_reason: None,
            breakpoints: Vec::new(),
            snapshot: None,
            output: String::new(),
            exit_code: None,
            state_tx,
        };
        (record, state_rx)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `next` and wake every pending wait on this session. A
    /// same-state transition is a no-op so waiters observe each change
    /// exactly once.
    pub fn transition(&mut self, next: SessionState) {
        if self.state != next {
            self.state = next;
            let _ = self.state_tx.send(next);
        }
    }

    pub fn invalidate_snapshot(&mut self) {
        self.snapshot = None;
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            state: self.state,
            stop_reason: self.stop_reason,
            breakpoints: self.breakpoints.clone(),
            output: self.output.clone(),
            exit_code: self.exit_code,
        }
    }
}
