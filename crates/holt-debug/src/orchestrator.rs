use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{broadcast, watch, Mutex};

use holt_core::{RemoteSessionId, SessionId};
use holt_poll::{wait_for, BackoffConfig, WaitError};
use holt_rpc::types::{EvaluateOutcome, LaunchRequest};
use holt_rpc::{EditorClient, EditorEvent, RpcError};

use crate::breakpoints::{diff_breakpoints, Breakpoint, SessionBreakpoint};
use crate::machine::{control_allowed, event_transition, ControlAction, SessionEvent, SessionState};
use crate::session::{ScopeVariables, SessionRecord, StateSnapshot};
use crate::{DebugError, DebugResult, SessionInfo};

#[derive(Debug, Clone)]
pub struct DebugConfig {
    /// How long `start` waits for the adapter-ready event.
    pub launch_deadline: Duration,
    /// Backoff schedule for polling breakpoint verification; the editor does
    /// not reliably push that transition.
    pub verify: BackoffConfig,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            launch_deadline: Duration::from_secs(15),
            verify: BackoffConfig {
                initial: Duration::from_millis(50),
                max: Duration::from_millis(500),
                multiplier: 2.0,
                deadline: Duration::from_secs(5),
            },
        }
    }
}

/// Per-breakpoint failure in a partially applied `set_breakpoints`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedBreakpoint {
    pub breakpoint: Breakpoint,
    pub reason: String,
}

/// Result of `set_breakpoints`: everything the session now holds, plus the
/// requested breakpoints that could not be applied and why. A partial
/// failure leaves the confirmed breakpoints in place.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointOutcome {
    pub applied: Vec<SessionBreakpoint>,
    pub failed: Vec<FailedBreakpoint>,
}

struct SessionSlot {
    record: Mutex<SessionRecord>,
    state_rx: watch::Receiver<SessionState>,
}

struct Shared {
    client: EditorClient,
    config: DebugConfig,
    sessions: RwLock<HashMap<SessionId, Arc<SessionSlot>>>,
    /// Remote id → logical session. Mutated only at session lifecycle
    /// transitions (start, terminate); the event path only reads it.
    remote_index: RwLock<HashMap<RemoteSessionId, SessionId>>,
    next_id: AtomicU64,
}

/// Owns the lifecycle of all debug sessions on one editor connection.
///
/// Conflicting control operations on the same session queue behind a
/// per-session mutex; operations on different sessions proceed concurrently.
#[derive(Clone)]
pub struct DebugOrchestrator {
    shared: Arc<Shared>,
}

impl DebugOrchestrator {
    pub fn new(client: EditorClient, config: DebugConfig) -> Self {
        let events = client.subscribe();
        let shared = Arc::new(Shared {
            client,
            config,
            sessions: RwLock::new(HashMap::new()),
            remote_index: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        });
        tokio::spawn(event_pump(shared.clone(), events));
        Self { shared }
    }

    /// Allocate a session in `Uninitialized`.
    pub fn create_session(&self) -> SessionId {
        let id = SessionId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let (record, state_rx) = SessionRecord::new(id);
        let slot = Arc::new(SessionSlot {
            record: Mutex::new(record),
            state_rx,
        });
        self.shared.sessions.write().insert(id, slot);
        id
    }

    /// Create and start a session in one step.
    pub async fn launch(&self, request: LaunchRequest) -> DebugResult<SessionId> {
        let id = self.create_session();
        self.start(id, request).await?;
        Ok(id)
    }

    /// Start a session: issue the remote launch, flush breakpoints recorded
    /// before start, and wait for the adapter to come up.
    ///
    /// Valid only from `Uninitialized`. A deadline here leaves the session in
    /// `Launching`; the orchestrator re-syncs from events rather than
    /// guessing.
    pub async fn start(&self, id: SessionId, request: LaunchRequest) -> DebugResult<()> {
        if request.path.is_some() == request.module.is_some() {
            return Err(DebugError::LaunchFailed(
                "exactly one of `path` and `module` must be set".to_string(),
            ));
        }

        let slot = self.slot(id)?;
        let mut record = slot.record.lock().await;
        if record.state() != SessionState::Uninitialized {
            return Err(DebugError::InvalidState {
                state: record.state(),
            });
        }
        record.transition(SessionState::Launching);

        let remote = match self.shared.client.debug_launch(&request).await {
            Ok(remote) => remote,
            Err(RpcError::Remote(message)) => {
                record.transition(SessionState::Terminated);
                return Err(DebugError::LaunchFailed(message));
            }
            Err(RpcError::ConnectionLost) => {
                record.transition(SessionState::Lost);
                return Err(RpcError::ConnectionLost.into());
            }
            Err(err) => return Err(err.into()),
        };

        record.remote = Some(remote);
        self.shared.remote_index.write().insert(remote, id);

        // Breakpoints set before start were only recorded locally; issue
        // them now that an adapter exists.
        let pending: Vec<Breakpoint> = record
            .breakpoints
            .iter()
            .filter(|bp| bp.remote_id.is_none())
            .map(|bp| bp.breakpoint.clone())
            .collect();
        for breakpoint in pending {
            match self
                .shared
                .client
                .debug_set_breakpoint(
                    remote,
                    &breakpoint.path,
                    breakpoint.line,
                    breakpoint.condition.as_deref(),
                )
                .await
            {
                Ok(confirmed) => {
                    if let Some(held) = record
                        .breakpoints
                        .iter_mut()
                        .find(|bp| bp.breakpoint == breakpoint)
                    {
                        held.remote_id = Some(confirmed.id);
                        held.verified = confirmed.verified;
                    }
                }
                Err(RpcError::Remote(message)) => {
                    tracing::warn!(
                        target: "holt.debug",
                        session = %id,
                        line = breakpoint.line,
                        message,
                        "breakpoint rejected during launch"
                    );
                    record.breakpoints.retain(|bp| bp.breakpoint != breakpoint);
                }
                Err(err) => return Err(err.into()),
            }
        }

        // The pump needs the record to apply adapter-ready; release it
        // before waiting.
        drop(record);

        let deadline = self.shared.config.launch_deadline;
        let mut state_rx = slot.state_rx.clone();
        let waited = tokio::time::timeout(
            deadline,
            state_rx.wait_for(|state| *state != SessionState::Launching),
        )
        .await;

        match waited {
            Ok(Ok(state)) => match *state {
                SessionState::Running => Ok(()),
                SessionState::Lost => Err(RpcError::ConnectionLost.into()),
                state => Err(DebugError::LaunchFailed(format!(
                    "session reached {} during launch",
                    state.as_str()
                ))),
            },
            Ok(Err(_sender_gone)) => Err(RpcError::ConnectionLost.into()),
            Err(_elapsed) => Err(DebugError::Timeout {
                what: "adapter-ready",
                elapsed: deadline,
            }),
        }
    }

    /// Reconcile the session's breakpoints with `requested`.
    ///
    /// Only the delta is sent to the editor: unchanged breakpoints are never
    /// reissued, a condition change at the same (path, line) is a replace.
    /// Remote rejections are reported per breakpoint; confirmed changes stay
    /// applied.
    pub async fn set_breakpoints(
        &self,
        id: SessionId,
        requested: Vec<Breakpoint>,
    ) -> DebugResult<BreakpointOutcome> {
        let slot = self.slot(id)?;
        let mut record = slot.record.lock().await;
        if record.state().is_terminal() {
            return Err(DebugError::InvalidState {
                state: record.state(),
            });
        }

        // Canonicalize up front so set identity matches what the editor sees;
        // a path failure fails that breakpoint, not the batch.
        let mut failed = Vec::new();
        let mut canonical = Vec::new();
        for breakpoint in requested {
            match self.shared.client.resolver().canonicalize(&breakpoint.path) {
                Ok(path) => canonical.push(Breakpoint { path, ..breakpoint }),
                Err(err) => failed.push(FailedBreakpoint {
                    reason: err.to_string(),
                    breakpoint,
                }),
            }
        }

        let delta = diff_breakpoints(&record.breakpoints, &canonical);

        let Some(remote) = record.remote else {
            // No adapter yet: record the set locally; `start` flushes it.
            for removal in &delta.remove {
                record.breakpoints.retain(|bp| bp != removal);
            }
            for add in delta.add {
                record.breakpoints.push(SessionBreakpoint::pending(add));
            }
            return Ok(BreakpointOutcome {
                applied: record.breakpoints.clone(),
                failed,
            });
        };

        for removal in delta.remove {
            if let Some(remote_id) = removal.remote_id {
                match self
                    .shared
                    .client
                    .debug_clear_breakpoint(remote, remote_id)
                    .await
                {
                    Ok(()) => record.breakpoints.retain(|bp| bp != &removal),
                    Err(RpcError::Remote(message)) => failed.push(FailedBreakpoint {
                        breakpoint: removal.breakpoint.clone(),
                        reason: format!("failed to clear: {message}"),
                    }),
                    Err(err) => return Err(err.into()),
                }
            } else {
                record.breakpoints.retain(|bp| bp != &removal);
            }
        }

        let mut added_ids = Vec::new();
        for add in delta.add {
            match self
                .shared
                .client
                .debug_set_breakpoint(remote, &add.path, add.line, add.condition.as_deref())
                .await
            {
                Ok(confirmed) => {
                    added_ids.push(confirmed.id);
                    record.breakpoints.push(SessionBreakpoint {
                        breakpoint: add,
                        remote_id: Some(confirmed.id),
                        verified: confirmed.verified,
                    });
                }
                Err(RpcError::Remote(message)) => failed.push(FailedBreakpoint {
                    breakpoint: add,
                    reason: message,
                }),
                Err(err) => return Err(err.into()),
            }
        }

        // The editor does not push "breakpoint verified"; poll for it.
        let unverified: Vec<u64> = record
            .breakpoints
            .iter()
            .filter(|bp| !bp.verified)
            .filter_map(|bp| bp.remote_id)
            .filter(|id| added_ids.contains(id))
            .collect();
        if !unverified.is_empty() {
            let client = self.shared.client.clone();
            let latest = Arc::new(parking_lot::Mutex::new(Vec::new()));
            let poll_target = latest.clone();
            let waited = wait_for(&self.shared.config.verify, move || {
                let client = client.clone();
                let poll_target = poll_target.clone();
                let unverified = unverified.clone();
                async move {
                    let remote_bps = client.debug_breakpoints(remote).await?;
                    let all = unverified
                        .iter()
                        .all(|id| remote_bps.iter().any(|bp| bp.id == *id && bp.verified));
                    *poll_target.lock() = remote_bps;
                    Ok::<_, RpcError>(all)
                }
            })
            .await;

            match waited {
                Ok(()) | Err(WaitError::Timeout(_)) => {
                    let remote_bps = latest.lock();
                    for held in record.breakpoints.iter_mut() {
                        if let Some(remote_id) = held.remote_id {
                            if let Some(bp) = remote_bps.iter().find(|bp| bp.id == remote_id) {
                                held.verified = bp.verified;
                            }
                        }
                    }
                }
                Err(WaitError::Check(err)) => return Err(err.into()),
            }
        }

        Ok(BreakpointOutcome {
            applied: record.breakpoints.clone(),
            failed,
        })
    }

    /// Drive execution: continue/step from `Paused`, pause from `Running`.
    ///
    /// Resume actions invalidate the cached snapshot *before* the editor
    /// confirms, so no caller can read a stale paused-state snapshot
    /// concurrently with the resume.
    pub async fn control(&self, id: SessionId, action: ControlAction) -> DebugResult<SessionState> {
        let slot = self.slot(id)?;
        let mut record = slot.record.lock().await;
        if !control_allowed(record.state(), action) {
            return Err(DebugError::InvalidState {
                state: record.state(),
            });
        }
        let remote = record.remote.ok_or(DebugError::InvalidState {
            state: record.state(),
        })?;

        if action.is_resume() {
            record.invalidate_snapshot();
            record.stop_reason = None;
        }

        let client = &self.shared.client;
        let issued = match action {
            ControlAction::Continue => client.debug_continue(remote).await,
            ControlAction::StepOver => client.debug_step_over(remote).await,
            ControlAction::StepIn => client.debug_step_in(remote).await,
            ControlAction::StepOut => client.debug_step_out(remote).await,
            ControlAction::Pause => client.debug_pause(remote).await,
        };

        match issued {
            Ok(()) => {
                if action.is_resume() {
                    record.transition(SessionState::Running);
                }
                // A pause is confirmed by the stopped event, not the reply.
                Ok(record.state())
            }
            Err(RpcError::ConnectionLost) => {
                record.invalidate_snapshot();
                record.transition(SessionState::Lost);
                Err(RpcError::ConnectionLost.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Call stack and top-frame variables of a paused session, cached until
    /// the next resume. There is nothing coherent to inspect while running.
    pub async fn inspect_state(&self, id: SessionId) -> DebugResult<StateSnapshot> {
        let slot = self.slot(id)?;
        let mut record = slot.record.lock().await;
        if record.state() != SessionState::Paused {
            return Err(DebugError::InvalidState {
                state: record.state(),
            });
        }
        if let Some(snapshot) = &record.snapshot {
            return Ok(snapshot.clone());
        }
        let remote = record.remote.ok_or(DebugError::InvalidState {
            state: record.state(),
        })?;

        let client = &self.shared.client;
        let frames = client.debug_stack_trace(remote).await?;
        let mut scopes = Vec::new();
        if let Some(top) = frames.first() {
            for scope in client.debug_scopes(remote, top.id).await? {
                let variables = if scope.variables_reference > 0 {
                    client
                        .debug_variables(remote, scope.variables_reference)
                        .await?
                } else {
                    Vec::new()
                };
                scopes.push(ScopeVariables { scope, variables });
            }
        }

        let snapshot = StateSnapshot { frames, scopes };
        record.snapshot = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Evaluate an expression in a paused frame (top frame when `frame` is
    /// `None`).
    pub async fn evaluate(
        &self,
        id: SessionId,
        frame: Option<u64>,
        expression: &str,
    ) -> DebugResult<EvaluateOutcome> {
        let slot = self.slot(id)?;
        let record = slot.record.lock().await;
        if record.state() != SessionState::Paused {
            return Err(DebugError::InvalidState {
                state: record.state(),
            });
        }
        let remote = record.remote.ok_or(DebugError::InvalidState {
            state: record.state(),
        })?;
        Ok(self
            .shared
            .client
            .debug_evaluate(remote, frame, expression)
            .await?)
    }

    /// Terminate a session. Idempotent: a terminal session is a no-op
    /// returning its current state, not an error.
    pub async fn terminate(&self, id: SessionId) -> DebugResult<SessionState> {
        let slot = self.slot(id)?;
        let mut record = slot.record.lock().await;
        if record.state().is_terminal() {
            return Ok(record.state());
        }

        if let Some(remote) = record.remote {
            match self.shared.client.debug_terminate(remote).await {
                Ok(()) => {}
                // The adapter may already be gone; the session still ends.
                Err(RpcError::Remote(message)) => tracing::debug!(
                    target: "holt.debug",
                    session = %id,
                    message,
                    "terminate rejected by editor"
                ),
                Err(RpcError::ConnectionLost) => {
                    record.invalidate_snapshot();
                    record.transition(SessionState::Lost);
                    return Ok(SessionState::Lost);
                }
                Err(err) => return Err(err.into()),
            }
            self.shared.remote_index.write().remove(&remote);
        }

        record.invalidate_snapshot();
        record.stop_reason = None;
        record.transition(SessionState::Terminated);
        Ok(SessionState::Terminated)
    }

    pub async fn session_info(&self, id: SessionId) -> DebugResult<SessionInfo> {
        let slot = self.slot(id)?;
        let record = slot.record.lock().await;
        Ok(record.info())
    }

    pub fn list_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.shared.sessions.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Block until the session satisfies `predicate` or the deadline passes.
    /// A deadline leaves the session in whatever state the editor actually
    /// has; the next operation re-syncs.
    pub async fn wait_for_state(
        &self,
        id: SessionId,
        predicate: impl Fn(SessionState) -> bool,
        deadline: Duration,
    ) -> DebugResult<SessionState> {
        let slot = self.slot(id)?;
        let mut state_rx = slot.state_rx.clone();
        let result = match tokio::time::timeout(deadline, state_rx.wait_for(|state| predicate(*state))).await {
            Ok(Ok(state)) => Ok(*state),
            Ok(Err(_sender_gone)) => Err(RpcError::ConnectionLost.into()),
            Err(_elapsed) => Err(DebugError::Timeout {
                what: "session state",
                elapsed: deadline,
            }),
        };
        result
    }

    /// Wait until the session pauses or ends.
    pub async fn wait_until_stopped(
        &self,
        id: SessionId,
        deadline: Duration,
    ) -> DebugResult<SessionState> {
        self.wait_for_state(
            id,
            |state| state == SessionState::Paused || state.is_terminal(),
            deadline,
        )
        .await
    }

    fn slot(&self, id: SessionId) -> DebugResult<Arc<SessionSlot>> {
        self.shared
            .sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(DebugError::UnknownSession(id))
    }
}

async fn event_pump(shared: Arc<Shared>, mut events: broadcast::Receiver<EditorEvent>) {
    loop {
        match events.recv().await {
            Ok(EditorEvent::ConnectionLost) | Err(broadcast::error::RecvError::Closed) => {
                mark_all_lost(&shared).await;
                break;
            }
            Ok(event) => apply_event(&shared, event).await,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(target: "holt.debug", skipped, "event subscriber lagged");
            }
        }
    }
}

async fn apply_event(shared: &Shared, event: EditorEvent) {
    let Some(remote) = event.session() else { return };

    // Read-only lookups; the event path never mutates the index.
    let slot = {
        let index = shared.remote_index.read();
        let Some(id) = index.get(&remote).copied() else {
            tracing::debug!(
                target: "holt.debug",
                session = %remote,
                "dropping uncorrelated editor event"
            );
            return;
        };
        shared.sessions.read().get(&id).cloned()
    };
    let Some(slot) = slot else { return };

    let mut record = slot.record.lock().await;

    let machine_event = match &event {
        EditorEvent::AdapterReady { .. } => SessionEvent::AdapterReady,
        EditorEvent::Stopped { .. } => SessionEvent::Stopped,
        EditorEvent::Continued { .. } => SessionEvent::Continued,
        EditorEvent::Exited { .. } => SessionEvent::Exited,
        EditorEvent::Terminated { .. } => SessionEvent::Terminated,
        EditorEvent::Output {
            output, ..
        } => {
            record.output.push_str(output);
            return;
        }
        EditorEvent::ConnectionLost => return,
    };

    match event_transition(record.state(), machine_event) {
        Some(next) => {
            match &event {
                EditorEvent::Stopped { reason, .. } => {
                    record.stop_reason = Some(*reason);
                    record.invalidate_snapshot();
                }
                EditorEvent::Continued { .. } => {
                    record.stop_reason = None;
                    record.invalidate_snapshot();
                }
                EditorEvent::Exited { exit_code, .. } => {
                    record.exit_code = *exit_code;
                }
                _ => {}
            }
            record.transition(next);
        }
        None => tracing::debug!(
            target: "holt.debug",
            session = %record.id,
            state = record.state().as_str(),
            event = ?machine_event,
            "dropping event not applicable in current state"
        ),
    }
}

async fn mark_all_lost(shared: &Shared) {
    let slots: Vec<Arc<SessionSlot>> = shared.sessions.read().values().cloned().collect();
    for slot in slots {
        let mut record = slot.record.lock().await;
        if !record.state().is_terminal() {
            record.invalidate_snapshot();
            record.transition(SessionState::Lost);
        }
    }
}
