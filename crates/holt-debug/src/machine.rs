//! The per-session lifecycle state machine.
//!
//! Transitions come from exactly two sources: caller control operations the
//! orchestrator validates first, and correlated editor events. Nothing is
//! ever inferred from timing. The functions here are pure so the whole
//! transition table can be tested by replay.

/// Lifecycle state of one debug session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created, not yet started.
    Uninitialized,
    /// Launch issued; waiting for the adapter-ready event.
    Launching,
    Running,
    Paused,
    Terminated,
    /// The editor connection dropped while the session was live.
    Lost,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Terminated | SessionState::Lost)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Launching => "launching",
            SessionState::Running => "running",
            SessionState::Paused => "paused",
            SessionState::Terminated => "terminated",
            SessionState::Lost => "lost",
        }
    }
}

/// Caller-issued execution control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Continue,
    StepOver,
    StepIn,
    StepOut,
    Pause,
}

impl ControlAction {
    /// Resume actions leave `Paused`; `Pause` is the one action valid while
    /// running.
    pub fn is_resume(self) -> bool {
        !matches!(self, ControlAction::Pause)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ControlAction::Continue => "continue",
            ControlAction::StepOver => "step_over",
            ControlAction::StepIn => "step_in",
            ControlAction::StepOut => "step_out",
            ControlAction::Pause => "pause",
        }
    }
}

pub fn control_allowed(state: SessionState, action: ControlAction) -> bool {
    match action {
        ControlAction::Pause => state == SessionState::Running,
        _ => state == SessionState::Paused,
    }
}

/// Editor events reduced to their state-machine meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    AdapterReady,
    Stopped,
    Continued,
    /// The debuggee process exited.
    Exited,
    /// The adapter tore the session down.
    Terminated,
    ConnectionLost,
}

/// The state `event` moves a session in `state` to, or `None` when the event
/// does not apply there. `None` is expected noise around startup and
/// teardown races and is dropped with a diagnostic, never escalated.
pub fn event_transition(state: SessionState, event: SessionEvent) -> Option<SessionState> {
    use SessionEvent as E;
    use SessionState as S;

    match event {
        E::AdapterReady => (state == S::Launching).then_some(S::Running),
        E::Stopped => (state == S::Running).then_some(S::Paused),
        E::Continued => (state == S::Paused).then_some(S::Running),
        E::Exited | E::Terminated => {
            matches!(state, S::Launching | S::Running | S::Paused).then_some(S::Terminated)
        }
        E::ConnectionLost => (!state.is_terminal()).then_some(S::Lost),
    }
}
