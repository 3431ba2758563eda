//! Typed view of asynchronously pushed editor events.
//!
//! Events are loosely identified on the wire; this module extracts the fields
//! the orchestrator correlates on (event category, remote session id) and
//! leaves everything else behind. Unrecognized events parse to `None` and are
//! dropped with a diagnostic by the read loop; expected noise around session
//! startup and teardown, not an error.

use std::path::PathBuf;

use serde_json::Value;

use holt_core::RemoteSessionId;

use crate::codec::EventFrame;

/// Why a debug session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Entry,
    Breakpoint,
    Step,
    Exception,
    Pause,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::Entry => "entry",
            StopReason::Breakpoint => "breakpoint",
            StopReason::Step => "step",
            StopReason::Exception => "exception",
            StopReason::Pause => "pause",
        }
    }

    pub fn from_wire(reason: &str) -> Option<Self> {
        match reason {
            "entry" => Some(StopReason::Entry),
            "breakpoint" => Some(StopReason::Breakpoint),
            "step" => Some(StopReason::Step),
            "exception" => Some(StopReason::Exception),
            "pause" => Some(StopReason::Pause),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// The debug adapter for a launched session is initialized and running.
    AdapterReady {
        session: RemoteSessionId,
    },
    Stopped {
        session: RemoteSessionId,
        reason: StopReason,
        thread: Option<u64>,
        path: Option<PathBuf>,
        line: Option<u32>,
    },
    /// The debuggee resumed for a reason other than a local control call.
    Continued {
        session: RemoteSessionId,
    },
    Output {
        session: RemoteSessionId,
        category: Option<String>,
        output: String,
    },
    Exited {
        session: RemoteSessionId,
        exit_code: Option<i32>,
    },
    Terminated {
        session: RemoteSessionId,
    },
    /// Terminal sentinel: the connection dropped and the event sequence ends.
    /// A new subscription requires a new connection.
    ConnectionLost,
}

impl EditorEvent {
    /// The remote session this event belongs to, when it carries one.
    pub fn session(&self) -> Option<RemoteSessionId> {
        match self {
            EditorEvent::AdapterReady { session }
            | EditorEvent::Stopped { session, .. }
            | EditorEvent::Continued { session }
            | EditorEvent::Output { session, .. }
            | EditorEvent::Exited { session, .. }
            | EditorEvent::Terminated { session } => Some(*session),
            EditorEvent::ConnectionLost => None,
        }
    }

    pub fn from_wire(frame: &EventFrame) -> Option<EditorEvent> {
        let body = &frame.body;
        let session = RemoteSessionId(field_u64(body, "session")?);

        match frame.event.as_str() {
            "adapter-ready" => Some(EditorEvent::AdapterReady { session }),
            "stopped" => {
                let reason = body
                    .get("reason")
                    .and_then(Value::as_str)
                    .and_then(StopReason::from_wire)?;
                Some(EditorEvent::Stopped {
                    session,
                    reason,
                    thread: field_u64(body, "thread"),
                    path: body
                        .get("path")
                        .and_then(Value::as_str)
                        .map(PathBuf::from),
                    line: field_u64(body, "line").map(|l| l as u32),
                })
            }
            "continued" => Some(EditorEvent::Continued { session }),
            "output" => Some(EditorEvent::Output {
                session,
                category: body
                    .get("category")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                output: body.get("output").and_then(Value::as_str)?.to_string(),
            }),
            "exited" => Some(EditorEvent::Exited {
                session,
                exit_code: body
                    .get("exit_code")
                    .and_then(Value::as_i64)
                    .map(|c| c as i32),
            }),
            "terminated" => Some(EditorEvent::Terminated { session }),
            _ => None,
        }
    }
}

fn field_u64(body: &Value, name: &str) -> Option<u64> {
    body.get(name).and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::codec::make_event;

    use super::*;

    #[test]
    fn parses_stopped_events() {
        let frame = make_event(
            "stopped",
            json!({ "session": 4, "reason": "breakpoint", "thread": 1, "path": "/w/file.py", "line": 10 }),
        );

        let event = EditorEvent::from_wire(&frame).unwrap();
        assert_eq!(
            event,
            EditorEvent::Stopped {
                session: RemoteSessionId(4),
                reason: StopReason::Breakpoint,
                thread: Some(1),
                path: Some(PathBuf::from("/w/file.py")),
                line: Some(10),
            }
        );
        assert_eq!(event.session(), Some(RemoteSessionId(4)));
    }

    #[test]
    fn unknown_categories_are_dropped() {
        let frame = make_event("telemetry", json!({ "session": 1 }));
        assert!(EditorEvent::from_wire(&frame).is_none());

        let frame = make_event("stopped", json!({ "session": 1, "reason": "??" }));
        assert!(EditorEvent::from_wire(&frame).is_none());
    }

    #[test]
    fn events_without_a_session_are_dropped() {
        let frame = make_event("exited", json!({ "exit_code": 0 }));
        assert!(EditorEvent::from_wire(&frame).is_none());
    }
}
