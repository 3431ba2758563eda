//! A scriptable in-process editor for tests.
//!
//! Speaks the framed protocol over a duplex pipe, records every call it
//! receives, and lets tests attach per-method handlers that return a result
//! and optionally push follow-up events (e.g. `debug/launch` replying with a
//! session id and then emitting `adapter-ready`). Intentionally dumb: all
//! session semantics live in the tests that script it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use holt_paths::PathResolver;

use crate::client::{EditorClient, EditorClientConfig};
use crate::codec::{
    make_error_response, make_event, make_response, EventFrame, FrameReader, FrameWriter, Request,
    Response,
};

/// What a handler tells the mock to send back.
pub struct MockReply {
    result: Result<Value, String>,
    events: Vec<EventFrame>,
    delay: Option<Duration>,
}

impl MockReply {
    pub fn ok(result: Value) -> Self {
        Self {
            result: Ok(result),
            events: Vec::new(),
            delay: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            result: Err(message.into()),
            events: Vec::new(),
            delay: None,
        }
    }

    /// Push an event after the response is written.
    pub fn with_event(mut self, event: impl Into<String>, body: Value) -> Self {
        self.events.push(make_event(event, body));
        self
    }

    /// Delay the response (and its follow-up events) without blocking other
    /// calls.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl From<Value> for MockReply {
    fn from(value: Value) -> Self {
        MockReply::ok(value)
    }
}

type Handler = Box<dyn FnMut(&Value) -> MockReply + Send>;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub params: Value,
}

#[derive(Default)]
struct MockState {
    handlers: Mutex<HashMap<String, Handler>>,
    calls: Mutex<Vec<RecordedCall>>,
}

enum Outbound {
    Response(Response),
    Event(EventFrame),
}

/// Handle to a spawned mock editor.
pub struct MockEditor {
    state: Arc<MockState>,
    outbound: mpsc::UnboundedSender<Outbound>,
    shutdown: CancellationToken,
}

impl MockEditor {
    /// Spawn the mock and a client connected to it over an in-memory pipe.
    pub fn spawn(resolver: PathResolver, config: EditorClientConfig) -> (EditorClient, MockEditor) {
        let (client_io, server_io) = tokio::io::duplex(1024 * 1024);
        let client = EditorClient::connect_stream(client_io, resolver, config);

        let (read_half, write_half) = tokio::io::split(server_io);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let state = Arc::new(MockState::default());
        let shutdown = CancellationToken::new();

        tokio::spawn(write_loop(
            FrameWriter::new(write_half),
            outbound_rx,
            shutdown.clone(),
        ));
        tokio::spawn(serve_loop(
            FrameReader::new(read_half),
            state.clone(),
            outbound_tx.clone(),
            shutdown.clone(),
        ));

        let mock = MockEditor {
            state,
            outbound: outbound_tx,
            shutdown,
        };
        (client, mock)
    }

    /// Install a handler for `method`. The last handler installed for a
    /// method wins.
    pub fn handle(
        &self,
        method: impl Into<String>,
        handler: impl FnMut(&Value) -> MockReply + Send + 'static,
    ) {
        self.state
            .handlers
            .lock()
            .insert(method.into(), Box::new(handler));
    }

    /// Respond to `method` with a fixed result.
    pub fn respond(&self, method: impl Into<String>, result: Value) {
        self.handle(method, move |_| MockReply::ok(result.clone()));
    }

    pub fn respond_error(&self, method: impl Into<String>, message: impl Into<String>) {
        let message = message.into();
        self.handle(method, move |_| MockReply::error(message.clone()));
    }

    /// Push an unsolicited event to the client.
    pub fn push_event(&self, event: impl Into<String>, body: Value) {
        let _ = self.outbound.send(Outbound::Event(make_event(event, body)));
    }

    /// Everything the client has called so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().clone()
    }

    pub fn calls_for(&self, method: &str) -> usize {
        self.state
            .calls
            .lock()
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    /// Drop the connection, simulating an editor crash. The client observes
    /// EOF and fails everything outstanding with `ConnectionLost`.
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

async fn serve_loop<R>(
    mut reader: FrameReader<R>,
    state: Arc<MockState>,
    outbound: mpsc::UnboundedSender<Outbound>,
    shutdown: CancellationToken,
) where
    R: tokio::io::AsyncRead + Send + Unpin,
{
    loop {
        let request = tokio::select! {
            _ = shutdown.cancelled() => break,
            res = reader.read_request() => res,
        };
        let Ok(Some(request)) = request else { break };

        state.calls.lock().push(RecordedCall {
            method: request.method.clone(),
            params: request.params.clone(),
        });

        let reply = {
            let mut handlers = state.handlers.lock();
            match handlers.get_mut(&request.method) {
                Some(handler) => handler(&request.params),
                None => MockReply::error(format!("no handler for {}", request.method)),
            }
        };

        dispatch_reply(&request, reply, &outbound);
    }
    shutdown.cancel();
}

fn dispatch_reply(request: &Request, reply: MockReply, outbound: &mpsc::UnboundedSender<Outbound>) {
    let response = match reply.result {
        Ok(value) => make_response(request.id, value),
        Err(message) => make_error_response(request.id, message),
    };

    let outbound = outbound.clone();
    let send = move || {
        let _ = outbound.send(Outbound::Response(response));
        for event in reply.events {
            let _ = outbound.send(Outbound::Event(event));
        }
    };

    match reply.delay {
        // Delayed replies must not hold up other calls on the connection.
        Some(delay) => {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                send();
            });
        }
        None => send(),
    }
}

async fn write_loop<W>(
    mut writer: FrameWriter<W>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    shutdown: CancellationToken,
) where
    W: tokio::io::AsyncWrite + Send + Unpin,
{
    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = outbound.recv() => msg,
        };
        let Some(message) = message else { break };

        let written = match message {
            Outbound::Response(response) => writer.write_response(&response).await,
            Outbound::Event(event) => writer.write_event(&event).await,
        };
        if written.is_err() {
            break;
        }
    }
}
