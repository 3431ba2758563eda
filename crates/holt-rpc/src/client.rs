use std::collections::HashMap;
use std::path::Path;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use holt_core::{BufferId, Position, RemoteSessionId};
use holt_paths::PathResolver;

use crate::codec::{make_request, FrameReader, FrameWriter, Incoming};
use crate::events::EditorEvent;
use crate::types::{
    CompletionItem, DocumentSymbol, EvaluateOutcome, FileDiagnostic, FileLocation, LaunchRequest,
    LspStatus, RemoteBreakpoint, SearchMatch, StackFrame, VarScope, Variable,
};
use crate::{RpcError, RpcResult};

#[derive(Debug, Clone)]
pub struct EditorClientConfig {
    /// Default deadline for a single remote call.
    pub call_timeout: Duration,
    pub event_channel_size: usize,
}

impl Default for EditorClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            event_channel_size: 128,
        }
    }
}

type PendingReply = oneshot::Sender<RpcResult<Value>>;
type BoxedWriter = FrameWriter<Box<dyn AsyncWrite + Send + Unpin>>;

/// Handle to the persistent editor connection.
///
/// Cheap to clone; all clones share the one connection. Many calls may be
/// outstanding at once: the connection serializes only wire framing, never
/// whole calls, so one slow remote call never starves another caller.
#[derive(Clone)]
pub struct EditorClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    writer: Mutex<BoxedWriter>,
    pending: Mutex<HashMap<u64, PendingReply>>,
    next_id: AtomicU64,
    events: broadcast::Sender<EditorEvent>,
    shutdown: CancellationToken,
    resolver: PathResolver,
    config: EditorClientConfig,
}

impl EditorClient {
    /// Wrap an established byte stream to the editor.
    ///
    /// Spawns the read loop that correlates responses and forwards events;
    /// the loop runs until EOF, a read error, or [`EditorClient::shutdown`].
    pub fn connect_stream<S>(stream: S, resolver: PathResolver, config: EditorClientConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (events, _) = broadcast::channel(config.event_channel_size);

        let inner = Arc::new(ClientInner {
            writer: Mutex::new(FrameWriter::new(
                Box::new(write_half) as Box<dyn AsyncWrite + Send + Unpin>
            )),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            events,
            shutdown: CancellationToken::new(),
            resolver,
            config,
        });

        tokio::spawn(read_loop(FrameReader::new(read_half), inner.clone()));

        Self { inner }
    }

    /// Connect to an editor listening on a Unix socket.
    #[cfg(unix)]
    pub async fn connect_unix(
        socket_path: impl AsRef<Path>,
        resolver: PathResolver,
        config: EditorClientConfig,
    ) -> RpcResult<Self> {
        let stream = tokio::net::UnixStream::connect(socket_path.as_ref()).await?;
        Ok(Self::connect_stream(stream, resolver, config))
    }

    /// Connect to an editor listening on a TCP address.
    pub async fn connect_tcp(
        addr: std::net::SocketAddr,
        resolver: PathResolver,
        config: EditorClientConfig,
    ) -> RpcResult<Self> {
        let stream = tokio::net::TcpStream::connect(addr).await?;
        let _ = stream.set_nodelay(true);
        Ok(Self::connect_stream(stream, resolver, config))
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.inner.resolver
    }

    /// Subscribe to editor events, delivered in the order the editor emitted
    /// them. The sequence is infinite until the connection drops, at which
    /// point a single [`EditorEvent::ConnectionLost`] sentinel ends it; the
    /// subscription is not restartable.
    pub fn subscribe(&self) -> broadcast::Receiver<EditorEvent> {
        self.inner.events.subscribe()
    }

    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Cancelled when the connection is torn down, explicitly or by the peer.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Issue one remote call with the default deadline.
    pub async fn call(&self, method: &str, params: Value) -> RpcResult<Value> {
        self.call_with_timeout(method, params, self.inner.config.call_timeout)
            .await
    }

    /// Issue one remote call, suspending the caller until the correlated
    /// response arrives, the deadline elapses, or the connection drops.
    /// A timeout fails only this call; other in-flight calls are unaffected.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> RpcResult<Value> {
        if self.inner.shutdown.is_cancelled() {
            return Err(RpcError::ConnectionLost);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.inner.pending.lock().await;
            pending.insert(id, tx);
        }

        let request = make_request(id, method, params);
        {
            let mut writer = self.inner.writer.lock().await;
            if let Err(err) = writer.write_request(&request).await {
                self.remove_pending(id).await;
                return Err(err);
            }
        }

        tokio::select! {
            _ = self.inner.shutdown.cancelled() => {
                self.remove_pending(id).await;
                Err(RpcError::ConnectionLost)
            }
            res = tokio::time::timeout(timeout, rx) => match res {
                Ok(Ok(reply)) => reply,
                Ok(Err(_closed)) => Err(RpcError::ConnectionLost),
                Err(_elapsed) => {
                    self.remove_pending(id).await;
                    Err(RpcError::RemoteTimeout {
                        method: method.to_string(),
                        timeout,
                    })
                }
            }
        }
    }

    async fn remove_pending(&self, id: u64) {
        let mut pending = self.inner.pending.lock().await;
        pending.remove(&id);
    }

    // ---- buffers -----------------------------------------------------------

    pub async fn open_buffer(&self, path: impl AsRef<Path>) -> RpcResult<BufferId> {
        let path = self.inner.resolver.canonicalize(path)?;
        let result = self.call("buffer/open", json!({ "path": path })).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Read the buffer's lines as the editor currently holds them.
    pub async fn read_lines(&self, buffer: BufferId) -> RpcResult<Vec<String>> {
        let result = self.call("buffer/read", json!({ "buffer": buffer })).await?;
        Ok(serde_json::from_value(result)?)
    }

    // ---- language intelligence --------------------------------------------

    pub async fn lsp_status(&self, buffer: BufferId) -> RpcResult<LspStatus> {
        let result = self.call("lsp/status", json!({ "buffer": buffer })).await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn lsp_definition(
        &self,
        buffer: BufferId,
        position: Position,
    ) -> RpcResult<Vec<FileLocation>> {
        let result = self
            .call("lsp/definition", position_params(buffer, position))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn lsp_references(
        &self,
        buffer: BufferId,
        position: Position,
        include_declaration: bool,
    ) -> RpcResult<Vec<FileLocation>> {
        let result = self
            .call(
                "lsp/references",
                json!({
                    "buffer": buffer,
                    "line": position.line,
                    "column": position.column,
                    "include_declaration": include_declaration,
                }),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn lsp_hover(
        &self,
        buffer: BufferId,
        position: Position,
    ) -> RpcResult<Option<String>> {
        let result = self
            .call("lsp/hover", position_params(buffer, position))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn lsp_completion(
        &self,
        buffer: BufferId,
        position: Position,
    ) -> RpcResult<Vec<CompletionItem>> {
        let result = self
            .call("lsp/completion", position_params(buffer, position))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn lsp_document_symbols(&self, buffer: BufferId) -> RpcResult<Vec<DocumentSymbol>> {
        let result = self
            .call("lsp/documentSymbols", json!({ "buffer": buffer }))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn diagnostics(&self, buffer: BufferId) -> RpcResult<Vec<FileDiagnostic>> {
        let result = self
            .call("lsp/diagnostics", json!({ "buffer": buffer }))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    // ---- analysis ----------------------------------------------------------

    pub async fn imports(&self, buffer: BufferId) -> RpcResult<Vec<String>> {
        let result = self
            .call("analysis/imports", json!({ "buffer": buffer }))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn workspace_search(
        &self,
        pattern: &str,
        max_results: usize,
    ) -> RpcResult<Vec<SearchMatch>> {
        let result = self
            .call(
                "workspace/search",
                json!({ "pattern": pattern, "max_results": max_results }),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    // ---- debugging ---------------------------------------------------------

    pub async fn debug_launch(&self, request: &LaunchRequest) -> RpcResult<RemoteSessionId> {
        let mut request = request.clone();
        if let Some(path) = request.path.take() {
            request.path = Some(self.inner.resolver.canonicalize(path)?);
        }
        if let Some(cwd) = request.cwd.take() {
            request.cwd = Some(self.inner.resolver.canonicalize(cwd)?);
        }
        let result = self
            .call("debug/launch", serde_json::to_value(&request)?)
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn debug_set_breakpoint(
        &self,
        session: RemoteSessionId,
        path: impl AsRef<Path>,
        line: u32,
        condition: Option<&str>,
    ) -> RpcResult<RemoteBreakpoint> {
        let path = self.inner.resolver.canonicalize(path)?;
        let result = self
            .call(
                "debug/setBreakpoint",
                json!({ "session": session, "path": path, "line": line, "condition": condition }),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn debug_clear_breakpoint(
        &self,
        session: RemoteSessionId,
        breakpoint: u64,
    ) -> RpcResult<()> {
        self.call(
            "debug/clearBreakpoint",
            json!({ "session": session, "id": breakpoint }),
        )
        .await?;
        Ok(())
    }

    pub async fn debug_breakpoints(
        &self,
        session: RemoteSessionId,
    ) -> RpcResult<Vec<RemoteBreakpoint>> {
        let result = self
            .call("debug/breakpoints", json!({ "session": session }))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn debug_continue(&self, session: RemoteSessionId) -> RpcResult<()> {
        self.session_command("debug/continue", session).await
    }

    pub async fn debug_step_over(&self, session: RemoteSessionId) -> RpcResult<()> {
        self.session_command("debug/next", session).await
    }

    pub async fn debug_step_in(&self, session: RemoteSessionId) -> RpcResult<()> {
        self.session_command("debug/stepIn", session).await
    }

    pub async fn debug_step_out(&self, session: RemoteSessionId) -> RpcResult<()> {
        self.session_command("debug/stepOut", session).await
    }

    pub async fn debug_pause(&self, session: RemoteSessionId) -> RpcResult<()> {
        self.session_command("debug/pause", session).await
    }

    pub async fn debug_terminate(&self, session: RemoteSessionId) -> RpcResult<()> {
        self.session_command("debug/terminate", session).await
    }

    pub async fn debug_stack_trace(&self, session: RemoteSessionId) -> RpcResult<Vec<StackFrame>> {
        let result = self
            .call("debug/stackTrace", json!({ "session": session }))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn debug_scopes(
        &self,
        session: RemoteSessionId,
        frame: u64,
    ) -> RpcResult<Vec<VarScope>> {
        let result = self
            .call("debug/scopes", json!({ "session": session, "frame": frame }))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn debug_variables(
        &self,
        session: RemoteSessionId,
        variables_reference: u64,
    ) -> RpcResult<Vec<Variable>> {
        let result = self
            .call(
                "debug/variables",
                json!({ "session": session, "variables_reference": variables_reference }),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn debug_evaluate(
        &self,
        session: RemoteSessionId,
        frame: Option<u64>,
        expression: &str,
    ) -> RpcResult<EvaluateOutcome> {
        let result = self
            .call(
                "debug/evaluate",
                json!({ "session": session, "frame": frame, "expression": expression }),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn session_command(&self, method: &str, session: RemoteSessionId) -> RpcResult<()> {
        self.call(method, json!({ "session": session })).await?;
        Ok(())
    }
}

fn position_params(buffer: BufferId, position: Position) -> Value {
    json!({ "buffer": buffer, "line": position.line, "column": position.column })
}

async fn read_loop<R>(mut reader: FrameReader<R>, inner: Arc<ClientInner>)
where
    R: AsyncRead + Send + Unpin,
{
    loop {
        let incoming = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            res = reader.read_incoming() => res,
        };

        match incoming {
            Ok(Some(Incoming::Response(response))) => {
                let tx = {
                    let mut pending = inner.pending.lock().await;
                    pending.remove(&response.id)
                };
                match tx {
                    Some(tx) => {
                        let reply = match response.error {
                            Some(message) => Err(RpcError::Remote(message)),
                            None => Ok(response.result.unwrap_or(Value::Null)),
                        };
                        let _ = tx.send(reply);
                    }
                    // Timed-out or cancelled call; the reply has nowhere to go.
                    None => tracing::debug!(
                        target: "holt.rpc",
                        id = response.id,
                        "dropping reply with no pending call"
                    ),
                }
            }
            Ok(Some(Incoming::Event(frame))) => match EditorEvent::from_wire(&frame) {
                Some(event) => {
                    let _ = inner.events.send(event);
                }
                None => tracing::debug!(
                    target: "holt.rpc",
                    event = %frame.event,
                    "dropping unrecognized editor event"
                ),
            },
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(target: "holt.rpc", error = %err, "editor connection failed");
                break;
            }
        }
    }

    // Teardown: every outstanding call observes the failure exactly once,
    // then subscribers get the terminal sentinel and the stream ends.
    inner.shutdown.cancel();
    let pending = {
        let mut pending = inner.pending.lock().await;
        std::mem::take(&mut *pending)
    };
    for (_id, tx) in pending {
        let _ = tx.send(Err(RpcError::ConnectionLost));
    }
    let _ = inner.events.send(EditorEvent::ConnectionLost);
}
