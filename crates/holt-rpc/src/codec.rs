//! `Content-Length`-framed JSON messages.
//!
//! The wire encoding is deliberately opaque to the rest of the system: the
//! bridge extracts a message type, a correlation id, and a payload, and
//! nothing else. Three message shapes exist: requests (bridge → editor),
//! responses (editor → bridge, correlated by id), and events (editor →
//! bridge, uncorrelated push).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{RpcError, RpcResult};

/// Upper bound on a single frame body; checked before allocation.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    #[serde(rename = "type")]
    pub message_type: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub message_type: String,
    pub event: String,
    #[serde(default)]
    pub body: Value,
}

pub fn make_request(id: u64, method: impl Into<String>, params: Value) -> Request {
    Request {
        id,
        message_type: "request".to_string(),
        method: method.into(),
        params,
    }
}

pub fn make_response(id: u64, result: Value) -> Response {
    Response {
        id,
        message_type: "response".to_string(),
        result: Some(result),
        error: None,
    }
}

pub fn make_error_response(id: u64, message: impl Into<String>) -> Response {
    Response {
        id,
        message_type: "response".to_string(),
        result: None,
        error: Some(message.into()),
    }
}

pub fn make_event(event: impl Into<String>, body: Value) -> EventFrame {
    EventFrame {
        message_type: "event".to_string(),
        event: event.into(),
        body,
    }
}

/// A message pushed or returned by the editor.
#[derive(Debug)]
pub enum Incoming {
    Response(Response),
    Event(EventFrame),
}

pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
        }
    }

    /// Read one framed JSON value. `Ok(None)` signals a clean EOF between
    /// frames; a truncated frame is an error.
    pub async fn read_value(&mut self) -> RpcResult<Option<Value>> {
        let mut content_length: Option<usize> = None;
        let mut line = String::new();

        loop {
            line.clear();
            let n = self.reader.read_line(&mut line).await?;
            if n == 0 {
                return if content_length.is_none() {
                    Ok(None)
                } else {
                    Err(RpcError::Protocol("frame truncated at header".to_string()))
                };
            }

            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                break;
            }

            let Some((name, value)) = trimmed.split_once(':') else {
                continue;
            };

            if name.eq_ignore_ascii_case("Content-Length") {
                let value = value.trim();
                content_length = Some(value.parse::<usize>().map_err(|e| {
                    RpcError::Protocol(format!("invalid Content-Length {value:?}: {e}"))
                })?);
            }
        }

        let Some(len) = content_length else {
            return Err(RpcError::Protocol("missing Content-Length header".to_string()));
        };
        if len > MAX_FRAME_LEN {
            return Err(RpcError::Protocol(format!(
                "frame too large: {len} > {MAX_FRAME_LEN}"
            )));
        }

        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf).await?;
        Ok(Some(serde_json::from_slice::<Value>(&buf)?))
    }

    /// Read the next response or event (the bridge side of the connection).
    pub async fn read_incoming(&mut self) -> RpcResult<Option<Incoming>> {
        let Some(value) = self.read_value().await? else {
            return Ok(None);
        };

        match value.get("type").and_then(Value::as_str) {
            Some("response") => Ok(Some(Incoming::Response(serde_json::from_value(value)?))),
            Some("event") => Ok(Some(Incoming::Event(serde_json::from_value(value)?))),
            other => Err(RpcError::Protocol(format!(
                "unexpected message type {other:?}"
            ))),
        }
    }

    /// Read the next request (the editor/mock side of the connection).
    pub async fn read_request(&mut self) -> RpcResult<Option<Request>> {
        let Some(value) = self.read_value().await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value::<Request>(value)?))
    }
}

pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_value(&mut self, value: &Value) -> RpcResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.writer
            .write_all(format!("Content-Length: {}\r\n\r\n", bytes.len()).as_bytes())
            .await?;
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn write_request(&mut self, request: &Request) -> RpcResult<()> {
        self.write_value(&serde_json::to_value(request)?).await
    }

    pub async fn write_response(&mut self, response: &Response) -> RpcResult<()> {
        self.write_value(&serde_json::to_value(response)?).await
    }

    pub async fn write_event(&mut self, event: &EventFrame) -> RpcResult<()> {
        self.write_value(&serde_json::to_value(event)?).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn round_trips_requests_and_responses() {
        let (a, b) = tokio::io::duplex(4096);
        let mut writer = FrameWriter::new(a);
        let mut reader = FrameReader::new(b);

        writer
            .write_request(&make_request(7, "buffer/open", json!({ "path": "/tmp/x" })))
            .await
            .unwrap();

        let request = reader.read_request().await.unwrap().unwrap();
        assert_eq!(request.id, 7);
        assert_eq!(request.method, "buffer/open");
        assert_eq!(request.params["path"], "/tmp/x");
    }

    #[tokio::test]
    async fn distinguishes_responses_from_events() {
        let (a, b) = tokio::io::duplex(4096);
        let mut writer = FrameWriter::new(a);
        let mut reader = FrameReader::new(b);

        writer
            .write_response(&make_response(1, json!(42)))
            .await
            .unwrap();
        writer
            .write_event(&make_event("stopped", json!({ "session": 3 })))
            .await
            .unwrap();

        match reader.read_incoming().await.unwrap().unwrap() {
            Incoming::Response(resp) => assert_eq!(resp.result, Some(json!(42))),
            other => panic!("expected response, got {other:?}"),
        }
        match reader.read_incoming().await.unwrap().unwrap() {
            Incoming::Event(ev) => assert_eq!(ev.event, "stopped"),
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn clean_eof_is_not_an_error() {
        let (a, b) = tokio::io::duplex(64);
        drop(a);
        let mut reader = FrameReader::new(b);
        assert!(reader.read_incoming().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_frames_are_rejected_before_allocation() {
        let (a, b) = tokio::io::duplex(256);
        let mut writer = a;
        tokio::io::AsyncWriteExt::write_all(
            &mut writer,
            format!("Content-Length: {}\r\n\r\n", MAX_FRAME_LEN + 1).as_bytes(),
        )
        .await
        .unwrap();

        let mut reader = FrameReader::new(b);
        let err = reader.read_value().await.unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
    }
}
