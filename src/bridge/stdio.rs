//! JSON-lines transport for the bridge.
//!
//! The UI process writes one request per line:
//!
//! ```json
//! {"id": 1, "command": "check", "args": null}
//! ```
//!
//! and reads responses and events, one per line:
//!
//! ```json
//! {"id": 1, "ok": true, "result": {"version": "1.3.0", "hasUpdate": true}}
//! {"id": 2, "ok": false, "error": {"code": "busy", "message": "An update session is already in progress"}}
//! {"event": "download-progress", "payload": {"percent": 35, "transferred": 35, "total": 100, "bytesPerSecond": 0}}
//! ```
//!
//! Requests run concurrently so the UI can, for example, read the
//! configuration while a download is in flight. All output goes through a
//! single writer task, so lines never interleave.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{NotificationBridge, UiSurface};
use crate::core::UpdateError;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    command: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct Response {
    id: Value,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

impl Response {
    fn from_result(id: Value, result: Result<Value, UpdateError>) -> Self {
        match result {
            Ok(value) => Self {
                id,
                ok: true,
                result: Some(value),
                error: None,
            },
            Err(e) => Self {
                id,
                ok: false,
                result: None,
                error: Some(ErrorBody {
                    code: e.code(),
                    message: e.to_string(),
                }),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct EventLine<'a> {
    event: &'a str,
    payload: Value,
}

/// [`UiSurface`] writing event lines to the shared output.
pub struct StdioSurface {
    lines: mpsc::UnboundedSender<String>,
}

impl StdioSurface {
    pub fn new(lines: mpsc::UnboundedSender<String>) -> Self {
        Self {
            lines,
        }
    }
}

impl UiSurface for StdioSurface {
    fn send(&self, event: &str, payload: Value) {
        match serde_json::to_string(&EventLine {
            event,
            payload,
        }) {
            Ok(line) => {
                let _ = self.lines.send(line);
            }
            Err(e) => warn!("Failed to encode '{}' event: {}", event, e),
        }
    }
}

fn encode(response: &Response) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        format!(
            r#"{{"id":null,"ok":false,"error":{{"code":"other","message":"failed to encode response: {e}"}}}}"#
        )
    })
}

/// Serve bridge requests from `input` until it closes.
///
/// Waits for in-flight requests before returning.
pub async fn serve<R, W>(bridge: NotificationBridge, input: R, output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut output = output;
        while let Some(line) = line_rx.recv().await {
            output.write_all(line.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    });

    bridge.attach_surface(Arc::new(StdioSurface::new(line_tx.clone()))).await;
    info!("Bridge listening on stdio");

    let mut requests = JoinSet::new();
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await.context("Failed to read request")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                debug!("Rejecting malformed request: {}", e);
                let error = UpdateError::InvalidArguments {
                    command: "request".to_string(),
                    reason: e.to_string(),
                };
                let _ = line_tx.send(encode(&Response::from_result(Value::Null, Err(error))));
                continue;
            }
        };

        let bridge = bridge.clone();
        let line_tx = line_tx.clone();
        requests.spawn(async move {
            let result = bridge.invoke(&request.command, request.args).await;
            let _ = line_tx.send(encode(&Response::from_result(request.id, result)));
        });
    }

    while let Some(joined) = requests.join_next().await {
        if let Err(e) = joined {
            warn!("Request task failed: {}", e);
        }
    }

    bridge.detach_surface().await;
    drop(line_tx);
    writer.await.context("Bridge writer task failed")?.context("Failed to write response")?;
    info!("Bridge input closed");
    Ok(())
}
