//! Stdio JSON-RPC Transport
//!
//! Line-delimited JSON-RPC 2.0 over stdin/stdout for local LLM drivers.
//! One request per line, one response per line; notifications (requests
//! without an id) get no response. The tool catalog returned by
//! `initialize` and `tools/list` is the same `catalog_listing()` the HTTP
//! facade serves.

use serde_json::{Value, json};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::ToolSurface;
use crate::utils::{ApiError, ErrorKind};

const PROTOCOL_VERSION: &str = "1.0";

/// Serve until stdin closes.
pub async fn run(surface: Arc<ToolSurface>) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = tokio::io::stdout();

    tracing::info!("stdio tool server ready");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(response) = handle_line(&surface, &line).await {
            let mut payload = response.to_string();
            payload.push('\n');
            stdout.write_all(payload.as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    tracing::info!("stdio tool server shutting down (stdin closed)");
    Ok(())
}

/// Handle one request line. `None` means no response is owed (notification).
pub async fn handle_line(surface: &ToolSurface, line: &str) -> Option<Value> {
    let request: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            return Some(error_response(
                Value::Null,
                -32700,
                &format!("parse error: {}", e),
                None,
            ));
        },
    };

    let id = request.get("id").cloned();
    let method = request.get("method").and_then(Value::as_str).unwrap_or_default();
    let params = request.get("params").cloned().unwrap_or_else(|| json!({}));

    let result = match method {
        "initialize" => Ok(json!({
            "protocol_version": PROTOCOL_VERSION,
            "server_info": {
                "name": "carbonatlas",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {"tools": {}},
            "tools": super::catalog_listing()["tools"],
        })),
        "tools/list" => Ok(super::catalog_listing()),
        "tools/call" => {
            let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
            let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            surface.call(name, &arguments).await
        },
        "ping" => Ok(json!({"ok": true})),
        other => Err(ApiError::invalid_argument(format!("unknown method '{}'", other))),
    };

    // Notifications never get a response, even on error.
    let id = id?;

    Some(match result {
        Ok(value) => json!({"jsonrpc": "2.0", "id": id, "result": value}),
        Err(e) => {
            let code = match e.kind {
                ErrorKind::Internal
                | ErrorKind::StorageTransient
                | ErrorKind::StoragePermanent
                | ErrorKind::PoolExhausted
                | ErrorKind::ConnectionUnhealthy => -32000,
                _ => -32602,
            };
            error_response(
                id,
                code,
                &e.public_detail(),
                Some(json!({
                    "kind": e.kind.as_str(),
                    "suggestions": e.suggestions,
                })),
            )
        },
    })
}

fn error_response(id: Value, code: i64, message: &str, data: Option<Value>) -> Value {
    let mut error = json!({"code": code, "message": message});
    if let Some(data) = data {
        error["data"] = data;
    }
    json!({"jsonrpc": "2.0", "id": id, "error": error})
}
