//! Newline-delimited JSON-RPC tool server.

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use drivetool_tools::ToolRegistry;

use crate::protocol::{
    error, success, JsonRpcRequest, JsonRpcResponse, ToolsCallRequest, ToolsCallResponse,
    ToolsListResponse, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR, PROTOCOL_VERSION,
};

/// Answer requests from `reader` until end of input.
///
/// Requests are handled one at a time, in arrival order.
pub async fn serve<R, W>(registry: &ToolRegistry, reader: R, mut writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    info!("Serving {} tools over stdio", registry.names().len());

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let Some(response) = handle_message(registry, trimmed).await? else {
            continue;
        };

        writer
            .write_all(serde_json::to_string(&response)?.as_bytes())
            .await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    debug!("Input closed");
    Ok(())
}

/// Handle one message; notifications produce no response.
pub async fn handle_message(
    registry: &ToolRegistry,
    line: &str,
) -> anyhow::Result<Option<JsonRpcResponse>> {
    let request = match serde_json::from_str::<JsonRpcRequest>(line) {
        Ok(request) => request,
        Err(e) => {
            return Ok(Some(error(
                Value::Null,
                PARSE_ERROR,
                format!("parse error: {}", e),
            )))
        }
    };

    let Some(id) = request.id else {
        debug!(method = %request.method, "Ignoring notification");
        return Ok(None);
    };

    let response = match request.method.as_str() {
        "initialize" => success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {"listChanged": false}},
                "serverInfo": {
                    "name": "drivetool",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        ),
        "tools/list" => {
            let result = ToolsListResponse {
                tools: registry.descriptors(),
            };
            success(id, serde_json::to_value(result)?)
        }
        "tools/call" => match serde_json::from_value::<ToolsCallRequest>(request.params) {
            Ok(call) => {
                let outcome = registry.call(&call.name, &call.arguments).await;
                success(id, serde_json::to_value(ToolsCallResponse::from(outcome))?)
            }
            Err(e) => error(id, INVALID_PARAMS, format!("invalid tools/call params: {}", e)),
        },
        "ping" => success(id, json!({})),
        other => error(id, METHOD_NOT_FOUND, format!("method not found: {}", other)),
    };

    Ok(Some(response))
}
