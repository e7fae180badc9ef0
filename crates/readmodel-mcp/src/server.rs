//! MCP stdio server: reads JSON-RPC lines from stdin, writes responses to stdout.

use std::sync::Arc;

use readmodel::ReadModel;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::McpError;
use crate::protocol::*;
use crate::tools;

pub struct McpServer {
    model: Arc<ReadModel>,
}

impl McpServer {
    pub fn new(model: Arc<ReadModel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Arc<ReadModel> {
        &self.model
    }

    /// Serve stdin/stdout until stdin closes.
    pub async fn run(&self) -> Result<(), McpError> {
        let reader = BufReader::new(tokio::io::stdin());
        self.serve(reader, tokio::io::stdout()).await
    }

    /// Serve newline-delimited JSON-RPC from `reader` until EOF.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<(), McpError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                break; // EOF
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let Some(response) = self.handle_message(trimmed).await else {
                continue;
            };
            let mut out = serde_json::to_string(&response)?;
            out.push('\n');
            writer.write_all(out.as_bytes()).await?;
            writer.flush().await?;
        }

        tracing::info!("Input closed, MCP server exiting");
        Ok(())
    }

    /// Handle one JSON-RPC message. Notifications produce no response.
    pub async fn handle_message(&self, msg: &str) -> Option<JsonRpcResponse> {
        let req: JsonRpcRequest = match serde_json::from_str(msg) {
            Ok(r) => r,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    None,
                    PARSE_ERROR,
                    format!("parse error: {e}"),
                ))
            }
        };

        if req.is_notification() {
            tracing::debug!(method = %req.method, "Notification received");
            return None;
        }

        let id = req.id.clone();
        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, &req.params).await,
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            _ => JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("method not found: {}", req.method),
            ),
        };
        Some(response)
    }

    fn handle_initialize(&self, id: Option<serde_json::Value>) -> JsonRpcResponse {
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: ServerCapabilities {
                tools: ToolCapability {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: SERVER_NAME.into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
        };
        JsonRpcResponse::success(id, serde_json::to_value(&result).unwrap_or_default())
    }

    fn handle_tools_list(&self, id: Option<serde_json::Value>) -> JsonRpcResponse {
        let tool_list = tools::list_tools();
        JsonRpcResponse::success(id, serde_json::json!({ "tools": tool_list }))
    }

    async fn handle_tools_call(
        &self,
        id: Option<serde_json::Value>,
        params: &serde_json::Value,
    ) -> JsonRpcResponse {
        let name = match params.get("name").and_then(|v| v.as_str()) {
            Some(n) => n,
            None => return JsonRpcResponse::error(id, INVALID_PARAMS, "missing tool name".into()),
        };

        let args = params
            .get("arguments")
            .cloned()
            .unwrap_or(serde_json::json!({}));

        tracing::debug!(tool = name, "Tool called");

        let result = match tools::call_tool(name, &args, &self.model).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "Tool failed");
                McpToolResult::failure(&tools::failure_body(&e))
            }
        };
        JsonRpcResponse::success(id, serde_json::to_value(&result).unwrap_or_default())
    }
}
