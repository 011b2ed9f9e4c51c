//! JSON-RPC 2.0 tool server, grounded in
//! `examples/original_source/tests/test_mcp_server.py` (the envelope
//! shape, the seven `membria.*` tool names, and the error-code
//! contract) and `start_mcp_server.py`. Transport is newline-delimited
//! stdio, matching the MCP stdio convention the source targets.

mod mcp_proxy;
mod tools;

pub use mcp_proxy::{ExternalServer, ExternalToolRegistry};
pub use tools::ToolContext;

use crate::error::Error;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

const PROTOCOL_VERSION: &str = "2024-11-25";

pub const TOOL_NAMES: &[&str] = &[
    "membria.capture_decision",
    "membria.record_outcome",
    "membria.get_calibration",
    "membria.get_decision_context",
    "membria.get_plan_context",
    "membria.validate_plan",
    "membria.record_plan",
];

#[derive(Debug, serde::Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

fn success_envelope(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn error_envelope(id: Value, code: i64, message: String) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

/// Wraps a tool's JSON result in the MCP `content` envelope
/// (`{"content": [{"type": "text", "text": "<json>"}]}`), matching the
/// shape `test_mcp_server.py` unwraps with `json.loads(result["content"][0]["text"])`.
fn tool_content(result: &Value) -> Value {
    json!({"content": [{"type": "text", "text": result.to_string()}]})
}

pub struct ToolServer {
    ctx: ToolContext,
    external: Option<ExternalToolRegistry>,
}

impl ToolServer {
    pub fn new(ctx: ToolContext, external: Option<ExternalToolRegistry>) -> Self {
        Self { ctx, external }
    }

    /// Handles one already-parsed JSON-RPC request object, returning the
    /// response envelope (never an `Err`: failures are encoded as
    /// JSON-RPC error objects).
    pub async fn handle_value(&self, request: Value) -> Value {
        let parsed: RpcRequest = match serde_json::from_value(request) {
            Ok(r) => r,
            Err(e) => return error_envelope(Value::Null, -32600, format!("invalid request: {e}")),
        };
        let id = parsed.id.clone();

        match parsed.method.as_str() {
            "initialize" => success_envelope(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": true},
                    "serverInfo": {"name": "membria", "version": env!("CARGO_PKG_VERSION")},
                }),
            ),
            "tools/list" => success_envelope(id, json!({"tools": self.list_tools().await})),
            "tools/call" => self.handle_tool_call(id, parsed.params).await,
            other => error_envelope(id, -32601, format!("unknown method: {other}")),
        }
    }

    async fn list_tools(&self) -> Vec<Value> {
        let mut tools: Vec<Value> = tools::tool_schemas();
        if let Some(external) = &self.external {
            tools.extend(external.list_tools().await);
        }
        tools
    }

    async fn handle_tool_call(&self, id: Value, params: Value) -> Value {
        let Some(name) = params.get("name").and_then(|n| n.as_str()) else {
            return error_envelope(id, -32602, "params.name is required".to_string());
        };
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        if let Some(ext_name) = name.strip_prefix("ext.").map(|_| name) {
            let Some(external) = &self.external else {
                return error_envelope(id, -32601, format!("unknown tool: {name}"));
            };
            return match external.call_tool(ext_name, arguments).await {
                Ok(result) => success_envelope(id, result),
                Err(e) => error_envelope(id, e.rpc_code(), e.to_string()),
            };
        }

        match tools::dispatch(&self.ctx, name, arguments).await {
            Ok(result) => success_envelope(id, tool_content(&result)),
            Err(Error::NotFound(msg)) if msg.starts_with("tool:") => error_envelope(id, -32601, format!("unknown tool: {name}")),
            Err(e) => error_envelope(id, e.rpc_code(), e.to_string()),
        }
    }

    /// Runs the newline-delimited JSON-RPC loop over `reader`/`writer`
    /// until the reader reaches EOF or `cancel` fires.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W, cancel: tokio_util::sync::CancellationToken) -> std::io::Result<()>
    where
        R: tokio::io::AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                line = lines.next_line() => {
                    let Some(line) = line? else { return Ok(()) };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let response = match serde_json::from_str::<Value>(&line) {
                        Ok(request) => self.handle_value(request).await,
                        Err(e) => error_envelope(Value::Null, -32700, format!("parse error: {e}")),
                    };
                    let mut out = response.to_string();
                    out.push('\n');
                    writer.write_all(out.as_bytes()).await?;
                    writer.flush().await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphStore, SqliteGraphStore};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn server() -> ToolServer {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::in_memory().unwrap());
        ToolServer::new(ToolContext::new(store), None)
    }

    #[tokio::test]
    async fn initialize_reports_protocol_version_and_tool_capability() {
        let server = server();
        let response = server
            .handle_value(json!({"jsonrpc": "2.0", "id": "init-1", "method": "initialize", "params": {}}))
            .await;
        assert_eq!(response["id"], "init-1");
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(response["result"]["capabilities"]["tools"], true);
    }

    #[tokio::test]
    async fn capture_decision_returns_pending_decision_id() {
        let server = server();
        let response = server
            .handle_value(json!({
                "jsonrpc": "2.0",
                "id": "cap-1",
                "method": "tools/call",
                "params": {
                    "name": "membria.capture_decision",
                    "arguments": {
                        "statement": "Use PostgreSQL for user database",
                        "alternatives": ["MongoDB", "SQLite"],
                        "confidence": 0.82,
                        "module": "database",
                    }
                }
            }))
            .await;
        assert!(response.get("error").is_none());
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        let content: Value = serde_json::from_str(text).unwrap();
        assert!(content["decision_id"].as_str().is_some());
        assert_eq!(content["status"], "pending");
    }

    #[tokio::test]
    async fn capture_decision_missing_statement_is_invalid_params() {
        let server = server();
        let response = server
            .handle_value(json!({
                "jsonrpc": "2.0",
                "id": "cap-2",
                "method": "tools/call",
                "params": {"name": "membria.capture_decision", "arguments": {"alternatives": ["Alt1"], "confidence": 0.75}}
            }))
            .await;
        assert_eq!(response["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn unknown_tool_is_method_not_found() {
        let server = server();
        let response = server
            .handle_value(json!({
                "jsonrpc": "2.0",
                "id": "unk-1",
                "method": "tools/call",
                "params": {"name": "membria.unknown_tool", "arguments": {}}
            }))
            .await;
        assert_eq!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn record_outcome_round_trips_through_capture_decision() {
        let server = server();
        let capture = server
            .handle_value(json!({
                "jsonrpc": "2.0", "id": "c1", "method": "tools/call",
                "params": {"name": "membria.capture_decision", "arguments": {"statement": "use X", "confidence": 0.8, "module": "backend"}}
            }))
            .await;
        let text = capture["result"]["content"][0]["text"].as_str().unwrap();
        let decision_id = serde_json::from_str::<Value>(text).unwrap()["decision_id"].as_str().unwrap().to_string();

        let outcome = server
            .handle_value(json!({
                "jsonrpc": "2.0", "id": "o1", "method": "tools/call",
                "params": {"name": "membria.record_outcome", "arguments": {"decision_id": decision_id, "final_status": "success", "final_score": 0.9}}
            }))
            .await;
        let text = outcome["result"]["content"][0]["text"].as_str().unwrap();
        let content: Value = serde_json::from_str(text).unwrap();
        assert_eq!(content["final_status"], "success");
    }

    /// Spec §8 B3: `validate_plan` with zero steps returns no warnings and
    /// `can_proceed = true`.
    #[tokio::test]
    async fn validate_plan_with_zero_steps_can_proceed() {
        let server = server();
        let response = server
            .handle_value(json!({
                "jsonrpc": "2.0", "id": "v1", "method": "tools/call",
                "params": {"name": "membria.validate_plan", "arguments": {"steps": [], "domain": "database"}}
            }))
            .await;
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        let content: Value = serde_json::from_str(text).unwrap();
        assert_eq!(content["total_steps"], 0);
        assert_eq!(content["warnings"], json!([]));
        assert_eq!(content["can_proceed"], true);
    }

    #[tokio::test]
    async fn record_plan_creates_one_decision_per_step_and_an_engram() {
        let server = server();
        let response = server
            .handle_value(json!({
                "jsonrpc": "2.0", "id": "p1", "method": "tools/call",
                "params": {
                    "name": "membria.record_plan",
                    "arguments": {
                        "plan_steps": ["add index", "write migration"],
                        "domain": "database",
                        "plan_confidence": 0.7,
                    }
                }
            }))
            .await;
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        let content: Value = serde_json::from_str(text).unwrap();
        assert_eq!(content["status"], "recorded");
        assert!(content["engram_id"].as_str().unwrap().starts_with("eng_"));
        assert_eq!(content["decisions_recorded"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn get_plan_context_surveys_domain_with_no_history() {
        let server = server();
        let response = server
            .handle_value(json!({
                "jsonrpc": "2.0", "id": "pc1", "method": "tools/call",
                "params": {"name": "membria.get_plan_context", "arguments": {"domain": "database"}}
            }))
            .await;
        assert!(response.get("error").is_none());
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        let content: Value = serde_json::from_str(text).unwrap();
        assert_eq!(content["domain"], "database");
        assert_eq!(content["calibration"]["status"], "no_data");
        assert_eq!(content["past_plans"], json!([]));
    }

    /// Spec §8 B4: any `tools/call` to an unknown tool returns `-32601`,
    /// exercised through the external-proxy branch as well (no registry
    /// configured, so `ext.*` names are also unknown).
    #[tokio::test]
    async fn unknown_external_tool_without_registry_is_method_not_found() {
        let server = server();
        let response = server
            .handle_value(json!({
                "jsonrpc": "2.0", "id": "ext-1", "method": "tools/call",
                "params": {"name": "ext.github.search", "arguments": {}}
            }))
            .await;
        assert_eq!(response["error"]["code"], -32601);
    }
}
