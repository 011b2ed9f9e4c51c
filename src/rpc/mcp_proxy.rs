//! External MCP tool proxy, grounded in
//! `examples/original_source/src/membria/mcp_discovery.py`: an allowlist of
//! external MCP servers, refreshed on a timer, whose tools are surfaced
//! namespaced as `ext.<server_id>.<tool_name>` and proxied over HTTP
//! JSON-RPC.

use crate::error::{Error, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ExternalServer {
    pub server_id: String,
    pub base_url: String,
    #[serde(default)]
    pub auth_header: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct AllowlistEntry {
    id: Option<String>,
    base_url: Option<String>,
    auth_header: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum AllowlistFile {
    Wrapped { servers: Vec<AllowlistEntry> },
    Bare(Vec<AllowlistEntry>),
}

struct RegistryState {
    servers: Vec<ExternalServer>,
    tools: HashMap<String, Value>,
    tool_to_server: HashMap<String, ExternalServer>,
    last_refresh: Option<Instant>,
}

pub struct ExternalToolRegistry {
    allowlist_path: PathBuf,
    timeout: Duration,
    refresh_interval: Duration,
    client: reqwest::Client,
    state: Mutex<RegistryState>,
}

impl ExternalToolRegistry {
    pub fn new(allowlist_path: impl Into<PathBuf>) -> Self {
        Self::with_timing(allowlist_path, 8, 600)
    }

    pub fn with_timing(allowlist_path: impl Into<PathBuf>, timeout_sec: u64, refresh_sec: u64) -> Self {
        Self {
            allowlist_path: allowlist_path.into(),
            timeout: Duration::from_secs(timeout_sec),
            refresh_interval: Duration::from_secs(refresh_sec),
            client: reqwest::Client::new(),
            state: Mutex::new(RegistryState { servers: Vec::new(), tools: HashMap::new(), tool_to_server: HashMap::new(), last_refresh: None }),
        }
    }

    fn load_allowlist(&self) -> Result<Vec<ExternalServer>> {
        if !self.allowlist_path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.allowlist_path)?;
        let parsed: AllowlistFile = serde_json::from_str(&raw).map_err(|e| Error::Configuration(format!("invalid MCP allowlist: {e}")))?;
        let entries = match parsed {
            AllowlistFile::Wrapped { servers } => servers,
            AllowlistFile::Bare(servers) => servers,
        };
        Ok(entries
            .into_iter()
            .filter_map(|e| {
                let server_id = e.id?;
                let base_url = e.base_url?;
                Some(ExternalServer { server_id, base_url, auth_header: e.auth_header })
            })
            .collect())
    }

    /// Re-fetches the allowlist and every server's tool list, unless the
    /// last refresh is still within `refresh_interval`.
    pub async fn refresh(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(last) = state.last_refresh {
            if last.elapsed() < self.refresh_interval {
                return Ok(());
            }
        }
        let servers = self.load_allowlist()?;
        let mut tools = HashMap::new();
        let mut tool_to_server = HashMap::new();
        for server in &servers {
            let fetched = match self.fetch_tools(server).await {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(server = %server.server_id, error = %e, "skipping external MCP server during refresh");
                    continue;
                }
            };
            for tool in fetched {
                let Some(name) = tool.get("name").and_then(|n| n.as_str()).map(String::from) else { continue };
                let ext_name = format!("ext.{}.{}", server.server_id, name);
                let mut tool_def = tool;
                tool_def["name"] = json!(ext_name);
                tools.insert(ext_name.clone(), tool_def);
                tool_to_server.insert(ext_name, server.clone());
            }
        }
        state.servers = servers;
        state.tools = tools;
        state.tool_to_server = tool_to_server;
        state.last_refresh = Some(Instant::now());
        Ok(())
    }

    pub async fn list_tools(&self) -> Vec<Value> {
        if let Err(e) = self.refresh().await {
            tracing::warn!(error = %e, "external MCP allowlist refresh failed");
        }
        self.state.lock().await.tools.values().cloned().collect()
    }

    /// Proxies a call to `ext.<server_id>.<tool_name>` by stripping the
    /// prefix and re-issuing `tools/call` against the owning server.
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<Value> {
        if let Err(e) = self.refresh().await {
            tracing::warn!(error = %e, "external MCP allowlist refresh failed");
        }
        let server = {
            let state = self.state.lock().await;
            state.tool_to_server.get(tool_name).cloned()
        };
        let Some(server) = server else {
            return Err(Error::NotFound(format!("external tool: {tool_name}")));
        };
        let raw_name = tool_name.splitn(3, '.').nth(2).unwrap_or(tool_name);
        let payload = json!({"jsonrpc": "2.0", "id": "ext-call", "method": "tools/call", "params": {"name": raw_name, "arguments": arguments}});
        let response = self.post(&server, payload).await?;
        Ok(response.get("result").cloned().unwrap_or(response))
    }

    async fn fetch_tools(&self, server: &ExternalServer) -> Result<Vec<Value>> {
        let payload = json!({"jsonrpc": "2.0", "id": "ext-tools", "method": "tools/list", "params": {}});
        let response = self.post(server, payload).await?;
        Ok(response.get("result").and_then(|r| r.get("tools")).and_then(|t| t.as_array()).cloned().unwrap_or_default())
    }

    /// Retried with the standard bounded backoff (spec §7) since every
    /// failure mode here — connection error, non-2xx, malformed body — is
    /// classified `TransientBackend` for an external server the allowlist
    /// doesn't control the availability of.
    async fn post(&self, server: &ExternalServer, payload: Value) -> Result<Value> {
        crate::retry::with_retry(crate::retry::RetryPolicy::default(), || async {
            let mut request = self.client.post(&server.base_url).timeout(self.timeout).json(&payload);
            if let Some(auth) = &server.auth_header {
                request = request.header("Authorization", auth);
            }
            let response = request.send().await.map_err(|e| Error::TransientBackend(format!("external MCP request failed: {e}")))?;
            if !response.status().is_success() {
                return Err(Error::TransientBackend(format!("external MCP server returned {}", response.status())));
            }
            response.json::<Value>().await.map_err(|e| Error::TransientBackend(format!("invalid JSON from external MCP server: {e}")))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_allowlist_yields_no_tools() {
        let registry = ExternalToolRegistry::new("/nonexistent/allowlist.json");
        assert!(registry.list_tools().await.is_empty());
    }

    #[tokio::test]
    async fn calling_unknown_external_tool_is_not_found() {
        let registry = ExternalToolRegistry::new("/nonexistent/allowlist.json");
        let err = registry.call_tool("ext.ghost.do_thing", json!({})).await;
        assert!(matches!(err, Err(Error::NotFound(_))));
    }

    #[test]
    fn allowlist_entries_missing_id_or_url_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("allowlist.json");
        std::fs::write(&path, r#"{"servers": [{"id": "a"}, {"id": "b", "base_url": "http://x"}]}"#).unwrap();
        let registry = ExternalToolRegistry::new(&path);
        let servers = registry.load_allowlist().unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].server_id, "b");
    }
}
