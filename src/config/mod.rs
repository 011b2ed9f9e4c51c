//! Flat dotted-key configuration store.
//!
//! Backed by a typed struct-of-structs (mirroring the original
//! `MembriaConfig` dataclass) loaded from a single TOML file, with
//! `get`/`set` dotted-path accessors layered on top so callers never need
//! to know the concrete shape of a section they don't own.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub port: u16,
    pub auto_start: bool,
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: 3117,
            auto_start: true,
            log_level: "info".into(),
        }
    }
}

/// Graph backend connection settings. Key names are kept as `falkordb.*`
/// for compatibility with the recognized-options table even though the
/// shipped backend is the embedded SQLite graph store: the persisted-state
/// layout is logical, the backend is an implementation choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphBackendConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub path: String,
}

impl Default for GraphBackendConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 6379,
            password: None,
            path: "membria.sqlite3".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub default_ttl_days: i64,
    pub half_life_days: i64,
    pub allow_hard_delete: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            default_ttl_days: 365,
            half_life_days: 180,
            allow_hard_delete: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub resonance_threshold: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            resonance_threshold: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngramsConfig {
    pub enabled: bool,
    pub branch: String,
}

impl Default for EngramsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            branch: "membria/engrams/v1".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpDiscoveryConfig {
    pub enabled: bool,
    pub allowlist_path: String,
    pub timeout_sec: u64,
    pub refresh_sec: u64,
}

impl Default for McpDiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowlist_path: "mcp_allowlist.json".into(),
            timeout_sec: 8,
            refresh_sec: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub port: u16,
    pub github_secret: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            port: 3118,
            github_secret: None,
        }
    }
}

/// Top-level configuration. Every section has a `Default`, so a caller can
/// start from `Config::default()` and layer a TOML file and CLI overrides
/// on top.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub tenant_id: String,
    pub team_id: String,
    pub project_id: String,
    pub daemon: DaemonConfig,
    pub falkordb: GraphBackendConfig,
    pub memory: MemoryConfig,
    pub safety: SafetyConfig,
    pub engrams: EngramsConfig,
    pub mcp_discovery: McpDiscoveryConfig,
    pub webhook: WebhookConfig,
    pub context_plugins: Vec<String>,
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any key the file omits.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&text)?;
        Ok(cfg)
    }

    /// Save configuration back to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Get a value by dotted path (e.g. `"daemon.port"`), as a
    /// [`toml::Value`]. Returns `None` if the path doesn't resolve to a
    /// known field.
    pub fn get(&self, key: &str) -> Option<toml::Value> {
        let whole = toml::Value::try_from(self).ok()?;
        dotted_get(&whole, key)
    }

    /// Set a value by dotted path. Fails with [`Error::InvalidArgument`] if
    /// the resulting document no longer deserializes into `Config`.
    pub fn set(&mut self, key: &str, value: toml::Value) -> Result<()> {
        let mut whole = toml::Value::try_from(&*self)
            .map_err(|e| Error::Configuration(e.to_string()))?;
        dotted_set(&mut whole, key, value)?;
        *self = whole
            .try_into()
            .map_err(|e: toml::de::Error| Error::InvalidArgument(e.to_string()))?;
        Ok(())
    }
}

fn dotted_get(root: &toml::Value, key: &str) -> Option<toml::Value> {
    let mut cur = root;
    for part in key.split('.') {
        cur = cur.as_table()?.get(part)?;
    }
    Some(cur.clone())
}

fn dotted_set(root: &mut toml::Value, key: &str, value: toml::Value) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();
    let Some((last, prefix)) = parts.split_last() else {
        return Err(Error::InvalidArgument("empty config key".into()));
    };
    let mut cur = root;
    for part in prefix {
        if !cur.is_table() {
            return Err(Error::InvalidArgument(format!(
                "config key '{key}' traverses a non-table segment at '{part}'"
            )));
        }
        cur = cur
            .as_table_mut()
            .unwrap()
            .entry(part.to_string())
            .or_insert_with(|| toml::Value::Table(Default::default()));
    }
    let table = cur
        .as_table_mut()
        .ok_or_else(|| Error::InvalidArgument(format!("config key '{key}' is not a table")))?;
    table.insert((*last).to_string(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_context_plugins_is_empty_until_seeded() {
        let cfg = Config::default();
        assert!(cfg.context_plugins.is_empty());
    }

    #[test]
    fn get_resolves_nested_dotted_key() {
        let cfg = Config::default();
        let value = cfg.get("daemon.port").unwrap();
        assert_eq!(value.as_integer(), Some(3117));
    }

    #[test]
    fn set_updates_nested_dotted_key_and_get_reflects_it() {
        let mut cfg = Config::default();
        cfg.set("memory.default_ttl_days", toml::Value::Integer(30))
            .unwrap();
        assert_eq!(cfg.memory.default_ttl_days, 30);
        assert_eq!(
            cfg.get("memory.default_ttl_days").unwrap().as_integer(),
            Some(30)
        );
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let cfg = Config::load("/nonexistent/path/membria.toml").unwrap();
        assert_eq!(cfg.daemon.port, 3117);
    }
}
