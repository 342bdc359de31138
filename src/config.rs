use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::protocols::rdp::DEFAULT_MAX_TOKEN_LEN;
use crate::routes::RouteTable;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub routes: RoutesConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load config from default locations or create default
    pub fn load_or_default() -> Result<Self> {
        let paths = [
            PathBuf::from("/etc/rdpgate/config.toml"),
            dirs_next::config_dir()
                .map(|p| p.join("rdpgate/config.toml"))
                .unwrap_or_default(),
            PathBuf::from("config.toml"),
        ];

        for path in &paths {
            if path.is_file() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Address the proxy listens on
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen.addr, self.listen.port)
    }

    /// Build the route table, validating every upstream
    pub fn route_table(&self) -> Result<RouteTable> {
        let mut table = RouteTable::new();
        if let Some(upstream) = &self.routes.default_upstream {
            table = table
                .with_default(upstream.clone())
                .context("Invalid default upstream")?;
        }
        for (key, upstream) in &self.routes.sessions {
            table
                .insert(key.clone(), upstream.clone())
                .with_context(|| format!("Invalid route for session {}", key))?;
        }
        Ok(table)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Address to bind
    #[serde(default = "default_listen_addr")]
    pub addr: String,

    /// Port to bind
    #[serde(default = "default_listen_port")]
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            addr: default_listen_addr(),
            port: default_listen_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Token bytes scanned before giving up on the CR/LF terminator
    #[serde(default = "default_max_token_len")]
    pub max_token_len: usize,

    /// Client bytes held back while waiting for the Connection Request
    #[serde(default = "default_max_preread_bytes")]
    pub max_preread_bytes: usize,

    /// Seconds to wait for the Connection Request
    #[serde(default = "default_preread_timeout")]
    pub preread_timeout_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_token_len: default_max_token_len(),
            max_preread_bytes: default_max_preread_bytes(),
            preread_timeout_secs: default_preread_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutesConfig {
    /// Upstream for connections without a matching token
    #[serde(default)]
    pub default_upstream: Option<String>,

    /// Routing key -> upstream `host:port`
    #[serde(default)]
    pub sessions: BTreeMap<String, String>,
}

// Default value functions
fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    3389
}

fn default_max_token_len() -> usize {
    DEFAULT_MAX_TOKEN_LEN
}

fn default_max_preread_bytes() -> usize {
    4096
}

fn default_preread_timeout() -> u64 {
    10
}
