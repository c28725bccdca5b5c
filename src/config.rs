//! Server configuration
//!
//! Values come from built-in defaults, then an optional YAML file named by
//! `POLLSERVE_CONFIG`, then individual environment variables.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 3490;
pub const DEFAULT_BACKLOG: i32 = 10;
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen: ListenConfig,
    pub transfer: TransferConfig,
    pub registry: RegistryConfig,
}

/// Where the listener binds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Host to resolve. `None` binds the passive wildcard addresses.
    pub host: Option<String>,
    pub port: u16,
    pub backlog: i32,
}

/// What gets served and how much of it goes out per writable event
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub resource: PathBuf,
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub initial_capacity: usize,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            resource: PathBuf::from("example.txt"),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_BACKLOG as usize,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var("POLLSERVE_CONFIG") {
            Ok(path) => Self::from_yaml_file(&path)?,
            Err(_) => Self::default(),
        };

        if let Ok(host) = std::env::var("LISTEN_HOST") {
            cfg.listen.host = Some(host).filter(|h| !h.is_empty());
        }
        if let Ok(port) = std::env::var("LISTEN_PORT") {
            cfg.listen.port = port
                .parse()
                .with_context(|| format!("LISTEN_PORT is not a port number: {port:?}"))?;
        }
        if let Ok(resource) = std::env::var("RESOURCE") {
            cfg.transfer.resource = PathBuf::from(resource);
        }
        if let Ok(chunk) = std::env::var("CHUNK_SIZE") {
            cfg.transfer.chunk_size = chunk
                .parse()
                .with_context(|| format!("CHUNK_SIZE is not a size: {chunk:?}"))?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        Self::from_yaml(&text).with_context(|| format!("invalid config file {path}"))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.transfer.chunk_size == 0 {
            anyhow::bail!("transfer.chunk_size must be greater than zero");
        }
        if self.registry.initial_capacity == 0 {
            anyhow::bail!("registry.initial_capacity must be greater than zero");
        }
        if self.listen.backlog <= 0 {
            anyhow::bail!("listen.backlog must be greater than zero");
        }
        Ok(())
    }
}
