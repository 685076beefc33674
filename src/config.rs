use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageCfg,
    #[serde(default)]
    pub operator: OperatorCfg,
    #[serde(default)]
    pub rpc: RpcCfg,
    #[serde(default)]
    pub rootchain: RootChainCfg,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageCfg {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OperatorCfg {
    /// Seconds between packaging ticks.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

impl Default for OperatorCfg {
    fn default() -> Self {
        OperatorCfg { tick_secs: default_tick_secs() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RpcCfg {
    #[serde(default = "default_rpc_port")]
    pub port: u16,
}

impl Default for RpcCfg {
    fn default() -> Self {
        RpcCfg { port: default_rpc_port() }
    }
}

/// Connection details for the settlement-layer client. Optional: without
/// them the node runs against the stand-in client.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RootChainCfg {
    #[serde(default)]
    pub node_url: Option<String>,
    #[serde(default)]
    pub contract_address: Option<String>,
}

fn default_tick_secs() -> u64 {
    10
}

fn default_rpc_port() -> u16 {
    6545
}

impl Config {
    pub fn load(path: &str) -> Result<Config> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse config file {path}"))
    }
}
