use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

use crate::{Result, SolDocsError};

pub const DEFAULT_API_PORT: u16 = 3000;
pub const DEFAULT_DISCOVERY_INTERVAL_MS: u64 = 300_000;
pub const DEFAULT_AGENT_CONCURRENCY: usize = 1;

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub anthropic_api_key: String,
    pub api_port: u16,
    pub agent_discovery_interval_ms: u64,
    pub agent_concurrency: usize,
    pub webhook_url: Option<String>,
    pub data_dir: PathBuf,
    pub seeds_dir: PathBuf,
}

impl Config {
    /// Read configuration from the environment. Required variables fail
    /// hard; optional numerics fall back to their defaults on parse errors.
    pub fn from_env() -> Result<Self> {
        let rpc_url = required("SOLANA_RPC_URL")?;
        let anthropic_api_key = required("ANTHROPIC_API_KEY")?;

        Ok(Self {
            rpc_url,
            anthropic_api_key,
            api_port: optional("API_PORT", DEFAULT_API_PORT),
            agent_discovery_interval_ms: optional(
                "AGENT_DISCOVERY_INTERVAL_MS",
                DEFAULT_DISCOVERY_INTERVAL_MS,
            ),
            agent_concurrency: optional("AGENT_CONCURRENCY", DEFAULT_AGENT_CONCURRENCY).max(1),
            webhook_url: env::var("WEBHOOK_URL").ok().filter(|url| !url.is_empty()),
            data_dir: PathBuf::from(
                env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            ),
            seeds_dir: PathBuf::from(
                env::var("SEEDS_DIR").unwrap_or_else(|_| "./seeds".to_string()),
            ),
        })
    }
}

fn required(name: &str) -> Result<String> {
    env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            SolDocsError::Configuration(format!("{name} environment variable is required"))
        })
}

fn optional<T: FromStr + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring unparseable {name}={raw:?}, using default");
            default
        }),
        Err(_) => default,
    }
}
