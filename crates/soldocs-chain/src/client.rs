use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use soldocs_core::{Result, SolDocsError};
use tracing::debug;

use crate::retry::{with_retry, DEFAULT_MAX_RETRIES};

const RPC_TIMEOUT_SECS: u64 = 30;

/// A program account as returned by the RPC node.
#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub data: Vec<u8>,
    pub owner: String,
    pub executable: bool,
}

impl AccountInfo {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The chain operations the agent depends on. Implemented over JSON-RPC in
/// production and by in-memory fakes in tests.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn get_account(&self, address: &str) -> Result<Option<AccountInfo>>;

    /// Node version string; used as the startup liveness probe.
    async fn get_version(&self) -> Result<String>;
}

pub struct JsonRpcChainClient {
    url: String,
    http: reqwest::Client,
}

impl JsonRpcChainClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(RPC_TIMEOUT_SECS))
            .build()
            .map_err(|err| SolDocsError::Rpc(format!("Failed to build RPC client: {err}")))?;
        Ok(Self {
            url: url.into(),
            http,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|err| SolDocsError::Rpc(format!("RPC transport error: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SolDocsError::Rpc(format!(
                "RPC HTTP {}: {}",
                status.as_u16(),
                text
            )));
        }

        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|err| SolDocsError::Rpc(format!("Malformed RPC response: {err}")))?;

        if let Some(err) = envelope.error {
            return Err(SolDocsError::Rpc(format!(
                "RPC error {}: {}",
                err.code, err.message
            )));
        }
        envelope
            .result
            .ok_or_else(|| SolDocsError::Rpc("RPC response missing result".to_string()))
    }
}

#[async_trait]
impl ChainRpc for JsonRpcChainClient {
    async fn get_account(&self, address: &str) -> Result<Option<AccountInfo>> {
        let result = with_retry(DEFAULT_MAX_RETRIES, || {
            self.call(
                "getAccountInfo",
                json!([address, {"encoding": "base64"}]),
            )
        })
        .await?;

        let value = &result["value"];
        if value.is_null() {
            debug!(address, "Account not found");
            return Ok(None);
        }

        let encoded = value["data"][0].as_str().unwrap_or_default();
        let data = BASE64.decode(encoded).map_err(|err| {
            SolDocsError::Rpc(format!("Undecodable account data for {address}: {err}"))
        })?;

        Ok(Some(AccountInfo {
            data,
            owner: value["owner"].as_str().unwrap_or_default().to_string(),
            executable: value["executable"].as_bool().unwrap_or(false),
        }))
    }

    async fn get_version(&self) -> Result<String> {
        let result = with_retry(DEFAULT_MAX_RETRIES, || {
            self.call("getVersion", json!([]))
        })
        .await?;
        Ok(result["solana-core"].as_str().unwrap_or("unknown").to_string())
    }
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}
