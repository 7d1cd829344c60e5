use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use soldocs_agent::{validate_startup, Agent, AgentConfig};
use soldocs_api::{AppState, Server};
use soldocs_chain::JsonRpcChainClient;
use soldocs_core::Config;
use soldocs_llm::{AnthropicClient, AnthropicConfig};
use soldocs_store::Store;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "soldocs=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(err) = run().await {
        error!(error = %err, "Fatal error");
        std::process::exit(1);
    }
}

async fn run() -> soldocs_core::Result<()> {
    let config = Config::from_env()?;

    let chain = Arc::new(JsonRpcChainClient::new(config.rpc_url.clone())?);
    validate_startup(chain.as_ref(), &config.rpc_url, &config.anthropic_api_key).await?;

    let store = Arc::new(Store::new(&config.data_dir).await?);
    let llm = Arc::new(AnthropicClient::new(AnthropicConfig::new(
        config.anthropic_api_key.clone(),
    ))?);

    let agent = Arc::new(Agent::new(
        store.clone(),
        chain,
        llm,
        AgentConfig {
            discovery_interval: Duration::from_millis(config.agent_discovery_interval_ms),
            concurrency: config.agent_concurrency,
            webhook_url: config.webhook_url.clone(),
            seeds_dir: config.seeds_dir.clone(),
        },
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    Server::new(addr, AppState::new(store, agent)).run().await
}
