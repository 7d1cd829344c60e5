use std::net::SocketAddr;
use std::time::Duration;

use soldocs_core::{Result, SolDocsError};
use tokio::signal;
use tracing::{error, info, warn};

use crate::rate_limit::SWEEP_INTERVAL;
use crate::routes::create_router;
use crate::state::AppState;

/// In-flight handlers get this long after a shutdown signal before the
/// process is forced out.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Server {
    addr: SocketAddr,
    state: AppState,
}

impl Server {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self { addr, state }
    }

    /// Serve the API and drive the agent until a shutdown signal arrives.
    pub async fn run(self) -> Result<()> {
        let agent = self.state.agent.clone();
        let agent_task = tokio::spawn({
            let agent = agent.clone();
            async move {
                let result = agent.start().await;
                if let Err(err) = &result {
                    error!(error = %err, "Agent crashed");
                    std::process::exit(1);
                }
                result
            }
        });

        let sweeper = {
            let limiter = self.state.rate_limiter.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
                loop {
                    ticker.tick().await;
                    limiter.sweep();
                }
            })
        };

        let router = create_router(self.state.clone());
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("SolDocs API listening on http://{}", self.addr);

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| SolDocsError::Io(err.into()))?;

        info!("Shutting down");
        sweeper.abort();
        agent.stop();
        finish_agent(agent_task).await;
        Ok(())
    }
}

async fn finish_agent(task: tokio::task::JoinHandle<Result<()>>) {
    match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
        Ok(Ok(Ok(()))) => info!("Agent stopped cleanly"),
        Ok(Ok(Err(err))) => error!(error = %err, "Agent exited with error"),
        Ok(Err(join_err)) => error!(error = %join_err, "Agent task panicked"),
        Err(_) => warn!("Agent did not stop within the grace period"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }

    // In-flight handlers may finish, but not forever.
    tokio::spawn(async {
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        warn!("Grace period elapsed, forcing exit");
        std::process::exit(0);
    });
}
