//! Per-client rate limiting for mutating routes. Purely in-memory: the
//! counters reset on restart, and a background sweep keeps the key table
//! from growing with one entry per client ever seen.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

/// Mutating requests allowed per client IP per minute.
pub const MUTATING_REQUESTS_PER_MINUTE: u32 = 30;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct ApiRateLimiter {
    limiter: RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>,
}

impl ApiRateLimiter {
    pub fn new(per_minute: NonZeroU32) -> Self {
        Self {
            limiter: RateLimiter::keyed(Quota::per_minute(per_minute)),
        }
    }

    pub fn with_default_quota() -> Self {
        Self::new(NonZeroU32::new(MUTATING_REQUESTS_PER_MINUTE).expect("nonzero quota"))
    }

    pub fn check(&self, client: IpAddr) -> bool {
        self.limiter.check_key(&client).is_ok()
    }

    /// Drop bookkeeping for clients whose budget has fully refilled.
    pub fn sweep(&self) {
        self.limiter.retain_recent();
        debug!(clients = self.limiter.len(), "Swept rate limiter table");
    }
}

fn client_ip(request: &Request) -> IpAddr {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|value| value.trim().parse().ok())
    {
        return forwarded;
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Gate POST/DELETE requests at the per-IP quota. Reads pass untouched.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if matches!(*request.method(), Method::POST | Method::DELETE) {
        let client = client_ip(&request);
        if !state.rate_limiter.check(client) {
            debug!(%client, "Rate limit exceeded");
            return ApiError::RateLimited.into_response();
        }
    }
    next.run(request).await
}
