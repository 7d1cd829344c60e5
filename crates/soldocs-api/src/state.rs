use std::sync::Arc;

use soldocs_agent::Agent;
use soldocs_store::Store;

use crate::rate_limit::ApiRateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub agent: Arc<Agent>,
    pub rate_limiter: Arc<ApiRateLimiter>,
}

impl AppState {
    pub fn new(store: Arc<Store>, agent: Arc<Agent>) -> Self {
        Self {
            store,
            agent,
            rate_limiter: Arc::new(ApiRateLimiter::with_default_quota()),
        }
    }
}
