//! Transient-error retry for chain RPC calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use soldocs_core::Result;
use tracing::warn;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

const TRANSIENT_MARKERS: [&str; 3] = ["429", "502", "503"];

/// Rate-limit and gateway errors are worth another try; anything else
/// (auth failures, bad params) is not.
pub fn is_transient(message: &str) -> bool {
    TRANSIENT_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// Run `operation` up to `max_retries` times, backing off
/// `2^attempt * 1000 ms` plus up to 500 ms of jitter between tries.
/// Non-transient errors propagate after the first failure.
pub async fn with_retry<F, Fut, T>(max_retries: u32, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let message = err.to_string();
                if attempt + 1 >= max_retries || !is_transient(&message) {
                    return Err(err);
                }
                let jitter = rand::thread_rng().gen_range(0..500);
                let backoff = Duration::from_millis(2u64.pow(attempt) * 1000 + jitter);
                warn!(
                    attempt = attempt + 1,
                    max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %message,
                    "Transient RPC error, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}
