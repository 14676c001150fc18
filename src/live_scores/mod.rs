pub mod api_football;
pub mod news;
pub mod provider;

pub use api_football::ApiFootball;
pub use news::NewsFeed;
pub use provider::{
    FixtureSource, NewsSource, NullSource, PlayerImpactSource, PregameSource, TeamFormSource,
};

use anyhow::{anyhow, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Timeout and retry budget applied to every external call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Attempts after the first one
    pub retries: u32,
    /// Base delay between attempts; grows linearly and gets random jitter
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(timeout: Duration, retries: u32) -> Self {
        RetryPolicy {
            timeout,
            retries,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Run `op` under `policy.timeout`, retrying up to `policy.retries` times.
///
/// Returns the last error once the budget is exhausted; callers treat that as
/// a soft failure of the source.
pub async fn with_retry<T, F, Fut>(label: &str, policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        let err = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => anyhow!("timed out after {:?}", policy.timeout),
        };
        if attempt >= policy.retries {
            return Err(err.context(format!(
                "{} failed after {} attempt(s)",
                label,
                attempt + 1
            )));
        }
        attempt += 1;
        let base_ms = policy.backoff.as_millis() as u64;
        let jitter_ms = if base_ms > 0 {
            rand::thread_rng().gen_range(0..=base_ms)
        } else {
            0
        };
        let delay = Duration::from_millis(base_ms * attempt as u64 + jitter_ms);
        debug!("{} attempt {} failed ({}), retrying in {:?}", label, attempt, err, delay);
        tokio::time::sleep(delay).await;
    }
}
