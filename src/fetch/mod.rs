//! Resilient retrieval of off-chain pricing context: a single HTTP GET
//! repeated a bounded number of times with linear backoff between attempts.
//!
//! The HTTP client and the clock sit behind the [`Transport`] and [`Sleeper`]
//! traits so tests can script failures and observe the backoff schedule.

use backon::Retryable;
use std::time::Duration;
use tracing::*;

#[cfg(test)]
pub mod mock;
pub mod real;

use real::{ReqwestTransport, TokioSleeper};

/// How many times to try a request and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, counting the first one.
    pub max_attempts: u32,

    /// Attempt `n` is followed by a sleep of `base_backoff * n`.
    pub base_backoff: Duration,

    /// Timeout applied to each attempt on its own.
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_backoff: Duration::from_millis(1000),
            request_timeout: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_backoff_ms: u64,
        request_timeout_ms: u64,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(max_attempts > 0, "max attempts must be positive");
        anyhow::ensure!(request_timeout_ms > 0, "request timeout must be positive");

        Ok(Self {
            max_attempts,
            base_backoff: Duration::from_millis(base_backoff_ms),
            request_timeout: Duration::from_millis(request_timeout_ms),
        })
    }

    /// Delay after the given failed attempt (1-indexed).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(attempt)
    }
}

/// Why a single attempt failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchFailure {
    /// A response arrived but its status was not 2xx.
    #[error("Request failed with status code {status}")]
    Status { status: u16, headers: String, body: String },

    /// No response arrived at all (connect error, timeout, reset).
    #[error("No response received: {0}")]
    Network(String),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Failed after {attempts} retries: {last}")]
    Exhausted { attempts: u32, last: FetchFailure },
}

/// A single HTTP GET returning the body of a 2xx response, decoded as JSON
/// when it parses and as a JSON string otherwise.
pub(crate) trait Transport {
    async fn get_json(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<serde_json::Value, FetchFailure>;
}

/// The clock used between attempts. Each retry sleeps on its own clone.
pub(crate) trait Sleeper: Clone + 'static {
    async fn sleep(&self, duration: Duration);
}

/// Fetches JSON documents, retrying each one according to a [`RetryPolicy`].
pub struct ResilientFetcher<T, S> {
    transport: T,
    sleeper: S,
    policy: RetryPolicy,
}

impl ResilientFetcher<ReqwestTransport, TokioSleeper> {
    /// A fetcher backed by `reqwest` and the tokio timer.
    pub fn http(policy: RetryPolicy) -> anyhow::Result<Self> {
        Ok(Self::new(ReqwestTransport::new()?, TokioSleeper, policy))
    }
}

#[allow(private_bounds)]
impl<T: Transport, S: Sleeper> ResilientFetcher<T, S> {
    pub fn new(transport: T, sleeper: S, policy: RetryPolicy) -> Self {
        Self { transport, sleeper, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET `url` until an attempt succeeds or the policy's attempts run out.
    /// Attempts never overlap.
    pub async fn fetch(
        &self,
        url: &str,
    ) -> Result<serde_json::Value, FetchError> {
        let policy = self.policy;
        let transport = &self.transport;
        let sleeper = self.sleeper.clone();
        let mut attempt = 0;

        let fetch_once = || {
            attempt += 1;
            let current = attempt;

            async move {
                info!("Attempt {current}: Fetching market data from {url}");

                let outcome =
                    transport.get_json(url, policy.request_timeout).await;
                match &outcome {
                    Ok(_) => info!("Attempt {current}: Success"),
                    Err(failure) => log_failure(current, failure),
                }

                outcome
            }
        };

        // one delay per retry, so the iterator also bounds the attempts
        let backoff = (1..policy.max_attempts.max(1))
            .map(move |attempt| policy.backoff(attempt));

        let outcome = fetch_once
            .retry(backoff)
            .sleep(move |duration| {
                let sleeper = sleeper.clone();
                async move { sleeper.sleep(duration).await }
            })
            .notify(|_, duration| {
                info!("Waiting {duration:?} before retrying");
            })
            .await;

        outcome.map_err(|last| FetchError::Exhausted { attempts: attempt, last })
    }
}

fn log_failure(attempt: u32, failure: &FetchFailure) {
    warn!("Retry {attempt} failed: {failure}");

    match failure {
        FetchFailure::Status { status, headers, body } => {
            warn!("Response status: {status}");
            warn!("Response headers: {headers}");
            warn!("Response data: {body}");
        }
        FetchFailure::Network(details) => warn!("Error details: {details}"),
        FetchFailure::Other(_) => {}
    }
}

/// URL of the token info endpoint of the pricing API for a token on a
/// network.
pub fn pricing_url(
    base: &str,
    network: &str,
    token_address: &str,
) -> anyhow::Result<String> {
    let mut url = reqwest::Url::parse(base)?;

    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("Pricing API URL {base} cannot be a base"))?
        .pop_if_empty()
        .extend(["api", "token", "infos"]);

    url.query_pairs_mut()
        .append_pair("network", network)
        .append_pair("tokenAddress", token_address);

    Ok(url.to_string())
}
