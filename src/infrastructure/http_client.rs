//! Shared HTTP client construction for the REST `BarSource` adapters: a
//! pooled `reqwest` client wrapped in retry middleware with bounded,
//! exponential backoff (§5: "10-second per-request timeout and a small
//! bounded retry budget: 3 attempts with exponential backoff starting at 2
//! seconds").

use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use std::time::Duration;

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Builds a client configured for the REST brokerage/data adapters:
    /// short connect timeout, a 10s request timeout, and 3 retries with
    /// exponential backoff starting at 2 seconds.
    pub fn create_client() -> ClientWithMiddleware {
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_secs(2), Duration::from_secs(16))
            .build_with_max_retries(3);

        let client = Client::builder()
            .pool_max_idle_per_host(5)
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build()
    }
}
