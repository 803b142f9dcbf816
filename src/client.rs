//! HTTP client for the target under load.

use reqwest::Client;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::RequestError;

/// Issues timed GET requests against the configured target.
///
/// Cloning is cheap; all clones share one connection pool, so each simulated
/// user keeps its connections alive between requests.
#[derive(Clone, Debug)]
pub struct TargetClient {
    client: Client,
    url: Url,
    timeout: Duration,
}

impl TargetClient {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    /// Send one GET and return the time until the response headers arrived.
    ///
    /// Only a 2xx status counts as success; the body is never read. Cancelling
    /// `cancel` drops the in-flight request and yields [`RequestError::Cancelled`].
    pub async fn get(&self, cancel: &CancellationToken) -> Result<Duration, RequestError> {
        let start = Instant::now();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RequestError::Cancelled),
            response = self.client.get(self.url.clone()).send() => response,
        };
        let latency = start.elapsed();

        match response {
            Ok(response) if response.status().is_success() => Ok(latency),
            Ok(response) => Err(RequestError::Status(response.status())),
            Err(e) => Err(RequestError::from((e, self.timeout))),
        }
    }
}
