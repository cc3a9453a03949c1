//! Blocking HTTP feed source.

use std::time::Duration;

use anyhow::{Context, Result};
use busy_engine::{FeedSource, FetchError};
use reqwest::blocking::Client;
use tracing::debug;

/// Fetches feeds over HTTP(S) with a fixed timeout and user agent.
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: Client,
}

impl HttpFeedSource {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl FeedSource for HttpFeedSource {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        debug!(url, "GET feed");
        let response = self.client.get(url).send().map_err(map_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        response.text().map_err(map_error)
    }
}

fn map_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(err.to_string())
    }
}

