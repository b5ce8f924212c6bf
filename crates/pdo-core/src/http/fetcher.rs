//! Phase fetch over HTTP GET: `{base}/{phase}/{subject}` -> JSON.

use std::time::Duration;

use async_trait::async_trait;

use super::Endpoint;
use crate::error::FetchError;
use crate::session::PhaseFetcher;
use crate::Payload;

#[derive(Debug, Clone)]
pub struct CurlFetcher {
    endpoint: Endpoint,
    phase: String,
    timeout: Duration,
}

impl CurlFetcher {
    pub fn new(endpoint: Endpoint, phase: impl Into<String>) -> Self {
        Self {
            endpoint,
            phase: phase.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl PhaseFetcher for CurlFetcher {
    async fn fetch(&self, subject: &str) -> Result<Payload, FetchError> {
        let url = self.endpoint.url_for(&[self.phase.as_str(), subject]);
        let timeout = self.timeout;
        tracing::debug!(phase = %self.phase, url = %url, "phase fetch");
        tokio::task::spawn_blocking(move || get_json(url.as_str(), timeout))
            .await
            .map_err(|e| FetchError::Task(e.to_string()))?
    }
}

/// Blocking GET returning the decoded JSON body.
fn get_json(url: &str, timeout: Duration) -> Result<Payload, FetchError> {
    let mut body = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.max_redirections(5)?;
    easy.connect_timeout(Duration::from_secs(10))?;
    easy.timeout(timeout)?;

    let mut list = curl::easy::List::new();
    list.append("Accept: application/json")?;
    easy.http_headers(list)?;

    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform()?;
    }

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(FetchError::Http(code));
    }
    Ok(serde_json::from_slice(&body)?)
}
