// pour-net/src/http.rs
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use pour_common::capability::Fetcher;
use pour_common::error::{PourError, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use tracing::{debug, error};

use crate::validation::validate_url;

const CONNECT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT_STRING: &str = "pour formula installer (Rust)";

/// Downloads artifacts over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    require_https: bool,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            require_https: true,
        })
    }

    /// Allows plain `http://` URLs. Only meant for local mirrors and tests.
    pub fn allow_insecure(mut self) -> Self {
        self.require_https = false;
        self
    }
}

fn build_http_client() -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| PourError::Generic(format!("Failed to build HTTP client: {e}")))
}

fn network_error(url: &str, message: String, retryable: bool) -> PourError {
    PourError::Network {
        url: url.to_string(),
        message,
        retryable,
    }
}

fn status_is_transient(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if self.require_https {
            validate_url(url)?;
        }
        debug!("Downloading {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            debug!("HTTP request failed for {url}: {e}");
            // Connection-level failures are worth another attempt.
            network_error(url, format!("HTTP request failed: {e}"), true)
        })?;
        let status = response.status();
        debug!("Received HTTP status: {} for {}", status, url);

        if !status.is_success() {
            error!("HTTP error {} for URL {}", status, url);
            let message = match status {
                StatusCode::NOT_FOUND => "Resource not found (404)".to_string(),
                StatusCode::FORBIDDEN => "Access forbidden (403)".to_string(),
                _ => format!("HTTP error {status}"),
            };
            return Err(network_error(url, message, status_is_transient(status)));
        }

        let mut body = Vec::with_capacity(response.content_length().unwrap_or(0) as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                network_error(url, format!("Failed to read response body: {e}"), true)
            })?;
            body.extend_from_slice(&chunk);
        }
        debug!("Downloaded {} bytes from {}", body.len(), url);
        Ok(body)
    }
}
