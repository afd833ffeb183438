//! HTTP client construction
//!
//! Every outbound request (JSON-RPC, explorer, connectivity probe) goes
//! through a blocking `reqwest` client built here, so timeouts and the
//! user agent are uniform.

use reqwest::blocking::Client;
use std::time::Duration;

use crate::error::{ShieldError, ShieldResult};

const USER_AGENT: &str = concat!("ephemeral-shield/", env!("CARGO_PKG_VERSION"));

/// Timeouts for a client
#[derive(Debug, Clone, Copy)]
pub struct HttpTimeouts {
    pub request: Duration,
    pub connect: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
            connect: Duration::from_secs(10),
        }
    }
}

impl HttpTimeouts {
    /// Short timeouts for reachability checks
    pub fn probe(timeout: Duration) -> Self {
        Self {
            request: timeout,
            connect: timeout,
        }
    }
}

/// Build a pooled blocking client with the given timeouts
pub fn create_client(timeouts: HttpTimeouts) -> ShieldResult<Client> {
    Client::builder()
        .timeout(timeouts.request)
        .connect_timeout(timeouts.connect)
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(5)
        .tcp_nodelay(true)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ShieldError::internal(format!("Failed to create HTTP client: {}", e)))
}

/// Extract the host part of a URL for logging
pub fn extract_domain(url: &str) -> String {
    url.trim_start_matches("https://")
        .trim_start_matches("http://")
        .split(['/', '?'])
        .next()
        .unwrap_or(url)
        .to_string()
}

/// Whether an HTTP status means "try again later" rather than "bad request"
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}
