//! Process-wide HTTP client
//!
//! All fetchers share one `reqwest::Client` so connection pooling works across
//! concurrently processed frames. Backoff state is deliberately not shared; it
//! lives in each [`super::retry::RetryEpisode`].

use once_cell::sync::Lazy;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// HTTP connect timeout (seconds)
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP request timeout (seconds) - covers the whole request including body
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;

static GLOBAL_HTTP_CLIENT: Lazy<Arc<Client>> = Lazy::new(|| {
    let client = Client::builder()
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
        .user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Falling back to default HTTP client: {}", e);
            Client::new()
        });
    Arc::new(client)
});

/// Get the shared HTTP client
pub fn global_http_client() -> Arc<Client> {
    GLOBAL_HTTP_CLIENT.clone()
}
