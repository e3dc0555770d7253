//! Gerrit HTTP client
//!
//! Performs exactly one GET per call and maps every failure to a
//! [`FetcherError`]. Retrying is the caller's business (see
//! [`super::retry::RetryEpisode`]).

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

use crate::fetcher::{FetcherError, FetcherResult};
use crate::metrics::RequestTimer;

/// Line Gerrit prepends to JSON bodies to defeat cross-site script inclusion
pub const MAGIC_PREFIX: &str = ")]}'";

/// Longest error body kept in a [`FetcherError::Status`]
const MAX_ERROR_BODY: usize = 512;

/// Strip Gerrit's `)]}'` prefix line, if present
pub fn strip_magic_prefix(body: &str) -> &str {
    let trimmed = body.trim_start_matches('\u{feff}');
    match trimmed.strip_prefix(MAGIC_PREFIX) {
        Some(rest) => rest.trim_start_matches(['\r', '\n']),
        None => trimmed,
    }
}

/// Decode a Gerrit JSON body
pub fn decode_body<T: DeserializeOwned>(body: &str) -> FetcherResult<T> {
    serde_json::from_str(strip_magic_prefix(body))
        .map_err(|e| FetcherError::Decode(format!("Failed to deserialize response: {e}")))
}

/// HTTP client bound to one Gerrit base URL
#[derive(Clone)]
pub struct GerritHttpClient {
    client: Arc<Client>,
    base_url: String,
}

impl GerritHttpClient {
    /// Create a client
    ///
    /// # Arguments
    /// * `client` - Shared HTTP client
    /// * `base_url` - Base URL without trailing slash (e.g. "<https://gerrit-review.googlesource.com>")
    pub fn new(client: Arc<Client>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Base URL this client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute one GET and decode the body
    ///
    /// # Arguments
    /// * `endpoint` - Metrics label for the request ("list", "detail")
    /// * `path` - Path below the base URL (e.g. "/changes/")
    /// * `params` - Query parameters
    pub async fn get_json<T>(
        &self,
        endpoint: &'static str,
        path: &str,
        params: &[(&str, String)],
    ) -> FetcherResult<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} with {} params", url, params.len());

        let timer = RequestTimer::start(endpoint);
        let response = match self.client.get(&url).query(params).send().await {
            Ok(response) => response,
            Err(e) => {
                timer.record_no_response();
                return Err(FetcherError::from_reqwest(e));
            }
        };

        let status = response.status();
        timer.record_status(status.as_u16());

        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(floor_char_boundary(&body, MAX_ERROR_BODY));
            return Err(FetcherError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(FetcherError::from_reqwest)?;
        decode_body(&body)
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|i| s.is_char_boundary(*i)).unwrap_or(0)
}
