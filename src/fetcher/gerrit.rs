//! Gerrit change fetcher
//!
//! Lists changes with `GET /changes/?q=after:"…" before:"…"` and fetches single
//! changes with `GET /changes/<number>/detail`. Every request runs inside its
//! own [`RetryEpisode`]; failures are logged and absorbed here and never reach
//! the downloader as errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::classifier::handle_exception;
use super::gerrit_http::GerritHttpClient;
use super::retry::{RetryDecision, RetryEpisode};
use super::shared_resources::global_http_client;
use super::{ArtifactOutcome, ChangeSource, FetcherError, FetcherResult};
use crate::downloader::config::{RetryPolicy, DEFAULT_PAGE_SIZE};
use crate::output::{write_artifact, ChangesLayout, OutputError};
use crate::{format_gerrit_timestamp, ChangeDetail, ChangeSummary};

/// Upper bound on list pages for one query, guards against a server that
/// keeps reporting `_more_changes`
const MAX_PAGES: usize = 10_000;

/// Build the `q=` expression for a list query
///
/// Gerrit treats both `after:` and `before:` as inclusive, so a change updated
/// exactly at a frame boundary is listed for both adjacent frames and stored
/// in each of their directories.
pub fn build_query(since: DateTime<Utc>, until: Option<DateTime<Utc>>) -> String {
    let mut query = format!("after:\"{}\"", format_gerrit_timestamp(since));
    if let Some(until) = until {
        query.push_str(&format!(" before:\"{}\"", format_gerrit_timestamp(until)));
    }
    query
}

/// [`ChangeSource`] backed by a Gerrit REST API
#[derive(Clone)]
pub struct GerritFetcher {
    http: GerritHttpClient,
    policy: RetryPolicy,
    page_size: usize,
}

impl GerritFetcher {
    /// Create a fetcher using the shared HTTP client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(GerritHttpClient::new(global_http_client(), base_url))
    }

    /// Create a fetcher around an existing client
    pub fn with_client(http: GerritHttpClient) -> Self {
        Self {
            http,
            policy: RetryPolicy::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the retry policy used for every request
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the list page size (at least 1)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Convenience for sharing one fetcher across tasks
    pub fn shared(self) -> Arc<dyn ChangeSource> {
        Arc::new(self)
    }

    /// Run one request to completion or until its episode gives up
    async fn request<T>(
        &self,
        endpoint: &'static str,
        path: &str,
        params: &[(&str, String)],
        context: &str,
    ) -> FetcherResult<T>
    where
        T: DeserializeOwned,
    {
        let mut episode = RetryEpisode::new(self.policy);
        loop {
            match self.http.get_json(endpoint, path, params).await {
                Ok(value) => {
                    episode.succeeded();
                    return Ok(value);
                }
                Err(err) => match episode.record_failure(&err, context).await {
                    RetryDecision::Retry => continue,
                    RetryDecision::GiveUp => return Err(err),
                },
            }
        }
    }

    /// Fetch the detail of one change without writing it
    pub async fn fetch_detail(&self, number: u64) -> FetcherResult<ChangeDetail> {
        let context = format!("change {number}");
        let detail: ChangeDetail = self
            .request("detail", &format!("/changes/{number}/detail"), &[], &context)
            .await?;
        detail
            .validate()
            .map_err(|e| FetcherError::Decode(format!("{context}: {e}")))?;
        Ok(detail)
    }
}

#[async_trait]
impl ChangeSource for GerritFetcher {
    async fn get_changes(
        &self,
        since: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
    ) -> Vec<ChangeSummary> {
        let query = build_query(since, until);
        let context = format!("changes {}", format_gerrit_timestamp(since));
        let mut changes: Vec<ChangeSummary> = Vec::new();

        for page in 0..MAX_PAGES {
            let params = [
                ("q", query.clone()),
                ("n", self.page_size.to_string()),
                ("S", changes.len().to_string()),
            ];

            debug!(
                "Fetching change page {} for {} (offset {})",
                page + 1,
                query,
                changes.len()
            );

            let batch: Vec<ChangeSummary> =
                match self.request("list", "/changes/", &params, &context).await {
                    Ok(batch) => batch,
                    Err(_) => {
                        warn!(
                            context = %context,
                            collected = changes.len(),
                            "Returning partial change list"
                        );
                        return changes;
                    }
                };

            let more = batch.last().is_some_and(|change| change.more_changes);
            if batch.is_empty() {
                break;
            }
            changes.extend(batch);
            if !more {
                break;
            }
        }

        info!(
            context = %context,
            count = changes.len(),
            "Listed changes"
        );
        changes
    }

    async fn get_change(&self, number: u64, destination: &Path) -> ArtifactOutcome {
        let path = ChangesLayout::artifact_path(destination, number);
        if path.exists() {
            return ArtifactOutcome::AlreadyExists(path);
        }

        let detail = match self.fetch_detail(number).await {
            Ok(detail) => detail,
            Err(_) => return ArtifactOutcome::Failed,
        };

        if detail.number != number {
            warn!(
                requested = number,
                received = detail.number,
                "Detail number differs from requested change; storing under requested number"
            );
        }

        match write_artifact(destination, number, &detail) {
            Ok(path) => ArtifactOutcome::Written(path),
            Err(OutputError::AlreadyExists(path)) => ArtifactOutcome::AlreadyExists(path),
            Err(e) => {
                let context = format!("change {number}");
                handle_exception(&FetcherError::Output(e), &context);
                ArtifactOutcome::Failed
            }
        }
    }

    fn base_url(&self) -> &str {
        self.http.base_url()
    }
}
