use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{ReleaseDescriptor, ReleaseSource};
use crate::constants::{
    DEFAULT_REMOTE_NOTES, GITHUB_API_BASE, REMOTE_REQUEST_DELAY, REMOTE_REQUEST_TIMEOUT, USER_AGENT,
};
use crate::core::UpdateError;
use crate::upgrade::config::UpdateConfig;

#[derive(Debug, Deserialize)]
struct GitHubRelease {
    tag_name: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    assets: Vec<GitHubAsset>,
}

#[derive(Debug, Deserialize)]
struct GitHubAsset {
    #[serde(default)]
    size: u64,
    browser_download_url: String,
}

/// Latest-release lookup against the GitHub REST API.
///
/// Issues exactly one `GET /repos/{owner}/{repo}/releases/latest` per call,
/// preceded by a short courtesy pause. There is no retry: a failure is
/// surfaced immediately and the next scheduled check is the retry.
///
/// # Status mapping
///
/// | HTTP | error |
/// |---|---|
/// | 404 | `NotFound` |
/// | 401 | `Unauthorized` |
/// | 403 | `RateLimited` |
/// | other non-2xx, network failure, timeout | `TransportError` |
/// | unparsable body | `MalformedResponse` |
#[derive(Debug, Clone)]
pub struct RemoteReleaseFeed {
    api_base: String,
    request_delay: Duration,
    timeout: Duration,
}

impl Default for RemoteReleaseFeed {
    fn default() -> Self {
        Self {
            api_base: GITHUB_API_BASE.to_string(),
            request_delay: REMOTE_REQUEST_DELAY,
            timeout: REMOTE_REQUEST_TIMEOUT,
        }
    }
}

impl RemoteReleaseFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the feed at a different API root (GitHub Enterprise, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, config: &UpdateConfig) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base, config.remote_owner, config.remote_repo_name
        )
    }

    fn map_status(status: StatusCode, config: &UpdateConfig) -> UpdateError {
        match status {
            StatusCode::NOT_FOUND => UpdateError::NotFound {
                resource: format!(
                    "release of {}/{}",
                    config.remote_owner, config.remote_repo_name
                ),
            },
            StatusCode::UNAUTHORIZED => UpdateError::Unauthorized,
            StatusCode::FORBIDDEN => UpdateError::RateLimited,
            other => UpdateError::transport(format!("GitHub API error: {other}")),
        }
    }

    fn into_descriptor(release: GitHubRelease, config: &UpdateConfig) -> ReleaseDescriptor {
        let version = release.tag_name.trim().trim_start_matches('v').to_string();
        let release_notes = release
            .body
            .filter(|body| !body.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REMOTE_NOTES.to_string());
        let first_asset = release.assets.into_iter().next();
        let release_page = config.release_page_url();

        ReleaseDescriptor {
            version,
            release_notes,
            release_date: release.published_at.unwrap_or_else(Utc::now),
            download_size: first_asset.as_ref().map_or(0, |asset| asset.size),
            has_update: false,
            has_artifact: first_asset.is_some(),
            download_url: Some(
                first_asset.map_or_else(|| release_page.clone(), |asset| asset.browser_download_url),
            ),
            release_page_url: Some(release.html_url.unwrap_or(release_page)),
            sha256: None,
        }
    }
}

#[async_trait]
impl ReleaseSource for RemoteReleaseFeed {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn fetch_latest(&self, config: &UpdateConfig) -> Result<ReleaseDescriptor, UpdateError> {
        let url = self.endpoint(config);
        debug!(
            "Checking GitHub releases for {}/{}",
            config.remote_owner, config.remote_repo_name
        );

        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.timeout)
            .build()
            .map_err(|e| UpdateError::transport(format!("failed to create HTTP client: {e}")))?;

        let mut request = client.get(&url).header("Accept", "application/vnd.github.v3+json");
        if let Some(token) = config.remote_auth_token.as_deref() {
            request = request.header("Authorization", format!("token {token}"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                UpdateError::transport(format!(
                    "request timed out after {}s",
                    self.timeout.as_secs()
                ))
            } else {
                UpdateError::transport(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::map_status(status, config));
        }

        let body = response.text().await.map_err(UpdateError::transport)?;
        let release: GitHubRelease = serde_json::from_str(&body)
            .map_err(|e| UpdateError::malformed(format!("failed to parse release JSON: {e}")))?;

        info!("Latest GitHub release: {}", release.tag_name);
        Ok(Self::into_descriptor(release, config))
    }
}
