//! Release feeds: where the latest version information comes from.
//!
//! Two feeds implement [`ReleaseSource`]:
//!
//! - [`RemoteReleaseFeed`] asks the GitHub releases API for the latest release
//!   of `githubOwner/githubRepo`.
//! - [`LocalReleaseFeed`] reads `latest.json` from a directory, for offline
//!   or self-hosted distribution.
//!
//! Feeds only describe the release; deciding whether it is newer than the
//! running application is the coordinator's job, so every descriptor a feed
//! returns has `has_update == false`.

mod local;
mod remote;

pub use local::LocalReleaseFeed;
pub use remote::RemoteReleaseFeed;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::UpdateError;
use crate::upgrade::config::{ReleaseSourceKind, UpdateConfig};
use crate::version::is_newer;

/// Metadata of the latest known release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseDescriptor {
    /// Version without the `v` prefix, e.g. `1.2.5`.
    pub version: String,
    /// Free-form release notes.
    pub release_notes: String,
    /// Publication time.
    pub release_date: DateTime<Utc>,
    /// Size of the downloadable artifact, 0 when unknown.
    pub download_size: u64,
    /// Whether `version` is newer than the running application.
    pub has_update: bool,
    /// Artifact to download, or the release page when there is none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    /// Whether `download_url` is an installable artifact. False when the
    /// release has no assets and `download_url` is only the release page.
    #[serde(default)]
    pub has_artifact: bool,
    /// Human-facing release page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_page_url: Option<String>,
    /// Expected SHA-256 of the artifact, hex encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl ReleaseDescriptor {
    /// Recompute [`has_update`](Self::has_update) against `current_version`.
    #[must_use]
    pub fn compared_to(mut self, current_version: &str) -> Self {
        self.has_update = is_newer(&self.version, current_version);
        self
    }
}

/// A place to fetch the latest release from.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Fetch the latest release described by `config`.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Unauthorized`, `RateLimited`, `TransportError`,
    /// `MalformedResponse`, or `FilesystemError` for local feeds.
    async fn fetch_latest(&self, config: &UpdateConfig) -> Result<ReleaseDescriptor, UpdateError>;
}

/// Builds the release source for a configuration.
///
/// The coordinator calls the factory again whenever the origin settings
/// change, so a factory must be cheap.
pub type SourceFactory = Arc<dyn Fn(&UpdateConfig) -> Arc<dyn ReleaseSource> + Send + Sync>;

/// Factory selecting the production feed from `config.source`.
#[must_use]
pub fn default_source_factory() -> SourceFactory {
    Arc::new(|config: &UpdateConfig| -> Arc<dyn ReleaseSource> {
        match config.source {
            ReleaseSourceKind::RemoteFeed => Arc::new(RemoteReleaseFeed::new()),
            ReleaseSourceKind::LocalFeed => Arc::new(LocalReleaseFeed::new()),
        }
    })
}
