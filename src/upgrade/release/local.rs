use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;
use tracing::debug;

use super::{ReleaseDescriptor, ReleaseSource};
use crate::constants::{DEFAULT_LOCAL_NOTES, LOCAL_FEED_FILE};
use crate::core::UpdateError;
use crate::upgrade::config::UpdateConfig;

/// Contents of `latest.json`.
///
/// ```json
/// {
///   "version": "1.3.0",
///   "releaseNotes": "Quest log redesign",
///   "releaseDate": "2024-06-01T00:00:00Z",
///   "size": 52428800,
///   "downloadUrl": "TaskQuest-Setup-1.3.0.exe",
///   "sha256": "9f86d081..."
/// }
/// ```
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalFeedFile {
    version: String,
    #[serde(default)]
    release_notes: Option<String>,
    #[serde(default)]
    release_date: Option<DateTime<Utc>>,
    #[serde(default, alias = "size")]
    download_size: Option<u64>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    release_page_url: Option<String>,
    #[serde(default)]
    sha256: Option<String>,
}

/// Reads the latest release from `<localPath>/latest.json`.
#[derive(Debug, Clone, Default)]
pub struct LocalReleaseFeed;

impl LocalReleaseFeed {
    pub fn new() -> Self {
        Self
    }

    // Relative artifact paths are relative to the feed directory.
    fn resolve_url(feed_dir: &Path, url: String) -> String {
        if url.contains("://") || Path::new(&url).is_absolute() {
            url
        } else {
            feed_dir.join(url).display().to_string()
        }
    }
}

#[async_trait]
impl ReleaseSource for LocalReleaseFeed {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn fetch_latest(&self, config: &UpdateConfig) -> Result<ReleaseDescriptor, UpdateError> {
        let feed_dir = config.local_feed_dir();
        let path = feed_dir.join(LOCAL_FEED_FILE);
        debug!("Reading local release feed {}", path.display());

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(UpdateError::NotFound {
                    resource: path.display().to_string(),
                });
            }
            Err(e) => return Err(UpdateError::filesystem("read local feed", &path, &e)),
        };

        let feed: LocalFeedFile = serde_json::from_str(&content).map_err(|e| {
            UpdateError::malformed(format!("invalid {}: {e}", path.display()))
        })?;

        let download_url = feed.download_url.map(|url| Self::resolve_url(&feed_dir, url));
        Ok(ReleaseDescriptor {
            version: feed.version.trim().trim_start_matches('v').to_string(),
            release_notes: feed
                .release_notes
                .filter(|notes| !notes.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LOCAL_NOTES.to_string()),
            release_date: feed.release_date.unwrap_or_else(Utc::now),
            download_size: feed.download_size.unwrap_or(0),
            has_update: false,
            has_artifact: download_url.is_some(),
            download_url,
            release_page_url: feed.release_page_url,
            sha256: feed.sha256.map(|digest| digest.to_lowercase()),
        })
    }
}
