//! Common fixtures for the updater integration tests

// Not every helper is used by every test module
#![allow(dead_code)]

use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A throwaway data directory plus a local release feed next to it.
pub struct TestEnv {
    pub temp: TempDir,
    pub data_dir: PathBuf,
    pub feed_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let data_dir = temp.path().join("data");
        let feed_dir = temp.path().join("feed");
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::create_dir_all(&feed_dir).unwrap();
        Self {
            temp,
            data_dir,
            feed_dir,
        }
    }

    /// Point the stored update configuration at the local feed.
    pub fn use_local_feed(&self) -> &Self {
        let config = json!({
            "source": "local",
            "localPath": self.feed_dir.display().to_string(),
        });
        std::fs::write(
            self.data_dir.join("update-config.json"),
            serde_json::to_string_pretty(&config).unwrap(),
        )
        .unwrap();
        self
    }

    /// Publish `version` in the local feed with an artifact named `artifact`.
    pub fn publish(&self, version: &str, artifact: &str, payload: &[u8]) -> &Self {
        std::fs::write(self.feed_dir.join(artifact), payload).unwrap();
        let feed = json!({
            "version": version,
            "releaseNotes": format!("TaskQuest {version}"),
            "releaseDate": "2024-06-01T00:00:00Z",
            "size": payload.len(),
            "downloadUrl": artifact,
            "sha256": sha256_hex(payload),
        });
        std::fs::write(self.feed_dir.join("latest.json"), feed.to_string()).unwrap();
        self
    }

    /// Create the application files that backups copy.
    pub fn seed_app_state(&self) -> &Self {
        std::fs::write(self.data_dir.join("database.db"), b"level 7 questlog").unwrap();
        std::fs::write(self.data_dir.join("api-config.json"), b"{\"provider\":\"none\"}").unwrap();
        self
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A GitHub "latest release" body with one asset.
pub fn github_release(tag: &str, asset_url: &str, size: usize) -> String {
    json!({
        "tag_name": tag,
        "name": format!("TaskQuest {tag}"),
        "body": "Guild quests and a new XP curve",
        "published_at": "2024-06-01T12:00:00Z",
        "html_url": format!("https://github.com/jonny1729/my-second-llm-app/releases/tag/{tag}"),
        "assets": [
            {
                "name": "TaskQuest.AppImage",
                "size": size,
                "browser_download_url": asset_url,
            }
        ],
    })
    .to_string()
}
