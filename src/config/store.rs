//! Load and save `update-config.json`.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::core::UpdateError;
use crate::upgrade::config::UpdateConfig;
use crate::utils::fs::atomic_write;

/// File-backed store for [`UpdateConfig`].
///
/// Loading never fails on a damaged file: a parse error is logged and the
/// defaults are used, so a corrupt settings file cannot lock the user out of
/// updates. Saving goes through a temp-and-rename write and restricts the
/// file to its owner on Unix because it may hold an access token.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the configuration, falling back to defaults for a missing or
    /// unreadable file.
    pub async fn load(&self) -> UpdateConfig {
        match self.try_load().await {
            Ok(Some(config)) => config,
            Ok(None) => {
                debug!("No update config at {}, using defaults", self.path.display());
                UpdateConfig::default()
            }
            Err(e) => {
                warn!("Ignoring unreadable update config: {}", e);
                UpdateConfig::default()
            }
        }
    }

    /// Load the configuration, reporting parse and I/O failures.
    pub async fn try_load(&self) -> Result<Option<UpdateConfig>, UpdateError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(UpdateError::filesystem("read config", &self.path, &e)),
        };

        serde_json::from_str(&content).map(Some).map_err(|e| UpdateError::ConfigError {
            message: format!("failed to parse {}: {e}", self.path.display()),
        })
    }

    /// Persist the configuration.
    pub async fn save(&self, config: &UpdateConfig) -> Result<(), UpdateError> {
        let content =
            serde_json::to_string_pretty(config).map_err(|e| UpdateError::ConfigError {
                message: format!("failed to serialize update config: {e}"),
            })?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || atomic_write(&path, content.as_bytes()))
            .await
            .map_err(|e| UpdateError::Other {
                message: format!("config writer task failed: {e}"),
            })?
            .map_err(|e| UpdateError::filesystem("write config", &self.path, &e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let perms = std::fs::Permissions::from_mode(0o600);
            fs::set_permissions(&self.path, perms)
                .await
                .map_err(|e| UpdateError::filesystem("restrict config", &self.path, &e))?;
        }

        debug!("Saved update config to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upgrade::config::CheckInterval;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::new(temp.path().join("update-config.json"));
        assert_eq!(store.try_load().await.unwrap(), None);
        assert_eq!(store.load().await, UpdateConfig::default());
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::new(temp.path().join("nested").join("update-config.json"));

        let mut config = UpdateConfig::default();
        config.check_interval = CheckInterval::Daily;
        config.remote_auth_token = Some("secret".to_string());
        store.save(&config).await.unwrap();

        assert_eq!(store.load().await, config);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let store = ConfigStore::new(temp.path().join("update-config.json"));
        store.save(&UpdateConfig::default()).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_corrupt_file_falls_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("update-config.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = ConfigStore::new(&path);
        assert_eq!(store.try_load().await.unwrap_err().code(), "config-error");
        assert_eq!(store.load().await, UpdateConfig::default());
    }
}
