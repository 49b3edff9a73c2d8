use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::constants::{BACKUP_FILES, BACKUP_PREFIX, BACKUP_RETENTION, RESTORE_MAX_ATTEMPTS};
use crate::core::UpdateError;

/// A snapshot directory found under the backups root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSnapshot {
    /// Directory name, e.g. `backup-2024-05-01T10-00-00-123Z`.
    pub name: String,
    pub path: PathBuf,
    /// Modification time of the snapshot directory.
    pub modified: DateTime<Utc>,
}

/// Snapshots the application's local state before an update is installed.
///
/// Every snapshot is a fresh directory `backup-<timestamp>` under the backups
/// root holding copies of the state files (`database.db`,
/// `update-config.json`, `api-config.json`). Files that do not exist yet are
/// skipped, so a snapshot of a fresh installation may be empty.
///
/// After each new snapshot only the newest [`BACKUP_RETENTION`] are kept.
/// Age is the directory modification time; equal times fall back to the
/// name, which sorts chronologically.
///
/// # Examples
///
/// ```rust,no_run
/// use taskquest_updater::upgrade::BackupManager;
///
/// # async fn example() -> Result<(), taskquest_updater::core::UpdateError> {
/// let manager = BackupManager::new("/home/me/.local/share/taskquest", "/home/me/.local/share/taskquest/backups");
/// let snapshot = manager.create_backup().await?;
/// println!("Backed up to {}", snapshot.display());
///
/// // Roll back later
/// manager.restore_snapshot(&snapshot).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BackupManager {
    data_dir: PathBuf,
    backups_root: PathBuf,
    files: Vec<String>,
    retention: usize,
    retry_delay: Duration,
}

impl BackupManager {
    pub fn new(data_dir: impl Into<PathBuf>, backups_root: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            backups_root: backups_root.into(),
            files: BACKUP_FILES.iter().map(|f| (*f).to_string()).collect(),
            retention: BACKUP_RETENTION,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Replace the list of state files (relative to the data directory).
    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    /// Pause between restore attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn backups_root(&self) -> &Path {
        &self.backups_root
    }

    /// Copy the state files into a new snapshot and prune old snapshots.
    ///
    /// Returns the snapshot directory.
    ///
    /// # Errors
    ///
    /// `FilesystemError` when the snapshot directory cannot be created or a
    /// present state file cannot be copied. A failed snapshot is removed
    /// again so it never counts towards retention.
    pub async fn create_backup(&self) -> Result<PathBuf, UpdateError> {
        fs::create_dir_all(&self.backups_root)
            .await
            .map_err(|e| UpdateError::filesystem("create backups directory", &self.backups_root, &e))?;

        let snapshot = self.allocate_snapshot_dir().await?;

        if let Err(e) = self.copy_state_into(&snapshot).await {
            if let Err(cleanup) = fs::remove_dir_all(&snapshot).await {
                warn!("Failed to remove incomplete backup {}: {}", snapshot.display(), cleanup);
            }
            return Err(e);
        }

        info!("Created backup {}", snapshot.display());
        self.prune().await?;
        Ok(snapshot)
    }

    /// Snapshots under the backups root, newest first.
    pub async fn list_snapshots(&self) -> Result<Vec<BackupSnapshot>, UpdateError> {
        let mut entries = match fs::read_dir(&self.backups_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(UpdateError::filesystem("list backups", &self.backups_root, &e)),
        };

        let mut snapshots = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    return Err(UpdateError::filesystem("list backups", &self.backups_root, &e));
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(BACKUP_PREFIX) {
                continue;
            }
            let path = entry.path();
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| UpdateError::filesystem("read backup metadata", &path, &e))?;
            if !metadata.is_dir() {
                continue;
            }
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_default();

            snapshots.push(BackupSnapshot {
                name,
                path,
                modified,
            });
        }

        snapshots.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
        Ok(snapshots)
    }

    /// Copy a snapshot's files back into the data directory.
    ///
    /// `snapshot` is either a snapshot directory or a bare snapshot name.
    /// File locks held by a still-running application can be transient, so
    /// the copy is attempted up to [`RESTORE_MAX_ATTEMPTS`] times.
    ///
    /// Returns the number of files restored.
    pub async fn restore_snapshot(&self, snapshot: &Path) -> Result<usize, UpdateError> {
        let snapshot = if snapshot.components().count() == 1 && !snapshot.is_absolute() {
            self.backups_root.join(snapshot)
        } else {
            snapshot.to_path_buf()
        };

        if !fs::metadata(&snapshot).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(UpdateError::NotFound {
                resource: snapshot.display().to_string(),
            });
        }

        warn!("Restoring state from backup {}", snapshot.display());

        let mut attempts = 0;
        loop {
            match self.attempt_restore(&snapshot).await {
                Ok(restored) => {
                    info!("Restored {} file(s) from {}", restored, snapshot.display());
                    return Ok(restored);
                }
                Err(e) if attempts < RESTORE_MAX_ATTEMPTS - 1 => {
                    warn!("Restore attempt {} failed: {}. Retrying...", attempts + 1, e);
                    tokio::time::sleep(self.retry_delay).await;
                    attempts += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt_restore(&self, snapshot: &Path) -> Result<usize, UpdateError> {
        fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| UpdateError::filesystem("create data directory", &self.data_dir, &e))?;

        let mut restored = 0;
        for file in &self.files {
            let source = snapshot.join(file);
            if !fs::try_exists(&source).await.unwrap_or(false) {
                continue;
            }
            let target = self.data_dir.join(file);
            fs::copy(&source, &target)
                .await
                .map_err(|e| UpdateError::filesystem("restore backup", &target, &e))?;
            restored += 1;
        }
        Ok(restored)
    }

    // Picks `backup-<timestamp>`, appending `-N` if that name is taken.
    async fn allocate_snapshot_dir(&self) -> Result<PathBuf, UpdateError> {
        let stamp = Utc::now()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace([':', '.'], "-");
        let base = format!("{BACKUP_PREFIX}{stamp}");

        let mut suffix = 0u32;
        loop {
            let name = if suffix == 0 { base.clone() } else { format!("{base}-{suffix}") };
            let candidate = self.backups_root.join(name);
            match fs::create_dir(&candidate).await {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(UpdateError::filesystem("create backup", &candidate, &e)),
            }
        }
    }

    async fn copy_state_into(&self, snapshot: &Path) -> Result<(), UpdateError> {
        for file in &self.files {
            let source = self.data_dir.join(file);
            if !fs::try_exists(&source).await.unwrap_or(false) {
                debug!("Skipping missing state file {}", source.display());
                continue;
            }
            let target = snapshot.join(file);
            fs::copy(&source, &target)
                .await
                .map_err(|e| UpdateError::filesystem("create backup", &source, &e))?;
        }
        Ok(())
    }

    async fn prune(&self) -> Result<(), UpdateError> {
        let snapshots = self.list_snapshots().await?;
        for stale in snapshots.iter().skip(self.retention) {
            debug!("Removing old backup {}", stale.path.display());
            if let Err(e) = fs::remove_dir_all(&stale.path).await {
                warn!("Failed to remove old backup {}: {}", stale.path.display(), e);
            }
        }
        Ok(())
    }
}
