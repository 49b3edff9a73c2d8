//! Global constants used throughout the updater.
//!
//! This module contains timeout durations, retention limits, file names and
//! other values that are shared across multiple modules. Defining them
//! centrally keeps magic numbers discoverable.

use std::time::Duration;

/// Name of the flat JSON file holding the update configuration.
pub const UPDATE_CONFIG_FILE: &str = "update-config.json";

/// Local state files copied into every backup snapshot.
///
/// Paths are relative to the application data directory. Files that do not
/// exist yet are skipped.
pub const BACKUP_FILES: &[&str] = &["database.db", UPDATE_CONFIG_FILE, "api-config.json"];

/// Directory (under the data directory) holding backup snapshots.
pub const BACKUPS_DIR: &str = "backups";

/// Directory (under the data directory) holding staged update artifacts.
pub const UPDATES_DIR: &str = "updates";

/// Prefix of every snapshot directory name.
pub const BACKUP_PREFIX: &str = "backup-";

/// Number of snapshots kept after a new one is created.
pub const BACKUP_RETENTION: usize = 5;

/// Attempts made when restoring a snapshot before giving up.
pub const RESTORE_MAX_ATTEMPTS: u32 = 3;

/// Courtesy pause before every request to the remote releases API.
pub const REMOTE_REQUEST_DELAY: Duration = Duration::from_secs(1);

/// Network timeout for a remote release check.
pub const REMOTE_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Base URL of the GitHub REST API.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// User agent sent with every HTTP request.
pub const USER_AGENT: &str = concat!("TaskQuest-Updater/", env!("CARGO_PKG_VERSION"));

/// Delay before the one-shot startup check fires.
pub const STARTUP_CHECK_DELAY: Duration = Duration::from_secs(3);

/// Period of the `daily` auto-check schedule.
pub const DAILY_CHECK_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Period of the `weekly` auto-check schedule.
pub const WEEKLY_CHECK_PERIOD: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Synthetic progress stages used when no real download takes place.
///
/// Each entry is the percentage reached and the pause (in milliseconds)
/// before moving on to the next stage.
pub const MANUAL_PROGRESS_STAGES: &[(u8, u64)] =
    &[(0, 1000), (15, 1200), (35, 1500), (60, 1000), (85, 800)];

/// Chunk size used when copying local artifacts.
pub const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Default release notes when a remote release has an empty body.
pub const DEFAULT_REMOTE_NOTES: &str = "No release notes available.";

/// Default release notes when a local feed omits them.
pub const DEFAULT_LOCAL_NOTES: &str = "Local update available";

/// Feed directory used when `localPath` is not configured.
pub const DEFAULT_LOCAL_FEED_DIR: &str = "./updates";

/// File name of the local feed descriptor.
pub const LOCAL_FEED_FILE: &str = "latest.json";

/// Pause between the last synthetic progress stage and `update-downloaded`.
pub const MANUAL_SETTLE_DELAY: Duration = Duration::from_millis(1500);

/// Message shown after the release page was opened for a manual update.
pub const MANUAL_UPDATE_MESSAGE: &str =
    "Opened the release page. Download the new version and replace the installed one.";

/// Start of the message shown when the release page could not be opened.
/// The page URL follows it.
pub const MANUAL_OPEN_FAILED_MESSAGE: &str =
    "Could not open the release page. Download the new version from";
