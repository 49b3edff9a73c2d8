//! The update pipeline of the TaskQuest desktop application.
//!
//! # Architecture Overview
//!
//! - **[`UpdateCoordinator`]**: owns the configuration and the session, runs
//!   check → compare → notify → backup → download → install → restart, and
//!   emits [`UpdateEvent`]s.
//! - **[`release`]**: where release information comes from. The remote feed
//!   asks the GitHub releases API; the local feed reads `latest.json`.
//! - **[`BackupManager`]**: timestamped snapshots of the local state files,
//!   keeping the newest five.
//! - **[`installer`]**: platform strategies for getting the release onto the
//!   machine and restarting.
//! - **[`config`]**: the persisted [`UpdateConfig`] and partial updates.
//!
//! ## Update Process Flow
//!
//! ```text
//! 1. Check
//!    ├── Fetch the latest release from the configured feed
//!    └── Compare against the running version
//!
//! 2. Backup (when autoBackup is on)
//!    └── Copy database.db, update-config.json, api-config.json
//!
//! 3. Acquire
//!    ├── Native: stream the artifact into <data>/updates, verify sha256
//!    └── Manual: staged progress, open the release page
//!
//! 4. Install and restart
//!    ├── Native: launch the staged artifact, exit
//!    └── Manual: relaunch, exit
//! ```
//!
//! # Events
//!
//! | event | payload |
//! |---|---|
//! | `checking-for-update` | none |
//! | `update-available` | release descriptor |
//! | `update-not-available` | release descriptor |
//! | `download-progress` | `{percent, transferred, total, bytesPerSecond}` |
//! | `update-downloaded` | `{version, message, url?, path?}` |
//! | `backup-created` | snapshot path |
//! | `error` | `{code, message}` |

pub mod backup;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod installer;
pub mod release;
pub mod verification;


pub use backup::{BackupManager, BackupSnapshot};
pub use config::{CheckInterval, ReleaseSourceKind, UpdateConfig, UpdateConfigPatch};
pub use coordinator::{CoordinatorBuilder, SessionState, UpdateCoordinator};
pub use events::{DownloadedInfo, EventSender, ProgressEvent, ProgressSink, UpdateEvent};
pub use installer::{
    Installer, InstallerKind, ManualFallbackInstaller, NativeInstaller, ProcessControl,
    SystemProcess, SystemUrlOpener, UrlOpener,
};
pub use release::{LocalReleaseFeed, ReleaseDescriptor, ReleaseSource, RemoteReleaseFeed};
pub use verification::ChecksumVerifier;
