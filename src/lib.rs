//! TaskQuest Updater - self-update pipeline for the TaskQuest desktop app
//!
//! TaskQuest is a desktop to-do application with RPG mechanics. This crate is
//! the privileged side of its update story: it asks a release feed whether a
//! newer version exists, snapshots the user's local data, acquires the new
//! build, and finally hands control to an installer that restarts the app.
//! Every step is reported as an event so the UI can render progress.
//!
//! # Architecture Overview
//!
//! ```text
//!   UI process  ⇄  bridge (JSON lines)  ⇄  UpdateCoordinator
//!                                              │
//!                      ┌───────────────┬───────┴───────┬──────────────┐
//!                 ReleaseSource   BackupManager     Installer    ConfigStore
//!               (remote / local)                (native / manual)
//! ```
//!
//! - At most one check/download/install session runs at a time; a second
//!   request fails fast with `Busy`.
//! - The remote feed is the GitHub releases API; the local feed is a
//!   `latest.json` file in a directory, useful for testing and offline
//!   distribution.
//! - Version comparison is a coarse dotted-numeric compare, see [`version`].
//!
//! # Core Modules
//!
//! - [`upgrade`] - Coordinator, release feeds, backups, installers, events
//! - [`bridge`] - Command and event plumbing between the coordinator and the UI
//! - [`config`] - Data directory layout and persisted update configuration
//! - [`core`] - Error types and user-facing error reporting
//! - [`version`] - Release version comparison
//! - [`cli`] - Command-line interface
//! - [`utils`] - File system helpers and progress bars
//!
//! # Command-Line Usage
//!
//! ```bash
//! # Is there a newer release?
//! taskquest-updater check
//!
//! # Back up local data and download it
//! taskquest-updater download
//!
//! # Switch to a local feed
//! taskquest-updater config set source local
//! taskquest-updater config set localPath /srv/taskquest-feed
//!
//! # Run as the UI's background process
//! taskquest-updater serve
//! ```

pub mod bridge;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod upgrade;
pub mod utils;
pub mod version;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
