//! Command-line interface for the updater.
//!
//! The desktop shell runs `taskquest-updater serve` as its privileged
//! background process; the other commands perform a single update action and
//! are handy for scripting and troubleshooting.
//!
//! # Commands
//!
//! - `check` - Ask the configured feed for the latest release
//! - `download` - Download the latest release (backing up local state first)
//! - `install` - Download, then install and restart
//! - `config` - Show or change the update configuration
//! - `backup` - Create, list and restore local state snapshots
//! - `serve` - Run the UI bridge over stdin/stdout
//!
//! # Global Options
//!
//! - `--data-dir` - Application data directory (or `TASKQUEST_DATA_DIR`)
//! - `--app-version` - Version of the running application
//! - `--installer` - `native` or `manual`
//! - `--app-exe` - Desktop application to start after an update (or `TASKQUEST_APP_EXE`)
//! - `--verbose` / `--quiet` - Log level
//! - `--no-progress` - Disable progress bars
//!
//! Logs always go to stderr so stdout stays clean for command output and
//! the bridge protocol.

mod backup;
mod check;
mod config;
mod download;
mod install;
mod serve;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppPaths;
use crate::upgrade::{InstallerKind, SystemProcess, UpdateCoordinator, UpdateEvent};
use crate::utils::progress::NO_PROGRESS_ENV;

/// Environment variable naming the desktop application executable.
pub const APP_EXE_ENV: &str = "TASKQUEST_APP_EXE";

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub paths: AppPaths,
    pub app_version: String,
    pub installer: InstallerKind,
    pub app_exe: Option<PathBuf>,
    pub no_progress: bool,
}

impl CliContext {
    /// Build a coordinator for this invocation.
    pub async fn coordinator(&self) -> (UpdateCoordinator, mpsc::UnboundedReceiver<UpdateEvent>) {
        UpdateCoordinator::builder(self.app_version.clone(), self.paths.clone())
            .installer_kind(self.installer)
            .process_control(Arc::new(SystemProcess::new(self.app_exe.clone())))
            .build()
            .await
    }
}

/// Main CLI structure for the updater.
#[derive(Parser)]
#[command(
    name = "taskquest-updater",
    about = "TaskQuest update pipeline - check, download and install application updates",
    version,
    author,
    long_about = "Checks GitHub or a local feed for new TaskQuest releases, backs up local data, \
                  downloads and installs updates, and bridges update events to the desktop UI."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Application data directory
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Version of the running application
    #[arg(long, global = true, value_name = "VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    app_version: String,

    /// Installer strategy (native or manual)
    #[arg(long, global = true, value_name = "KIND", default_value = "native")]
    installer: InstallerKind,

    /// Desktop application to start after an update
    #[arg(long, global = true, value_name = "PATH", env = APP_EXE_ENV)]
    app_exe: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check for a newer release
    Check(check::CheckCommand),

    /// Download the latest release
    Download(download::DownloadCommand),

    /// Download the latest release, install it and restart
    Install(install::InstallCommand),

    /// Show or change the update configuration
    Config(config::ConfigCommand),

    /// Manage local data backups
    Backup(backup::BackupCommand),

    /// Run the UI bridge over stdin/stdout
    Serve(serve::ServeCommand),
}

impl Cli {
    /// Initialize logging and run the selected command.
    pub async fn execute(self) -> Result<()> {
        self.init_logging();
        let context = self.build_context()?;

        match self.command {
            Commands::Check(cmd) => cmd.execute(&context).await,
            Commands::Download(cmd) => cmd.execute(&context).await,
            Commands::Install(cmd) => cmd.execute(&context).await,
            Commands::Config(cmd) => cmd.execute(&context).await,
            Commands::Backup(cmd) => cmd.execute(&context).await,
            Commands::Serve(cmd) => cmd.execute(&context).await,
        }
    }

    /// Resolve the shared settings.
    pub fn build_context(&self) -> Result<CliContext> {
        Ok(CliContext {
            paths: AppPaths::resolve(self.data_dir.clone())?,
            app_version: self.app_version.clone(),
            installer: self.installer,
            app_exe: self.app_exe.clone(),
            no_progress: self.no_progress || std::env::var(NO_PROGRESS_ENV).is_ok(),
        })
    }

    fn log_filter(&self) -> EnvFilter {
        if self.verbose {
            EnvFilter::new("debug")
        } else if self.quiet {
            EnvFilter::new("error")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
        }
    }

    fn init_logging(&self) {
        let _ = tracing_subscriber::registry()
            .with(self.log_filter())
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "taskquest-updater",
            "check",
            "--data-dir",
            "/tmp/tq",
            "--app-version",
            "1.2.4",
            "--installer",
            "manual",
            "--no-progress",
            "--app-exe",
            "/opt/taskquest/taskquest",
        ])
        .unwrap();

        let context = cli.build_context().unwrap();
        assert_eq!(context.paths.data_dir(), std::path::Path::new("/tmp/tq"));
        assert_eq!(context.app_version, "1.2.4");
        assert_eq!(context.installer, InstallerKind::Manual);
        assert!(context.no_progress);
        assert_eq!(context.app_exe, Some(PathBuf::from("/opt/taskquest/taskquest")));
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["taskquest-updater", "--data-dir", "/tmp/tq", "serve"])
            .unwrap();
        let context = cli.build_context().unwrap();
        assert_eq!(context.app_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(context.installer, InstallerKind::Native);
    }

    #[test]
    fn test_rejects_unknown_installer() {
        assert!(Cli::try_parse_from(["taskquest-updater", "--installer", "msi", "check"]).is_err());
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["taskquest-updater", "-v", "-q", "check"]).is_err());
    }
}
