use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use super::CliContext;
use crate::upgrade::BackupManager;

/// Manage snapshots of the local application data.
#[derive(Args, Debug)]
pub struct BackupCommand {
    #[command(subcommand)]
    command: BackupSubcommands,
}

#[derive(Subcommand, Debug)]
enum BackupSubcommands {
    /// Snapshot the local data now
    Create,

    /// List snapshots, newest first
    List,

    /// Copy a snapshot back into the data directory
    Restore {
        /// Snapshot name (e.g. backup-2024-05-01T10-00-00-000Z) or path
        snapshot: PathBuf,
    },
}

impl BackupCommand {
    pub async fn execute(self, context: &CliContext) -> Result<()> {
        let manager = BackupManager::new(context.paths.data_dir(), context.paths.backups_dir());

        match self.command {
            BackupSubcommands::Create => {
                let path = manager.create_backup().await?;
                println!("{} Created backup {}", "✓".green(), path.display());
            }
            BackupSubcommands::List => {
                let snapshots = manager.list_snapshots().await?;
                if snapshots.is_empty() {
                    println!("No backups in {}", manager.backups_root().display());
                    return Ok(());
                }
                println!("{}", "Backups".bold());
                for snapshot in snapshots {
                    println!(
                        "  {}  {}",
                        snapshot.name.cyan(),
                        snapshot.modified.format("%Y-%m-%d %H:%M:%S UTC").to_string().dimmed()
                    );
                }
            }
            BackupSubcommands::Restore {
                snapshot,
            } => {
                let restored = manager.restore_snapshot(&snapshot).await?;
                println!(
                    "{} Restored {} file(s) from {}",
                    "✓".green(),
                    restored,
                    snapshot.display()
                );
                println!("{}", "Restart TaskQuest to pick up the restored data".yellow());
            }
        }
        Ok(())
    }
}
