//! TaskQuest updater entry point
//!
//! Parses the command line, runs the selected command and renders failures
//! with a suggestion. Commands:
//! - `check` - Check for a newer release
//! - `download` - Back up local data and download the latest release
//! - `install` - Download, install and restart
//! - `config` - Show or change the update configuration
//! - `backup` - Manage local data snapshots
//! - `serve` - Run the UI bridge over stdin/stdout

use anyhow::Result;
use clap::Parser;
use taskquest_updater::cli;
use taskquest_updater::core::error::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
