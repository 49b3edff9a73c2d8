use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliContext;
use crate::upgrade::ReleaseDescriptor;
use crate::utils::progress::{ProgressBar, format_bytes};

/// Ask the configured feed whether a newer release exists.
///
/// Exits with status 0 whether or not an update is available; feed errors
/// exit with status 1.
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Print the release descriptor as JSON
    #[arg(long)]
    json: bool,
}

impl CheckCommand {
    pub async fn execute(self, context: &CliContext) -> Result<()> {
        let (coordinator, _events) = context.coordinator().await;

        let spinner = if context.no_progress || self.json {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        spinner.set_message("Checking for updates...");
        let result = coordinator.check_for_updates().await;
        spinner.finish_and_clear();
        let release = result?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&release)?);
            return Ok(());
        }

        print_release(coordinator.current_version(), &release);
        Ok(())
    }
}

fn print_release(current: &str, release: &ReleaseDescriptor) {
    println!("Current version: {}", current.cyan());
    if release.has_update {
        println!("Latest version:  {} {}", release.version.green().bold(), "(update available)".green());
    } else {
        println!("Latest version:  {} {}", release.version, "(up to date)".dimmed());
        return;
    }

    println!("Released:        {}", release.release_date.format("%Y-%m-%d"));
    if release.download_size > 0 {
        println!("Download size:   {}", format_bytes(release.download_size));
    }
    if let Some(url) = &release.release_page_url {
        println!("Release page:    {url}");
    }
    if !release.release_notes.is_empty() {
        println!();
        println!("{}", release.release_notes);
    }
    println!();
    println!("Run {} to download it.", "taskquest-updater download".bold());
}
