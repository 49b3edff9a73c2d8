use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliContext;
use super::download::{download_with_progress, print_downloaded};

/// Download the latest release, install it and restart the application.
///
/// With the manual installer this opens the release page and relaunches the
/// application given by `--app-exe` instead.
#[derive(Args, Debug)]
pub struct InstallCommand {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,
}

impl InstallCommand {
    pub async fn execute(self, context: &CliContext) -> Result<()> {
        let (coordinator, events) = context.coordinator().await;
        let info = download_with_progress(&coordinator, events, context.no_progress).await?;
        print_downloaded(&info);

        if !self.yes && !confirm(&format!("Install v{} and restart now?", info.version))? {
            println!("{}", "Installation postponed".yellow());
            return Ok(());
        }

        println!("{}", "Installing update and restarting...".cyan());
        coordinator.install_and_restart().await?;
        Ok(())
    }
}

fn confirm(question: &str) -> Result<bool> {
    use std::io::{BufRead, Write};

    print!("{question} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
