use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::CliContext;
use crate::upgrade::{DownloadedInfo, UpdateCoordinator, UpdateEvent};
use crate::utils::progress::ProgressBar;

/// Download the latest release into the staging directory.
///
/// Local data is backed up first when `autoBackup` is on.
#[derive(Args, Debug)]
pub struct DownloadCommand {}

impl DownloadCommand {
    pub async fn execute(self, context: &CliContext) -> Result<()> {
        let (coordinator, events) = context.coordinator().await;
        let info = download_with_progress(&coordinator, events, context.no_progress).await?;
        print_downloaded(&info);
        Ok(())
    }
}

/// Run `download_and_install`, rendering coordinator events on the terminal.
pub(super) async fn download_with_progress(
    coordinator: &UpdateCoordinator,
    events: mpsc::UnboundedReceiver<UpdateEvent>,
    no_progress: bool,
) -> Result<DownloadedInfo> {
    let bar = if no_progress { ProgressBar::hidden() } else { ProgressBar::new_percent() };
    bar.set_prefix("Downloading");
    let renderer = render_events(events, bar.clone());

    let result = coordinator.download_and_install().await;
    renderer.abort();

    match result {
        Ok(info) => {
            bar.finish_with_message(format!("v{}", info.version));
            Ok(info)
        }
        Err(e) => {
            bar.finish_and_clear();
            Err(e.into())
        }
    }
}

fn render_events(mut events: mpsc::UnboundedReceiver<UpdateEvent>, bar: ProgressBar) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                UpdateEvent::UpdateAvailable(release) => {
                    bar.set_message(format!("v{}", release.version));
                }
                UpdateEvent::BackupCreated(path) => {
                    bar.println(format!("{} Backed up local data to {}", "✓".green(), path.display()));
                }
                UpdateEvent::DownloadProgress(progress) => {
                    bar.set_position(u64::from(progress.percent));
                }
                _ => {}
            }
        }
    })
}

pub(super) fn print_downloaded(info: &DownloadedInfo) {
    println!("{} {}", "✓".green(), info.message);
    if let Some(path) = &info.path {
        println!("  Staged at {}", path.display());
    }
    if let Some(url) = &info.url {
        println!("  {url}");
    }
}
