use anyhow::Result;
use clap::Args;
use tokio::io::BufReader;
use tracing::info;

use super::CliContext;
use crate::bridge::{NotificationBridge, stdio};

/// Serve the UI bridge over stdin/stdout.
///
/// Arms the automatic checks from the stored configuration and keeps running
/// until stdin closes.
#[derive(Args, Debug)]
pub struct ServeCommand {
    /// Do not schedule automatic checks
    #[arg(long)]
    no_auto_check: bool,
}

impl ServeCommand {
    pub async fn execute(self, context: &CliContext) -> Result<()> {
        let (coordinator, events) = context.coordinator().await;
        let bridge = NotificationBridge::new(coordinator.clone());
        let forwarder = bridge.spawn_forwarder(events);

        if !self.no_auto_check {
            coordinator.start().await;
            if coordinator.check_on_startup().await {
                info!("Startup update check scheduled");
            }
        }

        let result =
            stdio::serve(bridge, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await;

        coordinator.shutdown().await;
        forwarder.abort();
        result
    }
}
