//! Plumbing between the update coordinator and the UI process.
//!
//! The bridge works in two directions:
//!
//! - **Events out**: every [`UpdateEvent`] is translated into an
//!   `(event name, JSON payload)` pair and handed to the attached
//!   [`UiSurface`]. Without a surface (no window yet, or the window was
//!   closed) events are dropped silently.
//! - **Commands in**: the UI invokes named commands with JSON arguments via
//!   [`NotificationBridge::invoke`] and gets a JSON result back.
//!
//! | command | args | result |
//! |---|---|---|
//! | `check` | none | release descriptor, or `null` when the check failed |
//! | `download-and-install` | none | `{version, message, url?, path?}` |
//! | `install-and-restart` | none | `null` |
//! | `get-config` | none | update configuration |
//! | `update-config` | partial configuration | merged configuration |
//! | `get-last-update-check` | none | RFC 3339 timestamp or `null` |
//! | `create-backup` | none | snapshot path |
//!
//! [`stdio`] carries both directions over JSON lines.

pub mod stdio;

use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::core::UpdateError;
use crate::upgrade::{UpdateConfigPatch, UpdateCoordinator, UpdateEvent};

/// Something that can show update notifications to the user.
pub trait UiSurface: Send + Sync {
    fn send(&self, event: &str, payload: Value);
}

/// Commands the UI can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeCommand {
    Check,
    DownloadAndInstall,
    InstallAndRestart,
    GetConfig,
    UpdateConfig,
    GetLastUpdateCheck,
    CreateBackup,
}

impl BridgeCommand {
    pub const ALL: [Self; 7] = [
        Self::Check,
        Self::DownloadAndInstall,
        Self::InstallAndRestart,
        Self::GetConfig,
        Self::UpdateConfig,
        Self::GetLastUpdateCheck,
        Self::CreateBackup,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::DownloadAndInstall => "download-and-install",
            Self::InstallAndRestart => "install-and-restart",
            Self::GetConfig => "get-config",
            Self::UpdateConfig => "update-config",
            Self::GetLastUpdateCheck => "get-last-update-check",
            Self::CreateBackup => "create-backup",
        }
    }
}

impl fmt::Display for BridgeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BridgeCommand {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|command| command.as_str() == s).ok_or_else(|| {
            UpdateError::UnknownCommand {
                name: s.to_string(),
            }
        })
    }
}

/// Routes UI commands to the coordinator and coordinator events to the UI.
#[derive(Clone)]
pub struct NotificationBridge {
    coordinator: UpdateCoordinator,
    surface: Arc<RwLock<Option<Arc<dyn UiSurface>>>>,
}

impl NotificationBridge {
    pub fn new(coordinator: UpdateCoordinator) -> Self {
        Self {
            coordinator,
            surface: Arc::new(RwLock::new(None)),
        }
    }

    pub fn coordinator(&self) -> &UpdateCoordinator {
        &self.coordinator
    }

    pub async fn attach_surface(&self, surface: Arc<dyn UiSurface>) {
        *self.surface.write().await = Some(surface);
    }

    pub async fn detach_surface(&self) {
        self.surface.write().await.take();
    }

    /// Deliver one event to the attached surface, if any.
    pub async fn forward(&self, event: &UpdateEvent) {
        deliver(&self.surface, event).await;
    }

    /// Forward every event from `events` until the coordinator is dropped.
    pub fn spawn_forwarder(
        &self,
        mut events: mpsc::UnboundedReceiver<UpdateEvent>,
    ) -> JoinHandle<()> {
        let surface = Arc::clone(&self.surface);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                deliver(&surface, &event).await;
            }
            debug!("Event stream closed");
        })
    }

    /// Run a UI command.
    ///
    /// # Errors
    ///
    /// `UnknownCommand` for names outside [`BridgeCommand`],
    /// `InvalidArguments` for unusable `update-config` arguments, and
    /// whatever the coordinator returns.
    pub async fn invoke(&self, command: &str, args: Value) -> Result<Value, UpdateError> {
        let command: BridgeCommand = command.parse()?;
        debug!("UI invoked '{}'", command);

        match command {
            BridgeCommand::Check => match self.coordinator.check_for_updates().await {
                Ok(release) => to_json(&release),
                Err(UpdateError::Busy) => Err(UpdateError::Busy),
                // Already delivered as an `error` event.
                Err(_) => Ok(Value::Null),
            },
            BridgeCommand::DownloadAndInstall => {
                let info = self.coordinator.download_and_install().await?;
                to_json(&info)
            }
            BridgeCommand::InstallAndRestart => {
                self.coordinator.install_and_restart().await?;
                Ok(Value::Null)
            }
            BridgeCommand::GetConfig => to_json(&self.coordinator.get_config().await),
            BridgeCommand::UpdateConfig => {
                let patch: UpdateConfigPatch =
                    serde_json::from_value(args).map_err(|e| UpdateError::InvalidArguments {
                        command: command.to_string(),
                        reason: e.to_string(),
                    })?;
                let merged = self.coordinator.update_config(patch).await?;
                to_json(&merged)
            }
            BridgeCommand::GetLastUpdateCheck => Ok(self
                .coordinator
                .last_checked_at()
                .await
                .map_or(Value::Null, |at| Value::String(at.to_rfc3339()))),
            BridgeCommand::CreateBackup => {
                let path = self.coordinator.create_backup().await?;
                Ok(Value::String(path.display().to_string()))
            }
        }
    }
}

async fn deliver(surface: &RwLock<Option<Arc<dyn UiSurface>>>, event: &UpdateEvent) {
    match surface.read().await.as_ref() {
        Some(surface) => surface.send(event.name(), event.payload()),
        None => trace!("No UI surface, dropping '{}'", event.name()),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, UpdateError> {
    serde_json::to_value(value).map_err(|e| UpdateError::Other {
        message: format!("failed to encode result: {e}"),
    })
}
