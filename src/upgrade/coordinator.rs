//! The update session state machine.
//!
//! ```text
//! Idle ──check──▶ Checking ──▶ UpToDate
//!                          └─▶ UpdateAvailable ──download──▶ Downloading ──▶ Downloaded
//!                                                                              │
//!                                                                   install ───▶ Installing
//! any non-terminal state ──failure──▶ Error
//! ```
//!
//! At most one session (check, download or install) runs at a time. A second
//! caller gets [`UpdateError::Busy`] immediately; that rejection is returned
//! but never emitted, since the running session already owns the event
//! stream. Every other failure is emitted as exactly one `error` event and
//! returned as well.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{AppPaths, ConfigStore};
use crate::constants::{DAILY_CHECK_PERIOD, STARTUP_CHECK_DELAY, WEEKLY_CHECK_PERIOD};
use crate::core::UpdateError;
use crate::upgrade::backup::BackupManager;
use crate::upgrade::config::{CheckInterval, UpdateConfig, UpdateConfigPatch};
use crate::upgrade::events::{DownloadedInfo, EventSender, ProgressSink, UpdateEvent};
use crate::upgrade::installer::{
    Installer, InstallerKind, ProcessControl, SystemProcess, installer_for,
};
use crate::upgrade::release::{
    ReleaseDescriptor, ReleaseSource, SourceFactory, default_source_factory,
};

/// Where the current session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    Idle,
    Checking,
    UpToDate,
    UpdateAvailable,
    Downloading,
    Downloaded,
    Installing,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::UpToDate => "up-to-date",
            Self::UpdateAvailable => "update-available",
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
            Self::Installing => "installing",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

struct Inner {
    current_version: String,
    store: ConfigStore,
    config: RwLock<UpdateConfig>,
    source_factory: SourceFactory,
    source: RwLock<Arc<dyn ReleaseSource>>,
    installer: Arc<dyn Installer>,
    process: Arc<dyn ProcessControl>,
    backups: BackupManager,
    events: EventSender,
    session: Mutex<()>,
    state: RwLock<SessionState>,
    latest: RwLock<Option<ReleaseDescriptor>>,
    last_checked_at: RwLock<Option<DateTime<Utc>>>,
    staged: Mutex<Option<DownloadedInfo>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    startup: Mutex<Option<JoinHandle<()>>>,
    startup_delay: Duration,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for handle in [self.timer.get_mut().take(), self.startup.get_mut().take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }
}

/// Drives check → compare → notify → download → backup → install → restart.
///
/// Cheap to clone; clones share one session. Created through
/// [`UpdateCoordinator::builder`], which also hands out the receiving end of
/// the event channel.
///
/// # Examples
///
/// ```rust,no_run
/// use taskquest_updater::config::AppPaths;
/// use taskquest_updater::upgrade::UpdateCoordinator;
///
/// # async fn example() -> anyhow::Result<()> {
/// let paths = AppPaths::resolve(None)?;
/// let (coordinator, mut events) = UpdateCoordinator::builder("1.2.4", paths).build().await;
///
/// tokio::spawn(async move {
///     while let Some(event) = events.recv().await {
///         println!("{}: {}", event.name(), event.payload());
///     }
/// });
///
/// let release = coordinator.check_for_updates().await?;
/// if release.has_update {
///     coordinator.download_and_install().await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct UpdateCoordinator {
    inner: Arc<Inner>,
}

/// Configures the collaborators of an [`UpdateCoordinator`].
pub struct CoordinatorBuilder {
    current_version: String,
    paths: AppPaths,
    source_factory: Option<SourceFactory>,
    installer: Option<Arc<dyn Installer>>,
    installer_kind: InstallerKind,
    process: Option<Arc<dyn ProcessControl>>,
    backups: Option<BackupManager>,
    startup_delay: Duration,
}

impl CoordinatorBuilder {
    /// Replace how release sources are created from the configuration.
    pub fn source_factory(mut self, factory: SourceFactory) -> Self {
        self.source_factory = Some(factory);
        self
    }

    /// Use a specific installer instance.
    pub fn installer(mut self, installer: Arc<dyn Installer>) -> Self {
        self.installer = Some(installer);
        self
    }

    /// Pick one of the built-in installers. Ignored when
    /// [`installer`](Self::installer) is set.
    pub fn installer_kind(mut self, kind: InstallerKind) -> Self {
        self.installer_kind = kind;
        self
    }

    pub fn process_control(mut self, process: Arc<dyn ProcessControl>) -> Self {
        self.process = Some(process);
        self
    }

    pub fn backup_manager(mut self, backups: BackupManager) -> Self {
        self.backups = Some(backups);
        self
    }

    /// Delay before the startup check fires.
    pub fn startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Load the configuration and assemble the coordinator.
    ///
    /// A missing or damaged configuration file yields the defaults.
    pub async fn build(self) -> (UpdateCoordinator, mpsc::UnboundedReceiver<UpdateEvent>) {
        let store = ConfigStore::new(self.paths.config_file());
        let config = store.load().await;
        let source_factory = self.source_factory.unwrap_or_else(default_source_factory);
        let source = source_factory(&config);
        let installer = self
            .installer
            .unwrap_or_else(|| installer_for(self.installer_kind, self.paths.updates_dir()));
        let backups = self.backups.unwrap_or_else(|| {
            BackupManager::new(self.paths.data_dir(), self.paths.backups_dir())
        });
        let (events, rx) = EventSender::channel();

        debug!(
            "Update coordinator for v{} using {} feed and {} installer",
            self.current_version,
            source.name(),
            installer.kind()
        );

        let inner = Inner {
            current_version: self.current_version,
            store,
            config: RwLock::new(config),
            source_factory,
            source: RwLock::new(source),
            installer,
            process: self.process.unwrap_or_else(|| Arc::new(SystemProcess::default())),
            backups,
            events,
            session: Mutex::new(()),
            state: RwLock::new(SessionState::Idle),
            latest: RwLock::new(None),
            last_checked_at: RwLock::new(None),
            staged: Mutex::new(None),
            timer: Mutex::new(None),
            startup: Mutex::new(None),
            startup_delay: self.startup_delay,
        };

        (
            UpdateCoordinator {
                inner: Arc::new(inner),
            },
            rx,
        )
    }
}

impl UpdateCoordinator {
    pub fn builder(current_version: impl Into<String>, paths: AppPaths) -> CoordinatorBuilder {
        CoordinatorBuilder {
            current_version: current_version.into(),
            paths,
            source_factory: None,
            installer: None,
            installer_kind: InstallerKind::default(),
            process: None,
            backups: None,
            startup_delay: STARTUP_CHECK_DELAY,
        }
    }

    pub fn current_version(&self) -> &str {
        &self.inner.current_version
    }

    pub async fn state(&self) -> SessionState {
        *self.inner.state.read().await
    }

    /// The descriptor from the most recent successful check.
    pub async fn latest(&self) -> Option<ReleaseDescriptor> {
        self.inner.latest.read().await.clone()
    }

    /// When the last successful check finished.
    pub async fn last_checked_at(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_checked_at.read().await
    }

    /// The artifact staged by the last successful download.
    pub async fn staged(&self) -> Option<DownloadedInfo> {
        self.inner.staged.lock().await.clone()
    }

    pub async fn get_config(&self) -> UpdateConfig {
        self.inner.config.read().await.clone()
    }

    /// Ask the configured feed for the latest release.
    ///
    /// # Errors
    ///
    /// `Busy` when another session runs, `UpdatesDisabled`, or whatever the
    /// release source reports.
    pub async fn check_for_updates(&self) -> Result<ReleaseDescriptor, UpdateError> {
        let _session = self.inner.session.try_lock().map_err(|_| UpdateError::Busy)?;
        self.check_locked().await
    }

    /// Download the latest release, checking first when needed.
    ///
    /// Takes a backup of the local state first when `autoBackup` is on; a
    /// failed backup aborts the update.
    ///
    /// # Errors
    ///
    /// `Busy`, `UpdatesDisabled`, `NoUpdateAvailable` when the check finds
    /// nothing newer (not emitted, the check already reported
    /// `update-not-available`), or any backup, download or verification
    /// failure.
    pub async fn download_and_install(&self) -> Result<DownloadedInfo, UpdateError> {
        let _session = self.inner.session.try_lock().map_err(|_| UpdateError::Busy)?;

        let config = self.get_config().await;
        if !config.enabled {
            return Err(self.fail(UpdateError::UpdatesDisabled).await);
        }

        let cached = self.latest().await.filter(|release| release.has_update);
        let release = match cached {
            Some(release) => release,
            None => self.check_locked().await?,
        };
        if !release.has_update {
            return Err(UpdateError::NoUpdateAvailable {
                current: self.inner.current_version.clone(),
            });
        }

        self.inner.staged.lock().await.take();
        match self.acquire(&release, &config).await {
            Ok(info) => Ok(info),
            Err(e) => Err(self.fail(e).await),
        }
    }

    /// Install the downloaded update and restart the application.
    ///
    /// In production this does not return on success: the process exits.
    pub async fn install_and_restart(&self) -> Result<(), UpdateError> {
        let _session = self.inner.session.try_lock().map_err(|_| UpdateError::Busy)?;

        self.set_state(SessionState::Installing).await;
        let staged = self.staged().await;
        info!("Installing update and restarting");

        match self
            .inner
            .installer
            .install_and_restart(staged.as_ref(), self.inner.process.as_ref())
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e).await),
        }
    }

    /// Take a backup outside of an update session.
    pub async fn create_backup(&self) -> Result<std::path::PathBuf, UpdateError> {
        match self.inner.backups.create_backup().await {
            Ok(path) => {
                self.inner.events.emit(UpdateEvent::BackupCreated(path.clone()));
                Ok(path)
            }
            Err(e) => {
                self.inner.events.emit(UpdateEvent::from_error(&e));
                Err(e)
            }
        }
    }

    pub fn backup_manager(&self) -> &BackupManager {
        &self.inner.backups
    }

    /// Merge `patch` into the configuration and persist it.
    ///
    /// Origin changes rebuild the release source and forget the release
    /// found through the old one; origin and scheduling changes re-arm or
    /// cancel the auto-check timer.
    ///
    /// # Errors
    ///
    /// `ConfigError` when the merged configuration is invalid (the previous
    /// one stays in effect), `FilesystemError` when it cannot be saved.
    pub async fn update_config(&self, patch: UpdateConfigPatch) -> Result<UpdateConfig, UpdateError> {
        let merged = {
            let mut config = self.inner.config.write().await;
            let merged = patch.apply(&config);
            merged.validate()?;
            self.inner.store.save(&merged).await?;
            *config = merged.clone();
            merged
        };
        info!("Update configuration changed");

        if patch.touches_origin() {
            self.replace_source(&merged).await;
        }
        if patch.touches_origin() || patch.touches_schedule() {
            self.arm_timer(&merged).await;
        }
        Ok(merged)
    }

    /// Replace the whole configuration with the defaults.
    pub async fn reset_config(&self) -> Result<UpdateConfig, UpdateError> {
        let defaults = UpdateConfig::default();
        self.inner.store.save(&defaults).await?;
        *self.inner.config.write().await = defaults.clone();
        self.replace_source(&defaults).await;
        self.arm_timer(&defaults).await;
        Ok(defaults)
    }

    /// Arm the periodic auto-check according to the configuration.
    pub async fn start(&self) {
        let config = self.get_config().await;
        self.arm_timer(&config).await;
    }

    /// Schedule the one-shot startup check.
    ///
    /// Only fires when updates and auto-check are on and the interval is
    /// `startup`. Returns whether a check was scheduled.
    pub async fn check_on_startup(&self) -> bool {
        let config = self.get_config().await;
        if !config.wants_auto_check() || config.check_interval != CheckInterval::OnStartup {
            return false;
        }

        let weak = Arc::downgrade(&self.inner);
        let delay = self.inner.startup_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            run_scheduled_check(&weak).await;
        });

        if let Some(previous) = self.inner.startup.lock().await.replace(handle) {
            previous.abort();
        }
        true
    }

    /// Whether a periodic auto-check is armed.
    pub async fn is_timer_armed(&self) -> bool {
        self.inner.timer.lock().await.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Cancel pending automatic checks.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.inner.timer.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.inner.startup.lock().await.take() {
            handle.abort();
        }
        debug!("Update coordinator shut down");
    }

    async fn check_locked(&self) -> Result<ReleaseDescriptor, UpdateError> {
        let config = self.get_config().await;
        if !config.enabled {
            return Err(self.fail(UpdateError::UpdatesDisabled).await);
        }

        self.set_state(SessionState::Checking).await;
        self.inner.events.emit(UpdateEvent::CheckingForUpdate);

        let source = self.inner.source.read().await.clone();
        let release = match source.fetch_latest(&config).await {
            Ok(release) => release.compared_to(&self.inner.current_version),
            Err(e) => {
                warn!("Update check via {} failed: {}", source.name(), e);
                return Err(self.fail(e).await);
            }
        };

        *self.inner.latest.write().await = Some(release.clone());
        *self.inner.last_checked_at.write().await = Some(Utc::now());

        if release.has_update {
            info!("Update available: {} -> {}", self.inner.current_version, release.version);
            self.set_state(SessionState::UpdateAvailable).await;
            self.inner.events.emit(UpdateEvent::UpdateAvailable(release.clone()));
        } else {
            info!("Already up to date ({})", self.inner.current_version);
            self.set_state(SessionState::UpToDate).await;
            self.inner.events.emit(UpdateEvent::UpdateNotAvailable(release.clone()));
        }
        Ok(release)
    }

    async fn acquire(
        &self,
        release: &ReleaseDescriptor,
        config: &UpdateConfig,
    ) -> Result<DownloadedInfo, UpdateError> {
        if config.auto_backup {
            let snapshot = self.inner.backups.create_backup().await?;
            self.inner.events.emit(UpdateEvent::BackupCreated(snapshot));
        }

        self.set_state(SessionState::Downloading).await;
        let mut progress = ProgressSink::new(self.inner.events.clone());
        let info = self.inner.installer.acquire(release, &mut progress).await?;

        *self.inner.staged.lock().await = Some(info.clone());
        self.set_state(SessionState::Downloaded).await;
        self.inner.events.emit(UpdateEvent::UpdateDownloaded(info.clone()));
        Ok(info)
    }

    async fn replace_source(&self, config: &UpdateConfig) {
        let source = (self.inner.source_factory)(config);
        debug!("Release source is now {}", source.name());
        *self.inner.source.write().await = source;
        self.inner.latest.write().await.take();
        self.inner.staged.lock().await.take();
    }

    async fn arm_timer(&self, config: &UpdateConfig) {
        if !config.wants_auto_check() || config.check_interval != CheckInterval::OnStartup {
            if let Some(startup) = self.inner.startup.lock().await.take() {
                debug!("Cancelling the pending startup check");
                startup.abort();
            }
        }

        let period = match config.check_interval {
            CheckInterval::Daily if config.wants_auto_check() => Some(DAILY_CHECK_PERIOD),
            CheckInterval::Weekly if config.wants_auto_check() => Some(WEEKLY_CHECK_PERIOD),
            _ => None,
        };

        let mut timer = self.inner.timer.lock().await;
        if let Some(previous) = timer.take() {
            previous.abort();
        }

        let Some(period) = period else {
            debug!("Automatic update checks are off ({})", config.check_interval.as_str());
            return;
        };

        debug!("Next automatic update check in {:?}", period);
        let weak = Arc::downgrade(&self.inner);
        *timer = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if !run_scheduled_check(&weak).await {
                    break;
                }
            }
        }));
    }

    async fn set_state(&self, state: SessionState) {
        *self.inner.state.write().await = state;
    }

    async fn fail(&self, err: UpdateError) -> UpdateError {
        self.set_state(SessionState::Error).await;
        self.inner.events.emit(UpdateEvent::from_error(&err));
        err
    }
}

// Returns false once the coordinator is gone.
async fn run_scheduled_check(inner: &Weak<Inner>) -> bool {
    let Some(inner) = inner.upgrade() else {
        return false;
    };
    let coordinator = UpdateCoordinator {
        inner,
    };
    match coordinator.check_for_updates().await {
        Ok(_) => {}
        Err(UpdateError::Busy) => debug!("Skipping automatic check, a session is running"),
        Err(e) if e.is_transient() => debug!("Automatic update check failed, retrying next interval: {}", e),
        Err(e) => warn!("Automatic update check failed: {}", e),
    }
    true
}
