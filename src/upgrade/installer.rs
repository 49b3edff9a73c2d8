//! Artifact acquisition and installation strategies.
//!
//! The coordinator owns the session (backup, events, state) and delegates
//! the platform work to an [`Installer`] chosen when it is constructed:
//!
//! - [`NativeInstaller`] downloads the release artifact into the staging
//!   directory with byte-level progress, verifies its digest, and on
//!   install launches it and exits. Releases without an artifact are handed
//!   to its manual fallback.
//! - [`ManualFallbackInstaller`] is for platforms without an installable
//!   artifact. It shows staged progress, opens the release page for the
//!   user, and on install simply relaunches the application.
//!
//! Process control sits behind [`ProcessControl`] so tests can observe a
//! restart without the test process exiting.

use async_trait::async_trait;
use futures::StreamExt;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::constants::{
    COPY_CHUNK_SIZE, MANUAL_OPEN_FAILED_MESSAGE, MANUAL_PROGRESS_STAGES, MANUAL_SETTLE_DELAY,
    MANUAL_UPDATE_MESSAGE,
    REMOTE_REQUEST_TIMEOUT, USER_AGENT,
};
use crate::core::UpdateError;
use crate::upgrade::events::{DownloadedInfo, ProgressSink};
use crate::upgrade::release::ReleaseDescriptor;
use crate::upgrade::verification::ChecksumVerifier;

/// Restart capability handed to installers.
pub trait ProcessControl: Send + Sync {
    /// Start a fresh instance of the desktop application.
    fn relaunch(&self) -> Result<(), UpdateError>;

    /// Start a downloaded installer.
    fn launch(&self, program: &Path) -> Result<(), UpdateError>;

    /// Terminate the current process.
    fn exit(&self, code: i32);
}

/// [`ProcessControl`] backed by `std::process`.
///
/// `relaunch` starts the configured desktop application. The updater never
/// restarts itself: its own command line would run the update again.
#[derive(Debug, Clone, Default)]
pub struct SystemProcess {
    app_exe: Option<PathBuf>,
}

impl SystemProcess {
    pub fn new(app_exe: Option<PathBuf>) -> Self {
        Self {
            app_exe,
        }
    }

    pub fn app_exe(&self) -> Option<&Path> {
        self.app_exe.as_deref()
    }
}

impl ProcessControl for SystemProcess {
    fn relaunch(&self) -> Result<(), UpdateError> {
        let exe = self.app_exe.as_deref().ok_or_else(|| UpdateError::ConfigError {
            message: "the application executable to restart is unknown \
                      (pass --app-exe or set TASKQUEST_APP_EXE)"
                .to_string(),
        })?;

        let current = std::env::current_exe().and_then(|me| me.canonicalize());
        let is_updater = match (current, exe.canonicalize()) {
            (Ok(me), Ok(target)) => me == target,
            _ => false,
        };
        if is_updater {
            return Err(UpdateError::ConfigError {
                message: format!("{} is the updater itself, not the application", exe.display()),
            });
        }

        info!("Relaunching {}", exe.display());
        std::process::Command::new(exe)
            .spawn()
            .map(|_| ())
            .map_err(|e| UpdateError::filesystem("relaunch", exe, &e))
    }

    fn launch(&self, program: &Path) -> Result<(), UpdateError> {
        info!("Launching installer {}", program.display());
        std::process::Command::new(program)
            .spawn()
            .map(|_| ())
            .map_err(|e| UpdateError::filesystem("launch installer", program, &e))
    }

    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

/// Opens a URL for the user.
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<(), UpdateError>;
}

/// [`UrlOpener`] using the desktop's default browser.
#[derive(Debug, Clone, Default)]
pub struct SystemUrlOpener;

impl UrlOpener for SystemUrlOpener {
    fn open(&self, url: &str) -> Result<(), UpdateError> {
        open::that(url).map_err(|e| UpdateError::Other {
            message: format!("failed to open {url}: {e}"),
        })
    }
}

/// Which installer strategy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallerKind {
    #[default]
    Native,
    Manual,
}

impl InstallerKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for InstallerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallerKind {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "native" => Ok(Self::Native),
            "manual" => Ok(Self::Manual),
            other => Err(UpdateError::ConfigError {
                message: format!("unknown installer '{other}' (expected native or manual)"),
            }),
        }
    }
}

/// Platform strategy for getting a release onto the machine.
#[async_trait]
pub trait Installer: Send + Sync {
    fn kind(&self) -> InstallerKind;

    /// Obtain the release, reporting progress through `progress`.
    ///
    /// Implementations must leave the sink at 100% on success.
    async fn acquire(
        &self,
        release: &ReleaseDescriptor,
        progress: &mut ProgressSink,
    ) -> Result<DownloadedInfo, UpdateError>;

    /// Install what [`acquire`](Self::acquire) produced and restart.
    async fn install_and_restart(
        &self,
        staged: Option<&DownloadedInfo>,
        process: &dyn ProcessControl,
    ) -> Result<(), UpdateError>;
}

/// Build the installer for `kind`.
pub fn installer_for(kind: InstallerKind, staging_dir: impl Into<PathBuf>) -> Arc<dyn Installer> {
    match kind {
        InstallerKind::Native => Arc::new(NativeInstaller::new(staging_dir)),
        InstallerKind::Manual => Arc::new(ManualFallbackInstaller::new()),
    }
}

/// Downloads the release artifact and runs it.
///
/// `http://` and `https://` URLs are streamed with reqwest; anything else is
/// treated as a filesystem path (with an optional `file://` prefix), which is
/// what local feeds produce. A release that only links its release page is
/// never downloaded; the manual fallback opens the page instead.
pub struct NativeInstaller {
    staging_dir: PathBuf,
    fallback: ManualFallbackInstaller,
}

impl NativeInstaller {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            fallback: ManualFallbackInstaller::new(),
        }
    }

    /// Replace the installer used for releases without an artifact.
    pub fn with_fallback(mut self, fallback: ManualFallbackInstaller) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    fn artifact_name(url: &str, version: &str) -> String {
        let trimmed = url.split(['?', '#']).next().unwrap_or(url);
        trimmed
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty() && *name != "latest")
            .map_or_else(|| format!("taskquest-{version}"), str::to_string)
    }

    async fn download(
        &self,
        url: &str,
        expected_size: u64,
        target: &Path,
        progress: &mut ProgressSink,
    ) -> Result<u64, UpdateError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(REMOTE_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| UpdateError::transport(format!("failed to create HTTP client: {e}")))?;

        let response = client.get(url).send().await.map_err(UpdateError::transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::transport(format!("download failed with status {status}")));
        }

        let total = response.content_length().unwrap_or(expected_size);
        let mut file = fs::File::create(target)
            .await
            .map_err(|e| UpdateError::filesystem("create artifact", target, &e))?;

        let mut stream = response.bytes_stream();
        let mut transferred = 0u64;
        progress.report_bytes(0, total);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(UpdateError::transport)?;
            file.write_all(&chunk)
                .await
                .map_err(|e| UpdateError::filesystem("write artifact", target, &e))?;
            transferred += chunk.len() as u64;
            progress.report_bytes(transferred, total);
        }
        file.flush().await.map_err(|e| UpdateError::filesystem("write artifact", target, &e))?;

        Ok(transferred)
    }

    async fn copy_local(
        &self,
        source: &Path,
        target: &Path,
        progress: &mut ProgressSink,
    ) -> Result<u64, UpdateError> {
        let mut input = fs::File::open(source).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                UpdateError::NotFound {
                    resource: source.display().to_string(),
                }
            } else {
                UpdateError::filesystem("open artifact", source, &e)
            }
        })?;
        let total = input
            .metadata()
            .await
            .map_err(|e| UpdateError::filesystem("read artifact metadata", source, &e))?
            .len();
        let mut output = fs::File::create(target)
            .await
            .map_err(|e| UpdateError::filesystem("create artifact", target, &e))?;

        let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
        let mut transferred = 0u64;
        progress.report_bytes(0, total);
        loop {
            let read = input
                .read(&mut buffer)
                .await
                .map_err(|e| UpdateError::filesystem("read artifact", source, &e))?;
            if read == 0 {
                break;
            }
            output
                .write_all(&buffer[..read])
                .await
                .map_err(|e| UpdateError::filesystem("write artifact", target, &e))?;
            transferred += read as u64;
            progress.report_bytes(transferred, total);
        }
        output.flush().await.map_err(|e| UpdateError::filesystem("write artifact", target, &e))?;

        Ok(transferred)
    }
}

#[async_trait]
impl Installer for NativeInstaller {
    fn kind(&self) -> InstallerKind {
        InstallerKind::Native
    }

    async fn acquire(
        &self,
        release: &ReleaseDescriptor,
        progress: &mut ProgressSink,
    ) -> Result<DownloadedInfo, UpdateError> {
        let url = match release.download_url.as_deref() {
            Some(url) if release.has_artifact => url,
            _ => {
                info!(
                    "Release {} has no installable artifact, using the release page",
                    release.version
                );
                return self.fallback.acquire(release, progress).await;
            }
        };

        fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|e| UpdateError::filesystem("create staging directory", &self.staging_dir, &e))?;

        let target = self.staging_dir.join(Self::artifact_name(url, &release.version));
        let partial = target.with_extension("part");
        info!("Downloading {} to {}", url, target.display());

        let result = if url.starts_with("http://") || url.starts_with("https://") {
            self.download(url, release.download_size, &partial, progress).await
        } else {
            let source = Path::new(url.strip_prefix("file://").unwrap_or(url));
            self.copy_local(source, &partial, progress).await
        };

        let transferred = match result {
            Ok(transferred) => transferred,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        if let Some(expected) = release.sha256.as_deref() {
            if let Err(e) = ChecksumVerifier::verify_checksum(&partial, expected).await {
                let _ = fs::remove_file(&partial).await;
                return Err(e);
            }
        }

        fs::rename(&partial, &target)
            .await
            .map_err(|e| UpdateError::filesystem("stage artifact", &target, &e))?;

        progress.finish(transferred);
        debug!("Staged {} bytes at {}", transferred, target.display());

        Ok(DownloadedInfo {
            version: release.version.clone(),
            message: "Update downloaded. Restart to install.".to_string(),
            url: Some(url.to_string()),
            path: Some(target),
        })
    }

    async fn install_and_restart(
        &self,
        staged: Option<&DownloadedInfo>,
        process: &dyn ProcessControl,
    ) -> Result<(), UpdateError> {
        let staged = staged.ok_or(UpdateError::NotYetChecked)?;
        let Some(artifact) = staged.path.as_deref() else {
            // Acquired through the release page.
            return self.fallback.install_and_restart(Some(staged), process).await;
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let perms = std::fs::Permissions::from_mode(0o755);
            fs::set_permissions(artifact, perms)
                .await
                .map_err(|e| UpdateError::filesystem("mark artifact executable", artifact, &e))?;
        }

        // A failed launch still restarts so the user is not left without the app.
        if let Err(e) = process.launch(artifact) {
            warn!("Installer launch failed, restarting instead: {}", e);
            process.relaunch()?;
        }
        process.exit(0);
        Ok(())
    }
}

/// Points the user at the release page instead of installing anything.
pub struct ManualFallbackInstaller {
    stages: Vec<(u8, Duration)>,
    settle: Duration,
    opener: Arc<dyn UrlOpener>,
}

impl Default for ManualFallbackInstaller {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualFallbackInstaller {
    pub fn new() -> Self {
        Self {
            stages: MANUAL_PROGRESS_STAGES
                .iter()
                .map(|&(percent, pause)| (percent, Duration::from_millis(pause)))
                .collect(),
            settle: MANUAL_SETTLE_DELAY,
            opener: Arc::new(SystemUrlOpener),
        }
    }

    pub fn with_opener(mut self, opener: Arc<dyn UrlOpener>) -> Self {
        self.opener = opener;
        self
    }

    /// Replace every pause with `pause`.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        for stage in &mut self.stages {
            stage.1 = pause;
        }
        self.settle = pause;
        self
    }
}

#[async_trait]
impl Installer for ManualFallbackInstaller {
    fn kind(&self) -> InstallerKind {
        InstallerKind::Manual
    }

    async fn acquire(
        &self,
        release: &ReleaseDescriptor,
        progress: &mut ProgressSink,
    ) -> Result<DownloadedInfo, UpdateError> {
        for &(percent, pause) in &self.stages {
            progress.report_stage(percent);
            tokio::time::sleep(pause).await;
        }

        let url = release
            .release_page_url
            .clone()
            .or_else(|| release.download_url.clone())
            .ok_or_else(|| {
                UpdateError::malformed(format!("release {} has no page to open", release.version))
            })?;

        info!("Opening release page {}", url);
        let message = match self.opener.open(&url) {
            Ok(()) => MANUAL_UPDATE_MESSAGE.to_string(),
            Err(e) => {
                warn!("Could not open the release page: {}", e);
                format!("{MANUAL_OPEN_FAILED_MESSAGE} {url}")
            }
        };

        progress.report_stage(100);
        tokio::time::sleep(self.settle).await;

        Ok(DownloadedInfo {
            version: release.version.clone(),
            message,
            url: Some(url),
            path: None,
        })
    }

    async fn install_and_restart(
        &self,
        _staged: Option<&DownloadedInfo>,
        process: &dyn ProcessControl,
    ) -> Result<(), UpdateError> {
        info!("Manual update mode: restarting application");
        process.relaunch()?;
        process.exit(0);
        Ok(())
    }
}
