//! Full update sessions through the coordinator.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use taskquest_updater::config::AppPaths;
use taskquest_updater::test_utils::{
    FakeUrlOpener, HttpStub, ProcessCall, RecordingProcess, init_test_logging,
};
use taskquest_updater::upgrade::release::SourceFactory;
use taskquest_updater::upgrade::{
    BackupManager, ManualFallbackInstaller, NativeInstaller, ReleaseSource, RemoteReleaseFeed, SessionState, UpdateConfig,
    UpdateCoordinator, UpdateEvent,
};

use crate::common::{TestEnv, github_release};

const PAYLOAD: &[u8] = b"\x7fELF pretend this is TaskQuest 2.0.0";

fn remote_factory(api_base: String) -> SourceFactory {
    Arc::new(move |_: &UpdateConfig| -> Arc<dyn ReleaseSource> {
        Arc::new(
            RemoteReleaseFeed::new()
                .with_api_base(api_base.clone())
                .with_request_delay(Duration::ZERO),
        )
    })
}

fn drain(events: &mut mpsc::UnboundedReceiver<UpdateEvent>) -> Vec<UpdateEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

#[tokio::test]
async fn test_remote_release_download_and_install() {
    init_test_logging(None);
    let env = TestEnv::new();
    env.seed_app_state();
    let paths = AppPaths::new(&env.data_dir);

    let artifact = HttpStub::bytes(200, PAYLOAD.to_vec()).await;
    let asset_url = format!("{}/download/v2.0.0/TaskQuest-2.0.0.AppImage", artifact.url());
    let api = HttpStub::json(200, github_release("v2.0.0", &asset_url, PAYLOAD.len())).await;

    let process = Arc::new(RecordingProcess::default());
    let (coordinator, mut events) = UpdateCoordinator::builder("1.9.3", paths.clone())
        .source_factory(remote_factory(api.url()))
        .installer(Arc::new(NativeInstaller::new(paths.updates_dir())))
        .process_control(process.clone())
        .build()
        .await;

    let release = coordinator.check_for_updates().await.unwrap();
    assert!(release.has_update);
    assert_eq!(coordinator.state().await, SessionState::UpdateAvailable);

    let info = coordinator.download_and_install().await.unwrap();
    let staged = info.path.clone().unwrap();
    assert_eq!(staged, paths.updates_dir().join("TaskQuest-2.0.0.AppImage"));
    assert_eq!(std::fs::read(&staged).unwrap(), PAYLOAD);
    assert_eq!(coordinator.state().await, SessionState::Downloaded);

    // The cached check result is reused, so the API is asked only once.
    assert_eq!(api.requests().len(), 1);
    assert_eq!(artifact.requests().len(), 1);

    let emitted = drain(&mut events);
    let names: Vec<&str> = emitted.iter().map(UpdateEvent::name).collect();
    let backup_at = names.iter().position(|n| *n == "backup-created").unwrap();
    let first_progress = names.iter().position(|n| *n == "download-progress").unwrap();
    assert!(backup_at < first_progress, "backup must precede the download: {names:?}");
    assert_eq!(names.last(), Some(&"update-downloaded"));

    let snapshots = coordinator.backup_manager().list_snapshots().await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(
        std::fs::read(snapshots[0].path.join("database.db")).unwrap(),
        b"level 7 questlog"
    );

    coordinator.install_and_restart().await.unwrap();
    assert_eq!(process.calls(), vec![ProcessCall::Launch(staged), ProcessCall::Exit(0)]);
}

#[tokio::test]
async fn test_failed_backup_blocks_download() {
    let env = TestEnv::new();
    env.seed_app_state();
    let paths = AppPaths::new(&env.data_dir);
    let blocker = env.path().join("not-a-directory");
    std::fs::write(&blocker, b"").unwrap();

    let artifact = HttpStub::bytes(200, PAYLOAD.to_vec()).await;
    let asset_url = format!("{}/TaskQuest-2.0.0.AppImage", artifact.url());
    let api = HttpStub::json(200, github_release("v2.0.0", &asset_url, PAYLOAD.len())).await;

    let (coordinator, mut events) = UpdateCoordinator::builder("1.9.3", paths.clone())
        .source_factory(remote_factory(api.url()))
        .installer(Arc::new(NativeInstaller::new(paths.updates_dir())))
        .backup_manager(BackupManager::new(&env.data_dir, &blocker))
        .process_control(Arc::new(RecordingProcess::default()))
        .build()
        .await;

    let err = coordinator.download_and_install().await.unwrap_err();
    assert_eq!(err.code(), "filesystem-error");
    assert_eq!(coordinator.state().await, SessionState::Error);
    assert!(artifact.requests().is_empty(), "nothing may be downloaded without a backup");

    let names: Vec<&str> = drain(&mut events).iter().map(UpdateEvent::name).collect();
    assert_eq!(names, vec!["checking-for-update", "update-available", "error"]);
}

#[tokio::test]
async fn test_failed_download_is_reported_once() {
    let env = TestEnv::new();
    let paths = AppPaths::new(&env.data_dir);

    let artifact = HttpStub::bytes(500, b"oops".to_vec()).await;
    let asset_url = format!("{}/TaskQuest-2.0.0.AppImage", artifact.url());
    let api = HttpStub::json(200, github_release("v2.0.0", &asset_url, PAYLOAD.len())).await;

    let (coordinator, mut events) = UpdateCoordinator::builder("1.9.3", paths.clone())
        .source_factory(remote_factory(api.url()))
        .installer(Arc::new(NativeInstaller::new(paths.updates_dir())))
        .process_control(Arc::new(RecordingProcess::default()))
        .build()
        .await;

    let err = coordinator.download_and_install().await.unwrap_err();
    assert_eq!(err.code(), "transport-error");
    assert!(coordinator.staged().await.is_none());
    assert!(!paths.updates_dir().join("TaskQuest-2.0.0.part").exists());

    let errors = drain(&mut events).into_iter().filter(|e| e.name() == "error").count();
    assert_eq!(errors, 1);

    // A later session may start again.
    let release = coordinator.check_for_updates().await.unwrap();
    assert_eq!(release.version, "2.0.0");
}

#[tokio::test]
async fn test_release_without_assets_is_not_downloaded() {
    let env = TestEnv::new();
    let paths = AppPaths::new(&env.data_dir);
    let api = HttpStub::json(
        200,
        serde_json::json!({
            "tag_name": "v9.0.0",
            "html_url": "https://github.com/o/r/releases/tag/v9.0.0",
            "assets": []
        })
        .to_string(),
    )
    .await;

    let opener = Arc::new(FakeUrlOpener::default());
    let installer = NativeInstaller::new(paths.updates_dir()).with_fallback(
        ManualFallbackInstaller::new().with_pause(Duration::ZERO).with_opener(opener.clone()),
    );
    let process = Arc::new(RecordingProcess::default());
    let (coordinator, mut events) = UpdateCoordinator::builder("1.9.3", paths.clone())
        .source_factory(remote_factory(api.url()))
        .installer(Arc::new(installer))
        .process_control(process.clone())
        .build()
        .await;

    let info = coordinator.download_and_install().await.unwrap();
    assert!(info.path.is_none());
    assert_eq!(opener.opened(), vec!["https://github.com/o/r/releases/tag/v9.0.0".to_string()]);
    assert!(!paths.updates_dir().exists(), "the release page must not be staged");

    let names: Vec<&str> = drain(&mut events).iter().map(UpdateEvent::name).collect();
    assert_eq!(names.last(), Some(&"update-downloaded"));

    coordinator.install_and_restart().await.unwrap();
    assert_eq!(process.calls(), vec![ProcessCall::Relaunch, ProcessCall::Exit(0)]);
}
