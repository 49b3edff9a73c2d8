//! Remote feed against a stub GitHub API.

use std::time::Duration;

use taskquest_updater::test_utils::HttpStub;
use taskquest_updater::upgrade::{ReleaseSource, RemoteReleaseFeed, UpdateConfig};

use crate::common::github_release;

fn feed(stub: &HttpStub) -> RemoteReleaseFeed {
    RemoteReleaseFeed::new().with_api_base(stub.url()).with_request_delay(Duration::ZERO)
}

fn config() -> UpdateConfig {
    UpdateConfig {
        remote_owner: "guild".to_string(),
        remote_repo_name: "taskquest".to_string(),
        ..UpdateConfig::default()
    }
}

#[tokio::test]
async fn test_latest_release_is_parsed() {
    let stub = HttpStub::json(
        200,
        github_release("v1.4.0", "https://example.com/TaskQuest-1.4.0.AppImage", 4096),
    )
    .await;

    let release = feed(&stub).fetch_latest(&config()).await.unwrap();
    assert_eq!(release.version, "1.4.0");
    assert_eq!(release.release_notes, "Guild quests and a new XP curve");
    assert_eq!(release.download_size, 4096);
    assert_eq!(
        release.download_url.as_deref(),
        Some("https://example.com/TaskQuest-1.4.0.AppImage")
    );
    assert!(release.release_page_url.unwrap().ends_with("/releases/tag/v1.4.0"));
    assert!(!release.has_update, "the feed itself never compares versions");

    let requests = stub.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].starts_with("GET /repos/guild/taskquest/releases/latest "));
    assert!(requests[0].to_lowercase().contains("accept: application/vnd.github.v3+json"));
    assert!(!requests[0].to_lowercase().contains("authorization:"));
}

#[tokio::test]
async fn test_token_is_sent() {
    let stub = HttpStub::json(200, github_release("v1.4.0", "https://example.com/a", 1)).await;
    let config = UpdateConfig {
        remote_auth_token: Some("ghp_secret".to_string()),
        ..config()
    };

    feed(&stub).fetch_latest(&config).await.unwrap();
    assert!(stub.requests()[0].to_lowercase().contains("authorization: token ghp_secret"));
}

#[tokio::test]
async fn test_status_codes_map_to_errors() {
    for (status, code) in [
        (404, "not-found"),
        (401, "unauthorized"),
        (403, "rate-limited"),
        (502, "transport-error"),
    ] {
        let stub = HttpStub::json(status, r#"{"message":"nope"}"#).await;
        let err = feed(&stub).fetch_latest(&config()).await.unwrap_err();
        assert_eq!(err.code(), code, "HTTP {status}");
        assert_eq!(stub.requests().len(), 1, "no retry for HTTP {status}");
    }
}

#[tokio::test]
async fn test_garbage_body_is_malformed() {
    let stub = HttpStub::json(200, "<html>maintenance</html>").await;
    let err = feed(&stub).fetch_latest(&config()).await.unwrap_err();
    assert_eq!(err.code(), "malformed-response");
}

#[tokio::test]
async fn test_unreachable_host_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let feed = RemoteReleaseFeed::new()
        .with_api_base(url)
        .with_request_delay(Duration::ZERO)
        .with_timeout(Duration::from_secs(2));
    let err = feed.fetch_latest(&config()).await.unwrap_err();
    assert_eq!(err.code(), "transport-error");
}
