//! The JSON-lines bridge as the UI process sees it.

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf,
};
use tokio::task::JoinHandle;

use taskquest_updater::bridge::{NotificationBridge, stdio};
use taskquest_updater::config::AppPaths;
use taskquest_updater::test_utils::FakeReleaseSource;
use taskquest_updater::upgrade::UpdateCoordinator;

use crate::common::TestEnv;

struct Client {
    writer: WriteHalf<DuplexStream>,
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    server: JoinHandle<anyhow::Result<()>>,
    _forwarder: JoinHandle<()>,
}

impl Client {
    async fn start(env: &TestEnv, source: FakeReleaseSource) -> Self {
        let (coordinator, events) =
            UpdateCoordinator::builder("1.0.0", AppPaths::new(&env.data_dir))
                .source_factory(Arc::new(source).factory())
                .build()
                .await;
        let bridge = NotificationBridge::new(coordinator);
        let forwarder = bridge.spawn_forwarder(events);

        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_side);
        let server = tokio::spawn(stdio::serve(bridge, BufReader::new(server_read), server_write));

        let (client_read, writer) = tokio::io::split(client_side);
        Self {
            writer,
            lines: BufReader::new(client_read).lines(),
            server,
            _forwarder: forwarder,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    async fn next(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("bridge went quiet")
            .unwrap()
            .expect("bridge closed its output");
        serde_json::from_str(&line).unwrap()
    }

    /// Read lines until the response for `id`, returning it and the events seen.
    async fn response(&mut self, id: Value) -> (Value, Vec<Value>) {
        let mut events = Vec::new();
        loop {
            let line = self.next().await;
            if line.get("event").is_some() {
                events.push(line);
            } else if line["id"] == id {
                return (line, events);
            }
        }
    }

    async fn close(mut self) {
        self.writer.shutdown().await.unwrap();
        self.server.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_check_round_trip_with_events() {
    let env = TestEnv::new();
    let mut client = Client::start(&env, FakeReleaseSource::releasing("1.2.0")).await;

    client.send(r#"{"id":1,"command":"check"}"#).await;
    let (response, mut events) = client.response(json!(1)).await;
    assert_eq!(response["ok"], true);
    assert_eq!(response["result"]["version"], "1.2.0");
    assert_eq!(response["result"]["hasUpdate"], true);

    while events.len() < 2 {
        events.push(client.next().await);
    }
    assert_eq!(events[0]["event"], "checking-for-update");
    assert_eq!(events[1]["event"], "update-available");
    assert_eq!(events[1]["payload"]["version"], "1.2.0");

    client.close().await;
}

#[tokio::test]
async fn test_errors_are_reported_per_request() {
    let env = TestEnv::new();
    let mut client = Client::start(&env, FakeReleaseSource::releasing("1.0.0")).await;

    client.send("this is not json").await;
    let (response, _) = client.response(Value::Null).await;
    assert_eq!(response["ok"], false);
    assert_eq!(response["error"]["code"], "invalid-arguments");

    client.send(r#"{"id":"a","command":"open-external-link"}"#).await;
    let (response, _) = client.response(json!("a")).await;
    assert_eq!(response["error"]["code"], "unknown-command");

    client.send(r#"{"id":"b","command":"update-config","args":{"checkInterval":"hourly"}}"#).await;
    let (response, _) = client.response(json!("b")).await;
    assert_eq!(response["error"]["code"], "invalid-arguments");

    // The bridge keeps serving after bad requests.
    client.send(r#"{"id":"c","command":"get-config"}"#).await;
    let (response, _) = client.response(json!("c")).await;
    assert_eq!(response["ok"], true);
    assert_eq!(response["result"]["checkInterval"], "weekly");

    client.close().await;
}

#[tokio::test]
async fn test_config_changes_persist() {
    let env = TestEnv::new();
    let mut client = Client::start(&env, FakeReleaseSource::releasing("1.0.0")).await;

    client
        .send(r#"{"id":1,"command":"update-config","args":{"checkInterval":"manual","autoBackup":false}}"#)
        .await;
    let (response, _) = client.response(json!(1)).await;
    assert_eq!(response["result"]["checkInterval"], "manual");
    client.close().await;

    let stored: Value = serde_json::from_str(
        &std::fs::read_to_string(env.data_dir.join("update-config.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(stored["checkInterval"], "manual");
    assert_eq!(stored["autoBackup"], false);
}

#[tokio::test]
async fn test_last_check_and_backup_commands() {
    let env = TestEnv::new();
    env.seed_app_state();
    let mut client = Client::start(&env, FakeReleaseSource::releasing("1.0.0")).await;

    client.send(r#"{"id":1,"command":"get-last-update-check"}"#).await;
    let (response, _) = client.response(json!(1)).await;
    assert_eq!(response["result"], Value::Null);

    client.send(r#"{"id":2,"command":"check"}"#).await;
    let (response, _) = client.response(json!(2)).await;
    assert_eq!(response["result"]["hasUpdate"], false);

    client.send(r#"{"id":3,"command":"get-last-update-check"}"#).await;
    let (response, _) = client.response(json!(3)).await;
    let at = response["result"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(at).is_ok());

    client.send(r#"{"id":4,"command":"create-backup"}"#).await;
    let (response, _) = client.response(json!(4)).await;
    let snapshot = std::path::PathBuf::from(response["result"].as_str().unwrap());
    assert!(snapshot.join("database.db").exists());

    client.close().await;
}
