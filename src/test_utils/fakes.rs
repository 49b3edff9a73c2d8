//! In-memory stand-ins for the coordinator's collaborators.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::bridge::UiSurface;
use crate::core::UpdateError;
use crate::upgrade::config::UpdateConfig;
use crate::upgrade::installer::{ProcessControl, UrlOpener};
use crate::upgrade::release::{ReleaseDescriptor, ReleaseSource, SourceFactory};

/// A release descriptor for `version` with a release page and no artifact.
pub fn release(version: &str) -> ReleaseDescriptor {
    ReleaseDescriptor {
        version: version.to_string(),
        release_notes: format!("Release {version}"),
        release_date: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        download_size: 0,
        has_update: false,
        download_url: None,
        has_artifact: false,
        release_page_url: Some(format!("https://example.com/releases/{version}")),
        sha256: None,
    }
}

/// Release source answering with a canned result.
pub struct FakeReleaseSource {
    response: Mutex<Result<ReleaseDescriptor, UpdateError>>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl FakeReleaseSource {
    pub fn releasing(version: &str) -> Self {
        Self::with_response(Ok(release(version)))
    }

    pub fn failing(error: UpdateError) -> Self {
        Self::with_response(Err(error))
    }

    pub fn with_response(response: Result<ReleaseDescriptor, UpdateError>) -> Self {
        Self {
            response: Mutex::new(response),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Block every fetch until `gate` is notified.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn set_response(&self, response: Result<ReleaseDescriptor, UpdateError>) {
        *self.response.lock().unwrap() = response;
    }

    /// Number of fetches started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// A factory that always hands out this source.
    pub fn factory(self: Arc<Self>) -> SourceFactory {
        Arc::new(move |_: &UpdateConfig| -> Arc<dyn ReleaseSource> { self.clone() })
    }
}

#[async_trait]
impl ReleaseSource for FakeReleaseSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn fetch_latest(&self, _config: &UpdateConfig) -> Result<ReleaseDescriptor, UpdateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.response.lock().unwrap().clone()
    }
}

/// What a [`RecordingProcess`] was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessCall {
    Relaunch,
    Launch(PathBuf),
    Exit(i32),
}

/// Process control that records calls instead of acting on them.
#[derive(Debug, Default)]
pub struct RecordingProcess {
    calls: Mutex<Vec<ProcessCall>>,
}

impl RecordingProcess {
    pub fn calls(&self) -> Vec<ProcessCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl ProcessControl for RecordingProcess {
    fn relaunch(&self) -> Result<(), UpdateError> {
        self.calls.lock().unwrap().push(ProcessCall::Relaunch);
        Ok(())
    }

    fn launch(&self, program: &Path) -> Result<(), UpdateError> {
        self.calls.lock().unwrap().push(ProcessCall::Launch(program.to_path_buf()));
        Ok(())
    }

    fn exit(&self, code: i32) {
        self.calls.lock().unwrap().push(ProcessCall::Exit(code));
    }
}

/// URL opener that remembers what it was asked to open.
#[derive(Debug, Default)]
pub struct FakeUrlOpener {
    opened: Mutex<Vec<String>>,
    fail: bool,
}

impl FakeUrlOpener {
    /// An opener that records the URL and then fails, as on a machine
    /// without a browser.
    pub fn failing() -> Self {
        Self {
            opened: Mutex::default(),
            fail: true,
        }
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl UrlOpener for FakeUrlOpener {
    fn open(&self, url: &str) -> Result<(), UpdateError> {
        self.opened.lock().unwrap().push(url.to_string());
        if self.fail {
            return Err(UpdateError::Other {
                message: format!("failed to open {url}: no browser available"),
            });
        }
        Ok(())
    }
}

/// UI surface collecting every delivered event.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    sent: Mutex<Vec<(String, Value)>>,
}

impl RecordingSurface {
    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().unwrap().clone()
    }
}

impl UiSurface for RecordingSurface {
    fn send(&self, event: &str, payload: Value) {
        self.sent.lock().unwrap().push((event.to_string(), payload));
    }
}
