use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::trace;

use crate::core::UpdateError;
use crate::upgrade::release::ReleaseDescriptor;

/// Download progress snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Completion in percent, 0..=100.
    pub percent: u8,
    /// Bytes received so far (or stage units for synthetic progress).
    pub transferred: u64,
    /// Expected total (or 100 for synthetic progress).
    pub total: u64,
    /// Average transfer rate since the download started.
    pub bytes_per_second: u64,
}

/// Outcome of a successful download/acquisition step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadedInfo {
    /// Version that was acquired.
    pub version: String,
    /// Follow-up instructions for the user.
    pub message: String,
    /// Release page or artifact URL, when relevant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Staged artifact, when one was downloaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Lifecycle notifications emitted by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateEvent {
    CheckingForUpdate,
    UpdateAvailable(ReleaseDescriptor),
    UpdateNotAvailable(ReleaseDescriptor),
    DownloadProgress(ProgressEvent),
    UpdateDownloaded(DownloadedInfo),
    Error {
        code: &'static str,
        message: String,
    },
    BackupCreated(PathBuf),
}

impl UpdateEvent {
    /// Channel name delivered to the UI.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CheckingForUpdate => "checking-for-update",
            Self::UpdateAvailable(_) => "update-available",
            Self::UpdateNotAvailable(_) => "update-not-available",
            Self::DownloadProgress(_) => "download-progress",
            Self::UpdateDownloaded(_) => "update-downloaded",
            Self::Error {
                ..
            } => "error",
            Self::BackupCreated(_) => "backup-created",
        }
    }

    /// JSON payload delivered with the event.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::CheckingForUpdate => Value::Null,
            Self::UpdateAvailable(release) | Self::UpdateNotAvailable(release) => {
                serde_json::to_value(release).unwrap_or(Value::Null)
            }
            Self::DownloadProgress(progress) => {
                serde_json::to_value(progress).unwrap_or(Value::Null)
            }
            Self::UpdateDownloaded(info) => serde_json::to_value(info).unwrap_or(Value::Null),
            Self::Error {
                code,
                message,
            } => json!({ "code": code, "message": message }),
            Self::BackupCreated(path) => Value::String(path.display().to_string()),
        }
    }

    pub(crate) fn from_error(err: &UpdateError) -> Self {
        Self::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Sending half of the coordinator's event channel.
///
/// Sends never fail: once the receiver is gone, events are dropped.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<UpdateEvent>,
}

impl EventSender {
    pub fn new(tx: mpsc::UnboundedSender<UpdateEvent>) -> Self {
        Self {
            tx,
        }
    }

    /// Create a sender together with its receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UpdateEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: UpdateEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            trace!("Dropping '{}' event, no listener", name);
        }
    }
}

/// Emits a non-decreasing sequence of [`ProgressEvent`]s for one attempt.
pub struct ProgressSink {
    events: EventSender,
    last_percent: Option<u8>,
    started: Instant,
}

impl ProgressSink {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            last_percent: None,
            started: Instant::now(),
        }
    }

    /// Report byte-level progress. A zero `total` means the size is unknown.
    ///
    /// Only emits when the percentage moves, so callers may report every
    /// chunk.
    pub fn report_bytes(&mut self, transferred: u64, total: u64) {
        let percent = if total == 0 {
            0
        } else {
            ((transferred.min(total) * 100) / total) as u8
        };
        if self.last_percent.is_some_and(|last| percent <= last) {
            return;
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 { (transferred as f64 / elapsed) as u64 } else { 0 };
        self.emit(percent, transferred, total, rate);
    }

    /// Report a synthetic stage percentage.
    pub fn report_stage(&mut self, percent: u8) {
        self.emit(percent, u64::from(percent), 100, 0);
    }

    /// Emit the closing 100% event unless it was already sent.
    pub fn finish(&mut self, total: u64) {
        if self.last_percent != Some(100) {
            let total = total.max(1);
            self.emit(100, total, total, 0);
        }
    }

    #[must_use]
    pub const fn last_percent(&self) -> Option<u8> {
        self.last_percent
    }

    fn emit(&mut self, percent: u8, transferred: u64, total: u64, bytes_per_second: u64) {
        let percent = percent.min(100).max(self.last_percent.unwrap_or(0));
        self.last_percent = Some(percent);
        self.events.emit(UpdateEvent::DownloadProgress(ProgressEvent {
            percent,
            transferred,
            total,
            bytes_per_second,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<UpdateEvent>) -> Vec<UpdateEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn percents(events: &[UpdateEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                UpdateEvent::DownloadProgress(p) => Some(p.percent),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_progress_never_decreases() {
        let (events, mut rx) = EventSender::channel();
        let mut sink = ProgressSink::new(events);
        sink.report_stage(40);
        sink.report_stage(20);
        sink.report_bytes(10, 100);
        sink.finish(100);

        assert_eq!(percents(&drain(&mut rx)), vec![40, 40, 100]);
    }

    #[test]
    fn test_finish_does_not_repeat_100() {
        let (events, mut rx) = EventSender::channel();
        let mut sink = ProgressSink::new(events);
        sink.report_bytes(50, 100);
        sink.report_bytes(50, 100);
        sink.report_bytes(100, 100);
        sink.finish(100);

        assert_eq!(percents(&drain(&mut rx)), vec![50, 100]);
    }

    #[test]
    fn test_unknown_total_reports_zero_until_finish() {
        let (events, mut rx) = EventSender::channel();
        let mut sink = ProgressSink::new(events);
        sink.report_bytes(4096, 0);
        sink.finish(4096);

        let events = drain(&mut rx);
        assert_eq!(percents(&events), vec![0, 100]);
        match events.last() {
            Some(UpdateEvent::DownloadProgress(p)) => assert_eq!(p.total, 4096),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_event_names_and_payloads() {
        let err = UpdateEvent::from_error(&UpdateError::RateLimited);
        assert_eq!(err.name(), "error");
        assert_eq!(err.payload()["code"], "rate-limited");

        let progress = UpdateEvent::DownloadProgress(ProgressEvent {
            percent: 15,
            transferred: 15,
            total: 100,
            bytes_per_second: 0,
        });
        assert_eq!(progress.name(), "download-progress");
        assert_eq!(progress.payload()["bytesPerSecond"], 0);

        assert_eq!(UpdateEvent::CheckingForUpdate.payload(), Value::Null);
        assert_eq!(
            UpdateEvent::BackupCreated(PathBuf::from("/b/backup-1")).payload(),
            Value::String("/b/backup-1".to_string())
        );
    }

    #[test]
    fn test_emit_without_receiver_is_silent() {
        let (events, rx) = EventSender::channel();
        drop(rx);
        events.emit(UpdateEvent::CheckingForUpdate);
    }
}
