//! Test utilities for the updater
//!
//! Fakes for every seam the coordinator and the bridge expose, plus a tiny
//! HTTP server for exercising the remote feed and the native installer
//! without network access.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskquest_updater::config::AppPaths;
//! use taskquest_updater::test_utils::FakeReleaseSource;
//! use taskquest_updater::upgrade::UpdateCoordinator;
//!
//! # async fn example() {
//! let source = Arc::new(FakeReleaseSource::releasing("2.0.0"));
//! let (coordinator, _events) = UpdateCoordinator::builder("1.0.0", AppPaths::new("/tmp/tq"))
//!     .source_factory(source.clone().factory())
//!     .build()
//!     .await;
//! assert!(coordinator.check_for_updates().await.unwrap().has_update);
//! assert_eq!(source.calls(), 1);
//! # }
//! ```

pub mod fakes;
pub mod http;

pub use fakes::{
    FakeReleaseSource, FakeUrlOpener, ProcessCall, RecordingProcess, RecordingSurface, release,
};
pub use http::HttpStub;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; without either, logging
/// stays off.
///
/// ```bash
/// RUST_LOG=taskquest_updater=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
