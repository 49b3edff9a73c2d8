//! Integration test suite for the TaskQuest updater
//!
//! End-to-end tests across the release feeds, the coordinator, the stdio
//! bridge and the command-line binary. Network access is never needed: the
//! remote feed talks to an in-process HTTP stub.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **remote_feed**: GitHub API status mapping, headers and parsing
//! - **update_flow**: Check, backup, download and install through the coordinator
//! - **bridge_protocol**: JSON-lines requests, responses and events
//! - **cli**: The `taskquest-updater` binary

// Shared test utilities (from parent tests/ directory)
#[path = "../common/mod.rs"]
mod common;

mod bridge_protocol;
mod cli;
mod remote_feed;
mod update_flow;
