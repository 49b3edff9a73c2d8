//! Core types shared by every layer of the updater.

pub mod error;

pub use error::{ErrorContext, UpdateError, user_friendly_error};

/// Result alias used by the update pipeline.
pub type Result<T, E = UpdateError> = std::result::Result<T, E>;
