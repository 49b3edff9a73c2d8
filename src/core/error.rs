//! Error handling for the updater
//!
//! The error system follows two principles:
//! 1. **Strongly-typed errors** ([`UpdateError`]) for every failure the update
//!    pipeline can produce, each with a stable machine-readable [`code`](UpdateError::code)
//!    that survives the trip across the process boundary to the UI.
//! 2. **User-friendly messages** ([`ErrorContext`]) with actionable suggestions
//!    for the command-line front end.
//!
//! # Propagation
//!
//! Release sources and the backup manager return [`UpdateError`] directly.
//! The [`UpdateCoordinator`](crate::upgrade::UpdateCoordinator) normalizes every
//! failure into a single `error` event and also hands it back to the caller.
//! CLI code works with `anyhow::Error` and converts to an [`ErrorContext`] via
//! [`user_friendly_error`] right before printing.
//!
//! # Examples
//!
//! ```rust,no_run
//! use taskquest_updater::core::{UpdateError, user_friendly_error};
//!
//! let err = UpdateError::RateLimited;
//! assert_eq!(err.code(), "rate-limited");
//!
//! let ctx = user_friendly_error(anyhow::Error::from(err));
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// The error type of the update pipeline.
///
/// # Error Categories
///
/// ## Release feeds
/// - [`NotFound`](Self::NotFound), [`Unauthorized`](Self::Unauthorized),
///   [`RateLimited`](Self::RateLimited), [`TransportError`](Self::TransportError),
///   [`MalformedResponse`](Self::MalformedResponse)
///
/// ## Session control
/// - [`UpdatesDisabled`](Self::UpdatesDisabled), [`Busy`](Self::Busy),
///   [`NotYetChecked`](Self::NotYetChecked), [`NoUpdateAvailable`](Self::NoUpdateAvailable)
///
/// ## Local state
/// - [`FilesystemError`](Self::FilesystemError), [`ChecksumMismatch`](Self::ChecksumMismatch),
///   [`ConfigError`](Self::ConfigError)
///
/// ## Bridge
/// - [`UnknownCommand`](Self::UnknownCommand), [`InvalidArguments`](Self::InvalidArguments)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// The master switch in the update configuration is off.
    #[error("Updates are disabled")]
    UpdatesDisabled,

    /// The release feed or the release itself does not exist.
    #[error("Release not found: {resource}")]
    NotFound {
        /// What was looked up (repository coordinates or feed file).
        resource: String,
    },

    /// The feed rejected the configured credentials.
    #[error("Release feed rejected the access token")]
    Unauthorized,

    /// The feed refused the request because of API rate limiting.
    #[error("Release feed rate limit reached, try again later")]
    RateLimited,

    /// Network failure, timeout or unexpected HTTP status.
    #[error("Transport error: {reason}")]
    TransportError {
        /// Human readable description of the failure.
        reason: String,
    },

    /// The feed answered with something that is not a release description.
    #[error("Malformed release response: {reason}")]
    MalformedResponse {
        /// Parser message.
        reason: String,
    },

    /// A local file operation failed.
    #[error("File system error during {operation} at {path}: {reason}")]
    FilesystemError {
        /// The operation being performed (e.g. "create backup").
        operation: String,
        /// The path involved.
        path: String,
        /// Underlying error message.
        reason: String,
    },

    /// Another update session is already in flight.
    #[error("An update session is already in progress")]
    Busy,

    /// An operation needed a prior successful check and download.
    #[error("No update has been checked for and downloaded yet")]
    NotYetChecked,

    /// The latest release is not newer than the running version.
    #[error("No updates available for download (current version {current})")]
    NoUpdateAvailable {
        /// The running application version.
        current: String,
    },

    /// A downloaded artifact did not match its published digest.
    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Artifact path.
        path: String,
        /// Published digest.
        expected: String,
        /// Computed digest.
        actual: String,
    },

    /// The update configuration is invalid or could not be persisted.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// What is wrong with the configuration.
        message: String,
    },

    /// The UI invoked a command the bridge does not know.
    #[error("Unknown command: {name}")]
    UnknownCommand {
        /// The command name as received.
        name: String,
    },

    /// The UI invoked a known command with unusable arguments.
    #[error("Invalid arguments for '{command}': {reason}")]
    InvalidArguments {
        /// The command name.
        command: String,
        /// Parser message.
        reason: String,
    },

    /// Anything that does not fit the categories above.
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

impl UpdateError {
    /// Stable kebab-case identifier of the error kind.
    ///
    /// Used on the wire so that the UI (and tests) can branch on the kind
    /// without parsing messages.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UpdatesDisabled => "updates-disabled",
            Self::NotFound {
                ..
            } => "not-found",
            Self::Unauthorized => "unauthorized",
            Self::RateLimited => "rate-limited",
            Self::TransportError {
                ..
            } => "transport-error",
            Self::MalformedResponse {
                ..
            } => "malformed-response",
            Self::FilesystemError {
                ..
            } => "filesystem-error",
            Self::Busy => "busy",
            Self::NotYetChecked => "not-yet-checked",
            Self::NoUpdateAvailable {
                ..
            } => "no-update-available",
            Self::ChecksumMismatch {
                ..
            } => "checksum-mismatch",
            Self::ConfigError {
                ..
            } => "config-error",
            Self::UnknownCommand {
                ..
            } => "unknown-command",
            Self::InvalidArguments {
                ..
            } => "invalid-arguments",
            Self::Other {
                ..
            } => "other",
        }
    }

    /// Build a [`FilesystemError`](Self::FilesystemError) from an I/O error.
    pub fn filesystem(operation: impl Into<String>, path: &Path, err: &std::io::Error) -> Self {
        Self::FilesystemError {
            operation: operation.into(),
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }

    /// Build a [`TransportError`](Self::TransportError).
    pub fn transport(reason: impl fmt::Display) -> Self {
        Self::TransportError {
            reason: reason.to_string(),
        }
    }

    /// Build a [`MalformedResponse`](Self::MalformedResponse).
    pub fn malformed(reason: impl fmt::Display) -> Self {
        Self::MalformedResponse {
            reason: reason.to_string(),
        }
    }

    /// Whether a later attempt might succeed without any user action.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::TransportError {
                    ..
                }
                | Self::Busy
        )
    }
}

/// Error wrapper carrying a suggestion and optional details for display.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error.
    pub error: UpdateError,
    /// What the user can do about it.
    pub suggestion: Option<String>,
    /// Additional background.
    pub details: Option<String>,
}

impl ErrorContext {
    /// Wrap an error without suggestion or details.
    #[must_use]
    pub const fn new(error: UpdateError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Attach a suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with a helpful suggestion.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(update_error) = error.downcast_ref::<UpdateError>() {
        return create_error_context(update_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        if io_error.kind() == std::io::ErrorKind::PermissionDenied {
            return ErrorContext::new(UpdateError::FilesystemError {
                operation: "file access".to_string(),
                path: "unknown".to_string(),
                reason: io_error.to_string(),
            })
            .with_suggestion("Check the ownership of the application data directory");
        }
    }

    // Generic error - include the full error chain for better diagnostics
    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(UpdateError::Other {
        message,
    })
}

fn create_error_context(error: UpdateError) -> ErrorContext {
    match &error {
        UpdateError::UpdatesDisabled => ErrorContext::new(error)
            .with_suggestion("Enable updates with 'taskquest-updater config set enabled true'"),
        UpdateError::NotFound {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check the githubOwner/githubRepo settings or the local feed path")
            .with_details("The feed answered 404 or latest.json is missing"),
        UpdateError::Unauthorized => ErrorContext::new(error)
            .with_suggestion("Set a valid token with 'taskquest-updater config set githubToken <token>'"),
        UpdateError::RateLimited => ErrorContext::new(error)
            .with_suggestion("Wait a few minutes, or configure a token to raise the rate limit")
            .with_details("Unauthenticated GitHub API calls are limited to 60 per hour"),
        UpdateError::TransportError {
            ..
        } => ErrorContext::new(error).with_suggestion("Check your network connection and retry"),
        UpdateError::Busy => ErrorContext::new(error)
            .with_suggestion("Wait for the running check or download to finish"),
        UpdateError::NotYetChecked => ErrorContext::new(error)
            .with_suggestion("Run 'taskquest-updater download' first"),
        UpdateError::ChecksumMismatch {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Delete the staged artifact and download again")
            .with_details("The downloaded file does not match the digest published by the feed"),
        UpdateError::FilesystemError {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check free disk space and permissions of the data directory"),
        _ => ErrorContext::new(error),
    }
}
