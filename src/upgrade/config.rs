use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

use crate::constants::DEFAULT_LOCAL_FEED_DIR;
use crate::core::UpdateError;

/// How often automatic update checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CheckInterval {
    /// Check once when the application starts, never reschedule.
    #[serde(rename = "startup")]
    OnStartup,
    /// Check every 24 hours.
    #[serde(rename = "daily")]
    Daily,
    /// Check every 7 days.
    #[default]
    #[serde(rename = "weekly")]
    Weekly,
    /// Never check automatically.
    #[serde(rename = "manual")]
    ManualOnly,
}

impl CheckInterval {
    /// Wire name used in the configuration file.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OnStartup => "startup",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::ManualOnly => "manual",
        }
    }
}

impl std::str::FromStr for CheckInterval {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "startup" => Ok(Self::OnStartup),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "manual" => Ok(Self::ManualOnly),
            other => Err(UpdateError::ConfigError {
                message: format!(
                    "unknown check interval '{other}' (expected startup, daily, weekly or manual)"
                ),
            }),
        }
    }
}

/// Where release information comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReleaseSourceKind {
    /// GitHub releases API.
    #[default]
    #[serde(rename = "github")]
    RemoteFeed,
    /// A `latest.json` descriptor in a local directory.
    #[serde(rename = "local")]
    LocalFeed,
}

impl ReleaseSourceKind {
    /// Wire name used in the configuration file.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RemoteFeed => "github",
            Self::LocalFeed => "local",
        }
    }
}

impl std::str::FromStr for ReleaseSourceKind {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(Self::RemoteFeed),
            "local" => Ok(Self::LocalFeed),
            other => Err(UpdateError::ConfigError {
                message: format!("unknown update source '{other}' (expected github or local)"),
            }),
        }
    }
}

/// Persistent update settings.
///
/// Stored as `update-config.json` in the application data directory and
/// shared verbatim with the UI, hence the camelCase keys. Missing keys fall
/// back to the defaults so older files keep loading.
///
/// ```json
/// {
///   "enabled": true,
///   "autoCheck": true,
///   "checkInterval": "weekly",
///   "source": "github",
///   "githubOwner": "jonny1729",
///   "githubRepo": "my-second-llm-app",
///   "autoBackup": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConfig {
    /// Master switch; when off every check fails with `UpdatesDisabled`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether checks run without an explicit user action.
    #[serde(default = "default_true")]
    pub auto_check: bool,

    /// Scheduling policy for automatic checks.
    #[serde(default)]
    pub check_interval: CheckInterval,

    /// Which feed is consulted.
    #[serde(default)]
    pub source: ReleaseSourceKind,

    /// Token for private repositories. Only meaningful for the remote feed.
    #[serde(rename = "githubToken", default, skip_serializing_if = "Option::is_none")]
    pub remote_auth_token: Option<String>,

    /// Repository owner of the remote feed.
    #[serde(rename = "githubOwner", default = "default_owner")]
    pub remote_owner: String,

    /// Repository name of the remote feed.
    #[serde(rename = "githubRepo", default = "default_repo")]
    pub remote_repo_name: String,

    /// Directory containing `latest.json`. Only meaningful for the local feed.
    #[serde(rename = "localPath", default, skip_serializing_if = "Option::is_none")]
    pub local_feed_path: Option<String>,

    /// Snapshot local state before installing.
    #[serde(default = "default_true")]
    pub auto_backup: bool,
}

fn default_true() -> bool {
    true
}

fn default_owner() -> String {
    "jonny1729".to_string()
}

fn default_repo() -> String {
    "my-second-llm-app".to_string()
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_check: true,
            check_interval: CheckInterval::default(),
            source: ReleaseSourceKind::default(),
            remote_auth_token: None,
            remote_owner: default_owner(),
            remote_repo_name: default_repo(),
            local_feed_path: None,
            auto_backup: true,
        }
    }
}

impl UpdateConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject combinations the selected source cannot work with.
    pub fn validate(&self) -> Result<(), UpdateError> {
        if self.source == ReleaseSourceKind::RemoteFeed {
            if self.remote_owner.trim().is_empty() {
                return Err(UpdateError::ConfigError {
                    message: "githubOwner must not be empty when source is github".to_string(),
                });
            }
            if self.remote_repo_name.trim().is_empty() {
                return Err(UpdateError::ConfigError {
                    message: "githubRepo must not be empty when source is github".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Directory holding `latest.json` for the local feed.
    #[must_use]
    pub fn local_feed_dir(&self) -> PathBuf {
        PathBuf::from(self.local_feed_path.as_deref().unwrap_or(DEFAULT_LOCAL_FEED_DIR))
    }

    /// Human-facing page of the latest remote release.
    #[must_use]
    pub fn release_page_url(&self) -> String {
        format!(
            "https://github.com/{}/{}/releases/latest",
            self.remote_owner, self.remote_repo_name
        )
    }

    /// Whether automatic checks should be armed at all.
    #[must_use]
    pub const fn wants_auto_check(&self) -> bool {
        self.enabled && self.auto_check
    }
}

/// Partial configuration sent by the UI.
///
/// Absent keys leave the current value untouched. The two optional string
/// settings accept an explicit `null` to clear them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_check: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_interval: Option<CheckInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ReleaseSourceKind>,
    #[serde(
        rename = "githubToken",
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub remote_auth_token: Option<Option<String>>,
    #[serde(rename = "githubOwner", default, skip_serializing_if = "Option::is_none")]
    pub remote_owner: Option<String>,
    #[serde(rename = "githubRepo", default, skip_serializing_if = "Option::is_none")]
    pub remote_repo_name: Option<String>,
    #[serde(
        rename = "localPath",
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub local_feed_path: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_backup: Option<bool>,
}

// A key that is present (even as `null`) yields `Some(..)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl UpdateConfigPatch {
    /// Merge the patch over `base`.
    #[must_use]
    pub fn apply(&self, base: &UpdateConfig) -> UpdateConfig {
        let mut merged = base.clone();
        if let Some(enabled) = self.enabled {
            merged.enabled = enabled;
        }
        if let Some(auto_check) = self.auto_check {
            merged.auto_check = auto_check;
        }
        if let Some(interval) = self.check_interval {
            merged.check_interval = interval;
        }
        if let Some(source) = self.source {
            merged.source = source;
        }
        if let Some(token) = &self.remote_auth_token {
            merged.remote_auth_token = token.clone().filter(|t| !t.is_empty());
        }
        if let Some(owner) = &self.remote_owner {
            merged.remote_owner = owner.clone();
        }
        if let Some(repo) = &self.remote_repo_name {
            merged.remote_repo_name = repo.clone();
        }
        if let Some(path) = &self.local_feed_path {
            merged.local_feed_path = path.clone().filter(|p| !p.is_empty());
        }
        if let Some(auto_backup) = self.auto_backup {
            merged.auto_backup = auto_backup;
        }
        merged
    }

    /// Whether the patch changes where or how releases are fetched.
    #[must_use]
    pub const fn touches_origin(&self) -> bool {
        self.source.is_some()
            || self.remote_auth_token.is_some()
            || self.remote_owner.is_some()
            || self.remote_repo_name.is_some()
            || self.local_feed_path.is_some()
    }

    /// Whether the patch changes automatic check scheduling.
    #[must_use]
    pub const fn touches_schedule(&self) -> bool {
        self.enabled.is_some() || self.auto_check.is_some() || self.check_interval.is_some()
    }

    /// Build a patch that sets a single key from its textual form.
    ///
    /// Used by `config set`; keys are the camelCase names of the file format.
    pub fn from_key_value(key: &str, value: &str) -> Result<Self, UpdateError> {
        let parse_bool = |v: &str| {
            v.parse::<bool>().map_err(|_| UpdateError::ConfigError {
                message: format!("'{key}' expects true or false, got '{v}'"),
            })
        };
        let optional = |v: &str| {
            if v.is_empty() || v == "null" { None } else { Some(v.to_string()) }
        };

        let mut patch = Self::default();
        match key {
            "enabled" => patch.enabled = Some(parse_bool(value)?),
            "autoCheck" => patch.auto_check = Some(parse_bool(value)?),
            "checkInterval" => patch.check_interval = Some(value.parse()?),
            "source" => patch.source = Some(value.parse()?),
            "githubToken" => patch.remote_auth_token = Some(optional(value)),
            "githubOwner" => patch.remote_owner = Some(value.to_string()),
            "githubRepo" => patch.remote_repo_name = Some(value.to_string()),
            "localPath" => patch.local_feed_path = Some(optional(value)),
            "autoBackup" => patch.auto_backup = Some(parse_bool(value)?),
            other => {
                return Err(UpdateError::ConfigError {
                    message: format!("unknown configuration key '{other}'"),
                });
            }
        }
        Ok(patch)
    }
}
