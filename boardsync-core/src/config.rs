//! YAML configuration file.
//!
//! A minimal config points at the definition store and syncs into a plain
//! directory. Adding a `repo` section switches on version control: clone,
//! commit, push, and revision-driven pushes back to the store.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};

/// Directory used when neither `sync_path` nor a `repo` section is given.
pub const DEFAULT_SYNC_PATH: &str = "simple-sync";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,

    /// Version-control settings. Absent means plain directory sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<RepoConfig>,

    /// Sync directory for repo-less operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_path: Option<PathBuf>,

    /// Propagate file removals as store-side deletes during push runs.
    #[serde(default)]
    pub delete_removed: bool,

    #[serde(default)]
    pub poller: PollerConfig,
}

/// Connection settings for the definition store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub base_url: String,

    /// Bearer token. Takes precedence over username/password when both are set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Entities whose derived filename starts with this prefix are invisible
    /// to reconciliation in both directions. Empty disables the filter.
    #[serde(default)]
    pub ignore_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub url: String,
    pub clone_path: PathBuf,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default)]
    pub commits_author: Author,

    /// Prefix of the baseline filename. The literal `"hostname"` expands to
    /// the local host name so instances can share one repository.
    #[serde(default)]
    pub baseline_prefix: String,

    /// Write files and update the baseline but never commit (implies no push).
    #[serde(default)]
    pub dont_commit: bool,
    /// Commit but never push.
    #[serde(default)]
    pub dont_push: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default = "default_author_name")]
    pub name: String,
    #[serde(default = "default_author_email")]
    pub email: String,
}

impl Default for Author {
    fn default() -> Self {
        Author {
            name: default_author_name(),
            email: default_author_email(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        PollerConfig {
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_author_name() -> String {
    "boardsync".to_string()
}

fn default_author_email() -> String {
    "boardsync@localhost".to_string()
}

fn default_interval_secs() -> u64 {
    60
}

impl Config {
    /// Read and parse the config file. Parse failures surface the offending
    /// path rather than a bare serde message.
    pub fn load(path: &Path) -> Result<Config, CoreError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// The directory reconciliation reads and writes: the repo clone when a
    /// `repo` section is configured, otherwise `sync_path` (or its default).
    pub fn sync_path(&self) -> PathBuf {
        if let Some(repo) = &self.repo {
            return repo.clone_path.clone();
        }
        self.sync_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SYNC_PATH))
    }

    /// Baseline filename prefix; empty when running without a repo.
    pub fn baseline_prefix(&self) -> &str {
        self.repo
            .as_ref()
            .map(|r| r.baseline_prefix.as_str())
            .unwrap_or("")
    }
}
