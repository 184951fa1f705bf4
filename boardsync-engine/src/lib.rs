//! Reconciliation engine.
//!
//! Two directions, one baseline:
//! - [`Engine::pull`] snapshots the definition store, diffs against the
//!   baseline, rewrites canonical files, and commits.
//! - [`Engine::push_changes`] / [`Engine::push_all`] apply file edits back
//!   to the store, then immediately pull so the store-assigned version
//!   increments land in the baseline instead of looking like fresh changes
//!   on the next tick.

pub mod error;
pub mod pull;
pub mod push;
pub mod resolver;

use std::path::PathBuf;

use boardsync_core::codec::{self, Canonical};
use boardsync_core::types::EntityKind;
use boardsync_core::Config;
use boardsync_repo::{ChangeSet, Repository};
use boardsync_store::DefinitionStore;

use crate::error::io_err;

pub use error::EngineError;
pub use pull::PullReport;
pub use push::PushReport;

/// Reconciliation settings distilled from the configuration file.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub sync_root: PathBuf,
    pub ignore_prefix: String,
    pub baseline_prefix: String,
    pub dont_commit: bool,
    pub dont_push: bool,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        SyncOptions {
            sync_root: config.sync_path(),
            ignore_prefix: config.store.ignore_prefix.clone(),
            baseline_prefix: config.baseline_prefix().to_string(),
            dont_commit: config.repo.as_ref().map(|r| r.dont_commit).unwrap_or(false),
            dont_push: config.repo.as_ref().map(|r| r.dont_push).unwrap_or(false),
        }
    }
}

/// One reconciliation engine instance. `repo` is `None` in plain-directory
/// mode: files are still written and the baseline maintained, but nothing
/// is committed or pushed.
pub struct Engine<'a> {
    pub(crate) store: &'a dyn DefinitionStore,
    pub(crate) repo: Option<&'a dyn Repository>,
    pub(crate) options: SyncOptions,
}

impl<'a> Engine<'a> {
    pub fn new(
        store: &'a dyn DefinitionStore,
        repo: Option<&'a dyn Repository>,
        options: SyncOptions,
    ) -> Self {
        Engine {
            store,
            repo,
            options,
        }
    }

    /// Store → files reconciliation.
    pub fn pull(&self) -> Result<PullReport, EngineError> {
        pull::run(self)
    }

    /// Files → store reconciliation for an explicit change list, followed by
    /// the loop-breaking pull.
    pub fn push_changes(
        &self,
        changes: &ChangeSet,
        previous_rev: Option<&str>,
        delete_removed: bool,
    ) -> Result<(PushReport, PullReport), EngineError> {
        let push_report = push::run(self, changes, previous_rev, delete_removed)?;
        let pull_report = self.pull()?;
        Ok((push_report, pull_report))
    }

    /// Push every canonical file currently on disk, followed by the
    /// loop-breaking pull. Nothing is deleted: a full listing has no
    /// "removed" set.
    pub fn push_all(&self) -> Result<(PushReport, PullReport), EngineError> {
        let changes = push::list_all(self)?;
        let push_report = push::run(self, &changes, None, false)?;
        let pull_report = self.pull()?;
        Ok((push_report, pull_report))
    }

    // -----------------------------------------------------------------------
    // Shared file helpers
    // -----------------------------------------------------------------------

    /// Whether a derived filename is invisible to reconciliation.
    pub(crate) fn ignored(&self, filename: &str) -> bool {
        !self.options.ignore_prefix.is_empty()
            && filename.starts_with(&self.options.ignore_prefix)
    }

    pub(crate) fn rel_path(kind: EntityKind, filename: &str) -> String {
        format!("{}/{filename}.json", kind.dir())
    }

    /// Write a canonical file with delete-then-write overwrite semantics.
    /// Returns false (and stages nothing) when the bytes on disk already
    /// match, so an unchanged entity never dirties the repository.
    pub(crate) fn write_canonical(
        &self,
        kind: EntityKind,
        canonical: &Canonical,
        staged: &mut Vec<String>,
    ) -> Result<bool, EngineError> {
        let rel = Self::rel_path(kind, &canonical.filename);
        let path = self.options.sync_root.join(&rel);
        let contents = codec::to_disk_string(&canonical.body)?;

        if path.exists() {
            let existing = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            if existing == contents {
                return Ok(false);
            }
            std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
        }
        std::fs::write(&path, contents).map_err(|e| io_err(&path, e))?;
        staged.push(rel);
        Ok(true)
    }

    /// Delete a canonical file if present; missing files are a no-op so
    /// deletion propagation stays idempotent.
    pub(crate) fn remove_entity_file(
        &self,
        kind: EntityKind,
        filename: &str,
        staged: &mut Vec<String>,
    ) -> Result<bool, EngineError> {
        let rel = Self::rel_path(kind, filename);
        let path = self.options.sync_root.join(&rel);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
        staged.push(rel);
        Ok(true)
    }
}
