//! Version-control adapter.
//!
//! [`Repository`] is the seam between the reconciliation engine and the
//! repository holding the canonical file tree. The engine only ever needs a
//! handful of operations: sync with the remote, enumerate changes between
//! two revisions, read a file as it was at a revision, and stage / commit /
//! push its own writes. [`git::GitRepository`] implements the trait over the
//! `git` binary; tests substitute an in-memory fake.

pub mod error;
pub mod git;

use std::path::Path;

pub use error::RepoError;
pub use git::GitRepository;

/// Changes between two revisions, as repo-relative paths with forward
/// slashes. Renames are reported as a removal plus an addition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// Operations the reconciliation engine needs from version control.
pub trait Repository {
    /// Root of the working tree.
    fn root(&self) -> &Path;

    /// Bring the working tree up to date with the remote.
    fn sync(&self) -> Result<(), RepoError>;

    fn head_rev(&self) -> Result<String, RepoError>;

    fn changed_between(&self, from: &str, to: &str) -> Result<ChangeSet, RepoError>;

    /// Read a repo-relative path as it was at `rev`. Used to recover the
    /// content of files a revision removed.
    fn read_at_rev(&self, rev: &str, path: &str) -> Result<String, RepoError>;

    fn stage(&self, paths: &[String]) -> Result<(), RepoError>;

    /// Remove a file from the tree and the index. Missing files are not an
    /// error, so deletion propagation stays idempotent.
    fn remove(&self, path: &str) -> Result<(), RepoError>;

    fn is_clean(&self) -> Result<bool, RepoError>;

    /// Commit staged changes and return the new head revision.
    fn commit(&self, message: &str) -> Result<String, RepoError>;

    fn push(&self) -> Result<(), RepoError>;
}
