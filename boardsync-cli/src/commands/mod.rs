pub mod daemon;
pub mod pull;
pub mod push;
pub mod status;

use anyhow::Result;
use boardsync_core::Config;
use boardsync_repo::GitRepository;
use boardsync_store::HttpStore;

/// Store client plus an optional repository handle, built from config. The
/// engine borrows both, so callers keep this alive for the command's run.
pub(crate) struct SyncContext {
    pub store: HttpStore,
    pub repo: Option<GitRepository>,
}

pub(crate) fn build_context(config: &Config) -> Result<SyncContext> {
    let store = HttpStore::new(&config.store);
    let repo = match &config.repo {
        Some(repo_config) => Some(GitRepository::open(repo_config)?),
        None => None,
    };
    Ok(SyncContext { store, repo })
}
