//! Push-direction reconciliation: canonical files → definition store.
//!
//! Input is three disjoint path lists (added, modified, removed) from a
//! trigger adapter — a revision diff, or a full directory listing for
//! "push everything". Folders are upserted first so dashboard and library
//! writes can resolve their folder references. Per-entity failures
//! (unparsable JSON, missing header fields, optimistic-version conflicts)
//! are logged and skipped; the batch continues.

use serde_json::Value;
use tracing::{debug, info, warn};

use boardsync_core::types::EntityKind;
use boardsync_core::{baseline, codec, CoreError, Decoded};
use boardsync_repo::ChangeSet;

use crate::error::io_err;
use crate::resolver::resolve_folder_id;
use crate::{Engine, EngineError};

/// What a push run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    pub upserted: usize,
    pub deleted: usize,
    pub skipped: usize,
}

pub(crate) fn run(
    engine: &Engine<'_>,
    changes: &ChangeSet,
    previous_rev: Option<&str>,
    delete_removed: bool,
) -> Result<PushReport, EngineError> {
    let mut report = PushReport::default();
    let baseline_name = baseline::baseline_filename(&engine.options.baseline_prefix);

    // Contents of added ∪ modified come from the working tree.
    let mut upserts: Vec<(EntityKind, String, Value)> = Vec::new();
    for rel in changes.added.iter().chain(changes.modified.iter()) {
        let Some(kind) = classify(engine, rel, &baseline_name) else {
            report.skipped += 1;
            continue;
        };
        let path = engine.options.sync_root.join(rel);
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        match serde_json::from_str::<Value>(&contents) {
            Ok(body) => upserts.push((kind, rel.clone(), body)),
            Err(err) => {
                warn!("skipping {rel}: invalid JSON: {err}");
                report.skipped += 1;
            }
        }
    }

    // Removed files no longer exist in the tree; read them as of the
    // revision before the change.
    let mut removals: Vec<(EntityKind, String, Value)> = Vec::new();
    if !changes.removed.is_empty() {
        match (engine.repo, previous_rev) {
            (Some(repo), Some(rev)) => {
                for rel in &changes.removed {
                    let Some(kind) = classify(engine, rel, &baseline_name) else {
                        report.skipped += 1;
                        continue;
                    };
                    let contents = match repo.read_at_rev(rev, rel) {
                        Ok(contents) => contents,
                        Err(err) => {
                            warn!("cannot read {rel} at {rev}: {err}");
                            report.skipped += 1;
                            continue;
                        }
                    };
                    match serde_json::from_str::<Value>(&contents) {
                        Ok(body) => removals.push((kind, rel.clone(), body)),
                        Err(err) => {
                            warn!("skipping removed {rel}: invalid JSON: {err}");
                            report.skipped += 1;
                        }
                    }
                }
            }
            _ => warn!(
                "{} removed paths ignored: no previous revision to read them from",
                changes.removed.len()
            ),
        }
    }

    // Folders first: dashboards and library elements reference them.
    for (kind, rel, body) in &upserts {
        if *kind != EntityKind::Folder {
            continue;
        }
        match decode(*kind, rel, body) {
            Some(decoded) => match engine.store.create_or_update_folder(&decoded.uid, &decoded.title) {
                Ok(()) => report.upserted += 1,
                Err(err) if err.is_version_conflict() => {
                    warn!("folder {rel} rejected by store: {err}");
                    report.skipped += 1;
                }
                Err(err) => return Err(err.into()),
            },
            None => report.skipped += 1,
        }
    }

    let folders = engine.store.list_folders()?;

    for (kind, rel, body) in &upserts {
        if *kind == EntityKind::Folder {
            continue;
        }
        let Some(decoded) = decode(*kind, rel, body) else {
            report.skipped += 1;
            continue;
        };
        let folder_id = resolve_folder_id(&folders, decoded.folder_uid.as_deref());
        let result = match kind {
            EntityKind::Dashboard => engine
                .store
                .create_or_update_dashboard(&decoded.body, folder_id),
            EntityKind::LibraryElement => engine
                .store
                .create_or_update_library(&decoded.body, folder_id),
            EntityKind::Folder => unreachable!("folders handled above"),
        };
        match result {
            Ok(()) => {
                debug!("upserted {rel}");
                report.upserted += 1;
            }
            Err(err) if err.is_version_conflict() => {
                warn!("{rel} rejected by store on version check: {err}");
                report.skipped += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }

    if delete_removed {
        for (kind, rel, body) in &removals {
            let Some(decoded) = decode(*kind, rel, body) else {
                report.skipped += 1;
                continue;
            };
            let result = match kind {
                // A store-side folder delete cascades into its dashboards;
                // never issue one automatically.
                EntityKind::Folder => {
                    warn!("not propagating folder deletion for {rel}");
                    report.skipped += 1;
                    continue;
                }
                EntityKind::Dashboard => engine.store.delete_dashboard(&decoded.uid),
                EntityKind::LibraryElement => engine.store.delete_library(&decoded.uid),
            };
            match result {
                Ok(()) => report.deleted += 1,
                Err(err) if err.is_not_found() => {
                    debug!("{rel} already gone from store");
                    report.deleted += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    } else if !removals.is_empty() {
        info!(
            "{} removed files not propagated (delete_removed is off)",
            removals.len()
        );
    }

    Ok(report)
}

/// Build a "push everything" change set from the on-disk layout.
pub(crate) fn list_all(engine: &Engine<'_>) -> Result<ChangeSet, EngineError> {
    let mut changes = ChangeSet::default();
    for kind in [
        EntityKind::Folder,
        EntityKind::Dashboard,
        EntityKind::LibraryElement,
    ] {
        let dir = engine.options.sync_root.join(kind.dir());
        if !dir.is_dir() {
            continue;
        }
        let entries = std::fs::read_dir(&dir).map_err(|e| io_err(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".json") {
                changes.added.push(format!("{}/{name}", kind.dir()));
            }
        }
    }
    changes.added.sort();
    Ok(changes)
}

/// Map a repo-relative path to the entity kind its directory implies.
/// Returns `None` for the baseline file, ignored filenames, and paths
/// outside the managed layout (the latter with a log line).
fn classify(engine: &Engine<'_>, rel: &str, baseline_name: &str) -> Option<EntityKind> {
    let name = rel.rsplit('/').next().unwrap_or(rel);
    if name == baseline_name {
        return None;
    }
    let stem = name.strip_suffix(".json")?;
    if engine.ignored(stem) {
        debug!("{rel} matches the ignore prefix");
        return None;
    }

    let kind = match rel.split('/').next() {
        Some("dashboards") => EntityKind::Dashboard,
        Some("folders") => EntityKind::Folder,
        Some("libraries") => EntityKind::LibraryElement,
        _ => {
            warn!("{rel} is outside the managed layout, dropping");
            return None;
        }
    };
    // Exactly <dir>/<file>.json; nested paths are not managed.
    if rel.matches('/').count() != 1 {
        warn!("{rel} is outside the managed layout, dropping");
        return None;
    }
    Some(kind)
}

fn decode(kind: EntityKind, rel: &str, body: &Value) -> Option<Decoded> {
    match codec::decode(kind, body) {
        Ok(decoded) => Some(decoded),
        Err(CoreError::MalformedEntity { reason }) => {
            warn!("skipping {rel}: {reason}");
            None
        }
        Err(err) => {
            warn!("skipping {rel}: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::SyncOptions;

    struct NoopStore;

    impl boardsync_store::DefinitionStore for NoopStore {
        fn search(&self) -> Result<Vec<boardsync_core::SearchMeta>, boardsync_store::StoreError> {
            Ok(Vec::new())
        }
        fn get_dashboard(
            &self,
            uid: &boardsync_core::Uid,
        ) -> Result<boardsync_store::FetchedDashboard, boardsync_store::StoreError> {
            Err(boardsync_store::StoreError::NotFound {
                what: format!("dashboard {uid}"),
            })
        }
        fn create_or_update_dashboard(
            &self,
            _body: &Value,
            _folder_id: Option<i64>,
        ) -> Result<(), boardsync_store::StoreError> {
            Ok(())
        }
        fn delete_dashboard(
            &self,
            _uid: &boardsync_core::Uid,
        ) -> Result<(), boardsync_store::StoreError> {
            Ok(())
        }
        fn list_folders(&self) -> Result<Vec<boardsync_core::FolderRef>, boardsync_store::StoreError> {
            Ok(Vec::new())
        }
        fn create_or_update_folder(
            &self,
            _uid: &boardsync_core::Uid,
            _title: &str,
        ) -> Result<(), boardsync_store::StoreError> {
            Ok(())
        }
        fn list_library_elements(
            &self,
        ) -> Result<Vec<boardsync_store::FetchedLibrary>, boardsync_store::StoreError> {
            Ok(Vec::new())
        }
        fn create_or_update_library(
            &self,
            _body: &Value,
            _folder_id: Option<i64>,
        ) -> Result<(), boardsync_store::StoreError> {
            Ok(())
        }
        fn delete_library(
            &self,
            _uid: &boardsync_core::Uid,
        ) -> Result<(), boardsync_store::StoreError> {
            Ok(())
        }
    }

    fn engine_with_prefix<'a>(store: &'a NoopStore, ignore_prefix: &str) -> Engine<'a> {
        Engine::new(
            store,
            None,
            SyncOptions {
                sync_root: PathBuf::from("/nonexistent"),
                ignore_prefix: ignore_prefix.to_string(),
                baseline_prefix: String::new(),
                dont_commit: false,
                dont_push: false,
            },
        )
    }

    #[test]
    fn classify_partitions_by_directory() {
        let store = NoopStore;
        let engine = engine_with_prefix(&store, "");
        assert_eq!(
            classify(&engine, "dashboards/d1:Latency.json", "defs.json"),
            Some(EntityKind::Dashboard)
        );
        assert_eq!(
            classify(&engine, "folders/f1:Infra.json", "defs.json"),
            Some(EntityKind::Folder)
        );
        assert_eq!(
            classify(&engine, "libraries/lib1:CPU_panel.json", "defs.json"),
            Some(EntityKind::LibraryElement)
        );
    }

    #[test]
    fn classify_drops_unmanaged_paths() {
        let store = NoopStore;
        let engine = engine_with_prefix(&store, "");
        assert_eq!(classify(&engine, "README.md", "defs.json"), None);
        assert_eq!(classify(&engine, "alerts/a1:x.json", "defs.json"), None);
        assert_eq!(
            classify(&engine, "dashboards/nested/d1:x.json", "defs.json"),
            None
        );
    }

    #[test]
    fn classify_drops_the_baseline_file_unconditionally() {
        let store = NoopStore;
        let engine = engine_with_prefix(&store, "");
        assert_eq!(classify(&engine, "host-defs.json", "host-defs.json"), None);
        assert_eq!(
            classify(&engine, "dashboards/host-defs.json", "host-defs.json"),
            None
        );
    }

    #[test]
    fn classify_applies_the_ignore_prefix_to_the_filename() {
        let store = NoopStore;
        let engine = engine_with_prefix(&store, "tmp");
        assert_eq!(
            classify(&engine, "dashboards/tmp123:Scratch.json", "defs.json"),
            None
        );
        assert_eq!(
            classify(&engine, "dashboards/d1:tmp.json", "defs.json"),
            Some(EntityKind::Dashboard)
        );
    }
}
