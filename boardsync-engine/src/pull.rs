//! Pull-direction reconciliation: definition store → canonical files.
//!
//! Version-gated: an entity is written when it is new to the baseline or
//! the store reports a strictly greater version. Equal versions are the
//! steady state; smaller versions are logged and left alone (the engine
//! never rolls files back). Folders carry no version counter and are
//! rewritten from the listing on every run, and folder deletions are
//! deliberately not mirrored because a store-side folder delete cascades.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use boardsync_core::types::{EntityKind, SearchMeta, Uid};
use boardsync_core::{baseline, codec, CoreError};
use boardsync_repo::RepoError;

use crate::error::io_err;
use crate::{Engine, EngineError};

/// What a pull run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    pub written: usize,
    pub deleted: usize,
    /// Revision of the commit made, when one was.
    pub commit: Option<String>,
    pub pushed: bool,
}

pub(crate) fn run(engine: &Engine<'_>) -> Result<PullReport, EngineError> {
    if let Some(repo) = engine.repo {
        if !repo.is_clean()? {
            warn!(
                "working tree at {} has local modifications",
                repo.root().display()
            );
        }
        repo.sync()?;
    }

    let root = engine.options.sync_root.clone();
    for kind in [
        EntityKind::Dashboard,
        EntityKind::Folder,
        EntityKind::LibraryElement,
    ] {
        let dir = root.join(kind.dir());
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }

    let (mut baseline, legacy_names) = baseline::load(&root, &engine.options.baseline_prefix)?;

    let mut report = PullReport::default();
    let mut staged: Vec<String> = Vec::new();
    let mut transitions: Vec<String> = Vec::new();

    // One-time cleanup of root-level files left behind by the retired flat
    // layout; their names arrive only on the load that migrates the schema.
    for name in legacy_names {
        let rel = format!("{name}.json");
        let path = root.join(&rel);
        if path.exists() {
            info!("removing legacy file {rel}");
            std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
            staged.push(rel);
            report.deleted += 1;
        }
    }

    let listing = engine.store.search()?;
    let mut dashboards: BTreeMap<Uid, SearchMeta> = BTreeMap::new();
    let mut folders: BTreeMap<Uid, SearchMeta> = BTreeMap::new();
    for meta in listing {
        match EntityKind::from_type_tag(&meta.type_tag) {
            Some(EntityKind::Dashboard) => {
                dashboards.insert(meta.uid.clone(), meta);
            }
            Some(EntityKind::Folder) => {
                folders.insert(meta.uid.clone(), meta);
            }
            _ => debug!("ignoring search entry {} of type {:?}", meta.uid, meta.type_tag),
        }
    }

    reconcile_folders(engine, &folders, &mut baseline, &mut staged, &mut report)?;
    reconcile_dashboards(
        engine,
        &dashboards,
        &mut baseline,
        &mut staged,
        &mut transitions,
        &mut report,
    )?;
    reconcile_libraries(engine, &mut baseline, &mut staged, &mut transitions, &mut report)?;

    // Persist the baseline before committing so a crash between the two
    // leaves the next run incremental rather than re-writing everything.
    baseline::save(&root, &engine.options.baseline_prefix, &baseline)?;
    staged.push(baseline::baseline_filename(&engine.options.baseline_prefix));

    if let Some(repo) = engine.repo {
        if engine.options.dont_commit {
            info!("dont_commit set, leaving {} staged paths uncommitted", staged.len());
            return Ok(report);
        }
        repo.stage(&staged)?;
        match repo.commit(&commit_message(&transitions)) {
            Ok(rev) => {
                info!("committed {rev}");
                report.commit = Some(rev);
            }
            Err(RepoError::NothingToCommit) => debug!("no changes to commit"),
            Err(err) => return Err(err.into()),
        }
        // Push is independent of this run's commit: a previous run may have
        // committed and failed to push.
        if !engine.options.dont_push {
            repo.push()?;
            report.pushed = true;
        }
    }

    Ok(report)
}

fn reconcile_folders(
    engine: &Engine<'_>,
    folders: &BTreeMap<Uid, SearchMeta>,
    baseline: &mut baseline::Baseline,
    staged: &mut Vec<String>,
    report: &mut PullReport,
) -> Result<(), EngineError> {
    let mut folder_meta = BTreeMap::new();
    for (uid, meta) in folders {
        let canonical = codec::encode_folder(meta);
        if engine.ignored(&canonical.filename) {
            continue;
        }
        if engine.write_canonical(EntityKind::Folder, &canonical, staged)? {
            report.written += 1;
        }
        folder_meta.insert(uid.clone(), meta.clone());
    }
    baseline.folder_meta = folder_meta;
    Ok(())
}

fn reconcile_dashboards(
    engine: &Engine<'_>,
    dashboards: &BTreeMap<Uid, SearchMeta>,
    baseline: &mut baseline::Baseline,
    staged: &mut Vec<String>,
    transitions: &mut Vec<String>,
    report: &mut PullReport,
) -> Result<(), EngineError> {
    for (uid, meta) in dashboards {
        let fetched = match engine.store.get_dashboard(uid) {
            Ok(fetched) => fetched,
            Err(err) if err.is_not_found() => {
                warn!("dashboard {uid} vanished between search and fetch");
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let folder_uid = meta
            .folder_uid
            .as_deref()
            .or(fetched.folder_uid.as_deref());
        let canonical = match codec::encode(EntityKind::Dashboard, &fetched.body, folder_uid) {
            Ok(canonical) => canonical,
            Err(CoreError::MalformedEntity { reason }) => {
                warn!("skipping dashboard {uid}: {reason}");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        if engine.ignored(&canonical.filename) {
            continue;
        }

        let recorded = baseline.dashboard_version(uid);
        match recorded {
            Some(version) if fetched.version == version => continue,
            Some(version) if fetched.version < version => {
                warn!(
                    "dashboard {uid} fetched at version {} below recorded {version}, not rolling back",
                    fetched.version
                );
                continue;
            }
            _ => {}
        }

        // A title change renames the file; drop the old name first.
        if let Some(old_meta) = baseline.dashboard_meta.get(uid) {
            let old = codec::filename(uid, &old_meta.title);
            if old != canonical.filename {
                engine.remove_entity_file(EntityKind::Dashboard, &old, staged)?;
            }
        }

        if engine.write_canonical(EntityKind::Dashboard, &canonical, staged)? {
            report.written += 1;
        }
        transitions.push(match recorded {
            Some(version) => {
                format!("{uid} ({}): {} -> {}", fetched.title, version, fetched.version)
            }
            None => format!("{uid} ({}): new at {}", fetched.title, fetched.version),
        });
        baseline.record_dashboard(meta.clone(), fetched.version);
    }

    // Identifiers the store no longer lists: delete their files.
    let stale: Vec<Uid> = baseline
        .dashboard_versions
        .keys()
        .filter(|uid| !dashboards.contains_key(*uid))
        .cloned()
        .collect();
    for uid in stale {
        if let Some(meta) = baseline.dashboard_meta.get(&uid).cloned() {
            let filename = codec::filename(&uid, &meta.title);
            if engine.remove_entity_file(EntityKind::Dashboard, &filename, staged)? {
                report.deleted += 1;
            }
            transitions.push(format!("{uid} ({}): removed", meta.title));
        }
        baseline.remove_dashboard(&uid);
    }

    Ok(())
}

fn reconcile_libraries(
    engine: &Engine<'_>,
    baseline: &mut baseline::Baseline,
    staged: &mut Vec<String>,
    transitions: &mut Vec<String>,
    report: &mut PullReport,
) -> Result<(), EngineError> {
    let elements = engine.store.list_library_elements()?;
    let mut listed: BTreeMap<Uid, ()> = BTreeMap::new();

    for element in &elements {
        let meta = &element.meta;
        let uid = meta.uid.clone();
        listed.insert(uid.clone(), ());

        let folder_uid = (!meta.meta.folder_uid.is_empty()).then_some(meta.meta.folder_uid.as_str());
        let canonical = match codec::encode(EntityKind::LibraryElement, &element.raw, folder_uid) {
            Ok(canonical) => canonical,
            Err(CoreError::MalformedEntity { reason }) => {
                warn!("skipping library element {uid}: {reason}");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        if engine.ignored(&canonical.filename) {
            continue;
        }

        let recorded = baseline.library_version(&uid);
        match recorded {
            Some(version) if meta.version == version => continue,
            Some(version) if meta.version < version => {
                warn!(
                    "library element {uid} listed at version {} below recorded {version}, not rolling back",
                    meta.version
                );
                continue;
            }
            _ => {}
        }

        if let Some(old_meta) = baseline.library_meta.get(&uid) {
            let old = codec::filename(&uid, &old_meta.name);
            if old != canonical.filename {
                engine.remove_entity_file(EntityKind::LibraryElement, &old, staged)?;
            }
        }

        if engine.write_canonical(EntityKind::LibraryElement, &canonical, staged)? {
            report.written += 1;
        }
        transitions.push(match recorded {
            Some(version) => format!("{uid} ({}): {} -> {}", meta.name, version, meta.version),
            None => format!("{uid} ({}): new at {}", meta.name, meta.version),
        });
        baseline.record_library(meta.clone(), meta.version);
    }

    let stale: Vec<Uid> = baseline
        .library_versions
        .keys()
        .filter(|uid| !listed.contains_key(*uid))
        .cloned()
        .collect();
    for uid in stale {
        if let Some(meta) = baseline.library_meta.get(&uid).cloned() {
            let filename = codec::filename(&uid, &meta.name);
            if engine.remove_entity_file(EntityKind::LibraryElement, &filename, staged)? {
                report.deleted += 1;
            }
            transitions.push(format!("{uid} ({}): removed", meta.name));
        }
        baseline.remove_library(&uid);
    }

    Ok(())
}

fn commit_message(transitions: &[String]) -> String {
    let mut message = String::from("Sync definitions from store\n");
    if !transitions.is_empty() {
        message.push('\n');
        for line in transitions {
            message.push_str(line);
            message.push('\n');
        }
    }
    message
}
