//! Baseline ("defs") record — the persisted map of every known entity to
//! the version last synced, plus the search metadata needed to re-derive
//! filenames and folder placement.
//!
//! One JSON file at the sync root. The filename prefix is configurable;
//! the literal prefix `"hostname"` qualifies the file with the local host
//! name so per-instance baselines can share one repository.
//!
//! Writes use the same atomic `.tmp` + rename pattern as every other
//! persisted file in boardsync.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::types::{LibraryMeta, SearchMeta, Uid};

/// The "defs" record.
///
/// Invariant: a uid present in a version map is also present in the
/// matching metadata map. Use [`Baseline::record_dashboard`] /
/// [`Baseline::remove_dashboard`] (and the library equivalents) so both
/// maps move together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Baseline {
    #[serde(rename = "dashboardVersionByUID", default)]
    pub dashboard_versions: BTreeMap<Uid, i64>,
    #[serde(rename = "dashboardMetaByUID", default)]
    pub dashboard_meta: BTreeMap<Uid, SearchMeta>,

    #[serde(rename = "libraryVersionByUID", default)]
    pub library_versions: BTreeMap<Uid, i64>,
    #[serde(rename = "libraryMetaByUID", default)]
    pub library_meta: BTreeMap<Uid, LibraryMeta>,

    #[serde(rename = "foldersMetaByUID", default)]
    pub folder_meta: BTreeMap<Uid, SearchMeta>,
}

impl Baseline {
    pub fn record_dashboard(&mut self, meta: SearchMeta, version: i64) {
        let uid = meta.uid.clone();
        self.dashboard_versions.insert(uid.clone(), version);
        self.dashboard_meta.insert(uid, meta);
    }

    pub fn remove_dashboard(&mut self, uid: &Uid) {
        self.dashboard_versions.remove(uid);
        self.dashboard_meta.remove(uid);
    }

    pub fn record_library(&mut self, meta: LibraryMeta, version: i64) {
        let uid = meta.uid.clone();
        self.library_versions.insert(uid.clone(), version);
        self.library_meta.insert(uid, meta);
    }

    pub fn remove_library(&mut self, uid: &Uid) {
        self.library_versions.remove(uid);
        self.library_meta.remove(uid);
    }

    pub fn dashboard_version(&self, uid: &Uid) -> Option<i64> {
        self.dashboard_versions.get(uid).copied()
    }

    pub fn library_version(&self, uid: &Uid) -> Option<i64> {
        self.library_versions.get(uid).copied()
    }
}

// ---------------------------------------------------------------------------
// Schema migration
// ---------------------------------------------------------------------------

/// Superset reader covering the current schema plus the retired flat
/// "version file" schema. Legacy keys are consumed once on load and never
/// written back.
#[derive(Debug, Deserialize)]
struct BaselineCompat {
    #[serde(flatten)]
    current: Baseline,

    #[serde(rename = "dashboardMetaByTitle", default)]
    legacy_meta_by_title: BTreeMap<String, SearchMeta>,
    #[serde(rename = "dashboardVersionBySlug", default)]
    legacy_version_by_slug: BTreeMap<String, i64>,
}

// ---------------------------------------------------------------------------
// Filename
// ---------------------------------------------------------------------------

const BASELINE_SUFFIX: &str = "defs.json";

/// Baseline filename for a configured prefix.
///
/// The literal prefix `"hostname"` expands to `<host>-defs.json`; anything
/// else is prepended verbatim (an empty prefix gives a fixed shared name).
pub fn baseline_filename(prefix: &str) -> String {
    if prefix == "hostname" {
        format!("{}-{}", local_hostname(), BASELINE_SUFFIX)
    } else {
        format!("{prefix}{BASELINE_SUFFIX}")
    }
}

/// Full path of the baseline file under `dir`.
pub fn baseline_path(dir: &Path, prefix: &str) -> PathBuf {
    dir.join(baseline_filename(prefix))
}

fn local_hostname() -> String {
    if let Ok(host) = std::env::var("HOSTNAME") {
        if !host.trim().is_empty() {
            return host.trim().to_string();
        }
    }
    if let Ok(host) = std::fs::read_to_string("/etc/hostname") {
        if !host.trim().is_empty() {
            return host.trim().to_string();
        }
    }
    "local".to_string()
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load the baseline from `dir`.
///
/// A missing file is the first-run case and yields an empty record. A file
/// that exists but does not parse is a fatal [`CoreError::Parse`] — treating
/// corruption as "empty" would silently erase sync history.
///
/// The second return value lists entity names found only in the legacy
/// schema; the pull reconciler consumes it once to clear their files.
pub fn load(dir: &Path, prefix: &str) -> Result<(Baseline, Vec<String>), CoreError> {
    let path = baseline_path(dir, prefix);
    if !path.exists() {
        return Ok((Baseline::default(), Vec::new()));
    }

    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let compat: BaselineCompat =
        serde_json::from_str(&contents).map_err(|e| CoreError::Parse {
            path,
            message: e.to_string(),
        })?;

    let legacy_names = if compat.legacy_version_by_slug.is_empty() {
        Vec::new()
    } else {
        compat.legacy_meta_by_title.keys().cloned().collect()
    };

    Ok((compat.current, legacy_names))
}

/// Persist the baseline to `dir` atomically: serialize (pretty, for
/// diff-friendly commits), write a `.tmp` sibling, rename over the target.
pub fn save(dir: &Path, prefix: &str, baseline: &Baseline) -> Result<(), CoreError> {
    let path = baseline_path(dir, prefix);
    let tmp = path.with_extension("json.tmp");

    let mut json = serde_json::to_string_pretty(baseline)?;
    json.push('\n');

    std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn dash_meta(uid: &str, title: &str) -> SearchMeta {
        SearchMeta {
            title: title.to_string(),
            type_tag: "dash-db".to_string(),
            uid: Uid::from(uid),
            ..SearchMeta::default()
        }
    }

    #[test]
    fn missing_file_is_first_run() {
        let dir = TempDir::new().unwrap();
        let (baseline, legacy) = load(dir.path(), "").expect("load");
        assert_eq!(baseline, Baseline::default());
        assert!(legacy.is_empty());
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut baseline = Baseline::default();
        baseline.record_dashboard(dash_meta("d1", "Latency"), 3);

        save(dir.path(), "", &baseline).expect("save");
        let (loaded, legacy) = load(dir.path(), "").expect("load");
        assert_eq!(loaded, baseline);
        assert!(legacy.is_empty());
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let dir = TempDir::new().unwrap();
        save(dir.path(), "", &Baseline::default()).expect("save");
        let tmp = baseline_path(dir.path(), "").with_extension("json.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after a successful save");
    }

    #[test]
    fn corrupt_file_is_fatal_not_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(baseline_path(dir.path(), ""), "{not json").unwrap();
        let err = load(dir.path(), "").expect_err("corruption must fail the load");
        assert!(matches!(err, CoreError::Parse { .. }));
    }

    #[test]
    fn version_and_meta_maps_move_together() {
        let mut baseline = Baseline::default();
        baseline.record_dashboard(dash_meta("d1", "Latency"), 1);
        assert!(baseline.dashboard_versions.contains_key(&Uid::from("d1")));
        assert!(baseline.dashboard_meta.contains_key(&Uid::from("d1")));

        baseline.remove_dashboard(&Uid::from("d1"));
        assert!(baseline.dashboard_versions.is_empty());
        assert!(baseline.dashboard_meta.is_empty());
    }

    #[test]
    fn legacy_schema_upgrades_in_memory() {
        let dir = TempDir::new().unwrap();
        let legacy_json = r#"{
            "dashboardVersionBySlug": {"latency": 2},
            "dashboardMetaByTitle": {
                "latency": {"title": "Latency", "type": "dash-db", "uid": "d1"}
            },
            "dashboardVersionByUID": {"d1": 2}
        }"#;
        std::fs::write(baseline_path(dir.path(), ""), legacy_json).unwrap();

        let (baseline, legacy) = load(dir.path(), "").expect("load");
        assert_eq!(baseline.dashboard_version(&Uid::from("d1")), Some(2));
        assert_eq!(legacy, vec!["latency".to_string()]);

        // The next save drops the legacy keys for good.
        save(dir.path(), "", &baseline).expect("save");
        let rewritten = std::fs::read_to_string(baseline_path(dir.path(), "")).unwrap();
        assert!(!rewritten.contains("dashboardVersionBySlug"));
        assert!(!rewritten.contains("dashboardMetaByTitle"));
    }

    #[test]
    fn filename_prefixes() {
        assert_eq!(baseline_filename(""), "defs.json");
        assert_eq!(baseline_filename("shared-"), "shared-defs.json");
        let host_qualified = baseline_filename("hostname");
        assert!(host_qualified.ends_with("-defs.json"));
        assert_ne!(host_qualified, "-defs.json");
    }
}
