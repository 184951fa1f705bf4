//! Domain types shared across the boardsync crates.
//!
//! Wire-facing structs keep the definition store's JSON field names so the
//! baseline file stays readable by (and portable between) instances.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A store-issued stable identifier, immutable for the entity's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Uid(pub String);

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Uid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Uid {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl Default for Uid {
    fn default() -> Self {
        Uid(String::new())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The kind of entity managed by the definition store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Dashboard,
    Folder,
    LibraryElement,
}

impl EntityKind {
    /// Subdirectory of the sync root that holds this kind's canonical files.
    pub fn dir(&self) -> &'static str {
        match self {
            EntityKind::Dashboard => "dashboards",
            EntityKind::Folder => "folders",
            EntityKind::LibraryElement => "libraries",
        }
    }

    /// Map the definition store's search type tag to a kind.
    /// Returns `None` for tags the engine does not manage.
    pub fn from_type_tag(tag: &str) -> Option<Self> {
        match tag {
            "dash-db" => Some(EntityKind::Dashboard),
            "dash-folder" => Some(EntityKind::Folder),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Dashboard => write!(f, "dashboard"),
            EntityKind::Folder => write!(f, "folder"),
            EntityKind::LibraryElement => write!(f, "library-element"),
        }
    }
}

// ---------------------------------------------------------------------------
// Store metadata structs
// ---------------------------------------------------------------------------

/// One element of the definition store's search response, covering both
/// dashboards and folders (the `type` tag tells them apart).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SearchMeta {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub uri: String,
    #[serde(rename = "type", default)]
    pub type_tag: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(rename = "isStarred", default)]
    pub starred: bool,
    #[serde(default)]
    pub uid: Uid,
    #[serde(rename = "folderUid", default, skip_serializing_if = "Option::is_none")]
    pub folder_uid: Option<String>,
    #[serde(rename = "folderId", default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<i64>,
}

/// One element of the definition store's library-element listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LibraryMeta {
    #[serde(default)]
    pub id: i64,
    #[serde(rename = "orgId", default)]
    pub org_id: i64,
    #[serde(rename = "folderId", default)]
    pub folder_id: i64,
    #[serde(default)]
    pub uid: Uid,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: i64,
    #[serde(rename = "type", default)]
    pub type_tag: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub meta: LibraryElementMeta,
}

/// Nested `meta` block of a library-element listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LibraryElementMeta {
    #[serde(rename = "folderName", default)]
    pub folder_name: String,
    #[serde(rename = "folderUid", default)]
    pub folder_uid: String,
    #[serde(rename = "connectedDashboards", default)]
    pub connected_dashboards: i64,
}

/// A folder as returned by the definition store's folder listing.
/// Carries the store-local numeric id the resolver bridges to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRef {
    pub id: i64,
    pub uid: Uid,
    pub title: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_display_and_from() {
        assert_eq!(Uid::from("d1").to_string(), "d1");
        assert_eq!(Uid::from(String::from("d1")), Uid::from("d1"));
    }

    #[test]
    fn kind_from_type_tag() {
        assert_eq!(EntityKind::from_type_tag("dash-db"), Some(EntityKind::Dashboard));
        assert_eq!(EntityKind::from_type_tag("dash-folder"), Some(EntityKind::Folder));
        assert_eq!(EntityKind::from_type_tag("alert-rule"), None);
    }

    #[test]
    fn kind_dirs_are_stable() {
        assert_eq!(EntityKind::Dashboard.dir(), "dashboards");
        assert_eq!(EntityKind::Folder.dir(), "folders");
        assert_eq!(EntityKind::LibraryElement.dir(), "libraries");
    }

    #[test]
    fn search_meta_reads_store_field_names() {
        let json = r#"{
            "id": 7,
            "title": "Latency",
            "uri": "db/latency",
            "type": "dash-db",
            "tags": ["prod"],
            "isStarred": true,
            "uid": "d1",
            "folderUid": "f1",
            "folderId": 3
        }"#;
        let meta: SearchMeta = serde_json::from_str(json).expect("parse");
        assert_eq!(meta.uid, Uid::from("d1"));
        assert_eq!(meta.folder_uid.as_deref(), Some("f1"));
        assert_eq!(meta.folder_id, Some(3));
        assert!(meta.starred);
    }

    #[test]
    fn library_meta_reads_nested_folder_uid() {
        let json = r#"{
            "id": 1,
            "orgId": 1,
            "folderId": 3,
            "uid": "lib1",
            "name": "CPU panel",
            "kind": 1,
            "type": "timeseries",
            "version": 4,
            "meta": {"folderName": "Infra", "folderUid": "f1", "connectedDashboards": 2}
        }"#;
        let meta: LibraryMeta = serde_json::from_str(json).expect("parse");
        assert_eq!(meta.meta.folder_uid, "f1");
        assert_eq!(meta.version, 4);
    }
}
