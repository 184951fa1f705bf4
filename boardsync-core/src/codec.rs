//! Canonical-form codec.
//!
//! Converts raw definition-store payloads into the instance-independent
//! form persisted to files, and back. The canonical form strips every
//! field the store regenerates per instance (numeric ids, version
//! counters, timestamps, actor fields) and carries the portable folder
//! reference under a dedicated out-of-band key so the store's internal
//! numeric folder id never leaks into committed files.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::types::{EntityKind, SearchMeta, Uid};

/// Out-of-band key holding the stable folder identifier in canonical bodies.
pub const FOLDER_KEY: &str = "__folderUID";

/// A canonical body plus the filename it is stored under (no extension).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canonical {
    pub body: Value,
    pub filename: String,
}

/// The fields recovered from a canonical body in the push direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub uid: Uid,
    pub title: String,
    pub folder_uid: Option<String>,
    /// Presentation body with the out-of-band folder key removed.
    pub body: Value,
}

/// Typed view of the header fields the codec must read from any body.
/// Dashboards carry `title`, library elements carry `name`.
#[derive(Debug, Deserialize)]
struct BodyHeader {
    uid: Option<String>,
    title: Option<String>,
    name: Option<String>,
}

// ---------------------------------------------------------------------------
// Filename derivation
// ---------------------------------------------------------------------------

/// Canonical filename for an entity: `<uid>:<sanitized title>`.
///
/// Every character outside `[A-Za-z0-9_-]` maps to a single underscore, so
/// `("abc123", "CPU Usage!!")` yields `"abc123:CPU_Usage__"`. Unicode-only
/// titles collapse to underscores; collisions beyond the uid prefix are not
/// deduplicated (the uid prefix already makes the name unique).
pub fn filename(uid: &Uid, title: &str) -> String {
    let mut out = String::with_capacity(uid.0.len() + 1 + title.len());
    out.push_str(&uid.0);
    out.push(':');
    for c in title.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Rewrite a raw dashboard or library-element body into canonical form and
/// derive its filename.
///
/// Fails with [`CoreError::MalformedEntity`] when the body is not a JSON
/// object or its `uid`/title cannot be extracted.
pub fn encode(
    kind: EntityKind,
    raw: &Value,
    folder_uid: Option<&str>,
) -> Result<Canonical, CoreError> {
    let (uid, title) = read_header(kind, raw)?;

    let mut obj = raw
        .as_object()
        .cloned()
        .ok_or_else(|| malformed("body is not a JSON object"))?;

    match kind {
        EntityKind::Dashboard => scrub_dashboard(&mut obj),
        EntityKind::LibraryElement => scrub_library(&mut obj),
        EntityKind::Folder => {}
    }

    obj.insert(
        FOLDER_KEY.to_string(),
        Value::String(folder_uid.unwrap_or_default().to_string()),
    );

    Ok(Canonical {
        filename: filename(&uid, &title),
        body: Value::Object(obj),
    })
}

/// Build the canonical body for a folder from its search metadata.
/// Folders have no version counter and no volatile body to scrub.
pub fn encode_folder(meta: &SearchMeta) -> Canonical {
    let mut obj = Map::new();
    obj.insert("title".to_string(), Value::String(meta.title.clone()));
    obj.insert("uid".to_string(), Value::String(meta.uid.0.clone()));
    obj.insert("uri".to_string(), Value::String(meta.uri.clone()));
    obj.insert(
        "tags".to_string(),
        Value::Array(meta.tags.iter().cloned().map(Value::String).collect()),
    );
    obj.insert("isStarred".to_string(), Value::Bool(meta.starred));
    if let Some(parent) = &meta.folder_uid {
        obj.insert("folderUid".to_string(), Value::String(parent.clone()));
    }
    Canonical {
        filename: filename(&meta.uid, &meta.title),
        body: Value::Object(obj),
    }
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Inverse extraction for the push direction: recover the uid, title, and
/// folder reference from a canonical body and return the presentation body
/// with the out-of-band folder key removed.
pub fn decode(kind: EntityKind, canonical: &Value) -> Result<Decoded, CoreError> {
    let (uid, title) = read_header(kind, canonical)?;

    let mut obj = canonical
        .as_object()
        .cloned()
        .ok_or_else(|| malformed("body is not a JSON object"))?;

    let folder_uid = match obj.remove(FOLDER_KEY) {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    };

    Ok(Decoded {
        uid,
        title,
        folder_uid,
        body: Value::Object(obj),
    })
}

/// Pretty-print a canonical body the way it is written to disk:
/// sorted keys, two-space indent, trailing newline.
pub fn to_disk_string(body: &Value) -> Result<String, CoreError> {
    let mut s = serde_json::to_string_pretty(body)?;
    s.push('\n');
    Ok(s)
}

// ---------------------------------------------------------------------------
// Field scrubbing (typed key removal, never string-path tree walking)
// ---------------------------------------------------------------------------

/// Fields that exist only on an individual store instance.
const INSTANCE_KEYS: &[&str] = &["id", "version"];
const ACTOR_KEYS: &[&str] = &["created", "createdBy", "updated", "updatedBy"];

fn scrub_dashboard(obj: &mut Map<String, Value>) {
    strip_keys(obj, INSTANCE_KEYS);
    if let Some(Value::Object(meta)) = obj.get_mut("meta") {
        strip_keys(meta, &["created", "updated"]);
    }
    // Library panels embedded in dashboards carry their own per-instance
    // version and audit fields.
    if let Some(Value::Array(panels)) = obj.get_mut("panels") {
        for panel in panels {
            if let Some(Value::Object(lib)) = panel.get_mut("libraryPanel") {
                scrub_library_panel(lib);
            }
        }
    }
}

fn scrub_library(obj: &mut Map<String, Value>) {
    strip_keys(obj, INSTANCE_KEYS);
    strip_keys(obj, &["folderId"]);
    if let Some(Value::Object(meta)) = obj.get_mut("meta") {
        strip_keys(meta, &["created", "updated"]);
    }
    if let Some(Value::Object(model)) = obj.get_mut("model") {
        if let Some(Value::Object(lib)) = model.get_mut("libraryPanel") {
            scrub_library_panel(lib);
        }
    }
}

fn scrub_library_panel(lib: &mut Map<String, Value>) {
    strip_keys(lib, &["version"]);
    strip_keys(lib, ACTOR_KEYS);
    if let Some(Value::Object(meta)) = lib.get_mut("meta") {
        strip_keys(meta, ACTOR_KEYS);
    }
}

fn strip_keys(obj: &mut Map<String, Value>, keys: &[&str]) {
    for key in keys {
        obj.remove(*key);
    }
}

fn read_header(kind: EntityKind, body: &Value) -> Result<(Uid, String), CoreError> {
    let header: BodyHeader = serde_json::from_value(body.clone())
        .map_err(|e| malformed(&format!("unreadable header fields: {e}")))?;

    let uid = header
        .uid
        .filter(|u| !u.is_empty())
        .ok_or_else(|| malformed("missing uid"))?;

    // Dashboards and folders title their bodies with `title`; library
    // elements use `name`.
    let title = match kind {
        EntityKind::LibraryElement => header.name.or(header.title),
        _ => header.title.or(header.name),
    }
    .ok_or_else(|| malformed("missing title"))?;

    Ok((Uid(uid), title))
}

fn malformed(reason: &str) -> CoreError {
    CoreError::MalformedEntity {
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case("abc123", "CPU Usage!!", "abc123:CPU_Usage__")]
    #[case("d1", "Latency", "d1:Latency")]
    #[case("d2", "", "d2:")]
    #[case("d3", "métriques", "d3:m_triques")]
    #[case("d4", "a-b_c.d", "d4:a-b_c_d")]
    fn filename_is_deterministic(#[case] uid: &str, #[case] title: &str, #[case] want: &str) {
        let uid = Uid::from(uid);
        assert_eq!(filename(&uid, title), want);
        // Repeated invocation must not change the result.
        assert_eq!(filename(&uid, title), want);
    }

    #[test]
    fn encode_strips_volatile_fields_and_injects_folder() {
        let raw = json!({
            "uid": "d1",
            "title": "Latency",
            "id": 42,
            "version": 7,
            "panels": [
                {"type": "graph"},
                {"libraryPanel": {
                    "uid": "lib1",
                    "version": 3,
                    "created": "2024-01-01T00:00:00Z",
                    "meta": {"createdBy": "admin", "updated": "2024-01-02T00:00:00Z"}
                }}
            ]
        });

        let canonical = encode(EntityKind::Dashboard, &raw, Some("f1")).expect("encode");
        assert_eq!(canonical.filename, "d1:Latency");

        let body = canonical.body.as_object().unwrap();
        assert!(!body.contains_key("id"));
        assert!(!body.contains_key("version"));
        assert_eq!(body[FOLDER_KEY], json!("f1"));

        let lib = &canonical.body["panels"][1]["libraryPanel"];
        assert!(lib.get("version").is_none());
        assert!(lib.get("created").is_none());
        assert!(lib["meta"].get("createdBy").is_none());
        assert_eq!(lib["uid"], json!("lib1"));
    }

    #[test]
    fn encode_library_strips_model_panel_and_folder_id() {
        let raw = json!({
            "uid": "lib1",
            "name": "CPU panel",
            "id": 5,
            "version": 2,
            "folderId": 9,
            "meta": {"created": "x", "updated": "y", "folderUid": "f1"},
            "model": {"libraryPanel": {"version": 2, "updatedBy": "admin"}, "type": "timeseries"}
        });

        let canonical = encode(EntityKind::LibraryElement, &raw, Some("f1")).expect("encode");
        assert_eq!(canonical.filename, "lib1:CPU_panel");

        let body = canonical.body.as_object().unwrap();
        assert!(!body.contains_key("id"));
        assert!(!body.contains_key("version"));
        assert!(!body.contains_key("folderId"));
        assert!(canonical.body["meta"].get("created").is_none());
        assert_eq!(canonical.body["meta"]["folderUid"], json!("f1"));
        assert!(canonical.body["model"]["libraryPanel"].get("version").is_none());
        assert_eq!(canonical.body["model"]["type"], json!("timeseries"));
    }

    #[test]
    fn encode_requires_uid_and_title() {
        let no_uid = json!({"title": "Latency"});
        assert!(matches!(
            encode(EntityKind::Dashboard, &no_uid, None),
            Err(CoreError::MalformedEntity { .. })
        ));

        let no_title = json!({"uid": "d1"});
        assert!(matches!(
            encode(EntityKind::Dashboard, &no_title, None),
            Err(CoreError::MalformedEntity { .. })
        ));

        let not_object = json!([1, 2, 3]);
        assert!(matches!(
            encode(EntityKind::Dashboard, &not_object, None),
            Err(CoreError::MalformedEntity { .. })
        ));
    }

    #[test]
    fn decode_recovers_header_and_strips_folder_key() {
        let raw = json!({"uid": "d1", "title": "Latency", "version": 3, "rows": []});
        let canonical = encode(EntityKind::Dashboard, &raw, Some("f1")).expect("encode");

        let decoded = decode(EntityKind::Dashboard, &canonical.body).expect("decode");
        assert_eq!(decoded.uid, Uid::from("d1"));
        assert_eq!(decoded.title, "Latency");
        assert_eq!(decoded.folder_uid.as_deref(), Some("f1"));
        assert!(decoded.body.get(FOLDER_KEY).is_none());
        assert_eq!(decoded.body["rows"], json!([]));
    }

    #[test]
    fn decode_empty_folder_key_means_no_folder() {
        let canonical = json!({"uid": "d1", "title": "T", "__folderUID": ""});
        let decoded = decode(EntityKind::Dashboard, &canonical).expect("decode");
        assert_eq!(decoded.folder_uid, None);
    }

    #[test]
    fn roundtrip_reencoding_is_byte_identical() {
        let raw = json!({
            "uid": "d1",
            "title": "Latency",
            "id": 42,
            "version": 7,
            "zeta": {"nested": true},
            "alpha": [1, 2, 3]
        });

        let first = encode(EntityKind::Dashboard, &raw, Some("f1")).expect("first encode");
        let decoded = decode(EntityKind::Dashboard, &first.body).expect("decode");
        let second = encode(
            EntityKind::Dashboard,
            &decoded.body,
            decoded.folder_uid.as_deref(),
        )
        .expect("second encode");

        assert_eq!(decoded.uid, Uid::from("d1"));
        assert_eq!(decoded.title, "Latency");
        assert_eq!(
            to_disk_string(&first.body).unwrap(),
            to_disk_string(&second.body).unwrap(),
            "re-encoding a decoded body must be byte-identical"
        );
    }

    #[test]
    fn folder_canonical_form_carries_listing_fields() {
        let meta = SearchMeta {
            id: 3,
            title: "Infra".to_string(),
            uri: "db/infra".to_string(),
            type_tag: "dash-folder".to_string(),
            tags: vec!["prod".to_string()],
            starred: false,
            uid: Uid::from("f1"),
            folder_uid: None,
            folder_id: None,
        };
        let canonical = encode_folder(&meta);
        assert_eq!(canonical.filename, "f1:Infra");
        assert_eq!(canonical.body["uid"], json!("f1"));
        assert_eq!(canonical.body["title"], json!("Infra"));
        // Store-local numeric id never reaches the canonical form.
        assert!(canonical.body.get("id").is_none());
    }

    #[test]
    fn disk_string_is_indented_with_trailing_newline() {
        let s = to_disk_string(&json!({"b": 1, "a": 2})).unwrap();
        assert!(s.starts_with("{\n"));
        assert!(s.ends_with("}\n"));
        // serde_json sorts object keys, which keeps encodings deterministic.
        assert!(s.find("\"a\"").unwrap() < s.find("\"b\"").unwrap());
    }
}
