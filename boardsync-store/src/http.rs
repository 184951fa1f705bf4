//! HTTP implementation of [`DefinitionStore`] over the visualization
//! server's REST API.
//!
//! Auth is a bearer token when `api_key` is configured, basic auth when a
//! username/password pair is, and anonymous otherwise.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use boardsync_core::config::StoreConfig;
use boardsync_core::types::{FolderRef, LibraryMeta, SearchMeta, Uid};

use crate::error::{request_err, StoreError};
use crate::{DefinitionStore, FetchedDashboard, FetchedLibrary};

const SEARCH_LIMIT: u32 = 5000;
const LIBRARY_PAGE_SIZE: usize = 100;

pub struct HttpStore {
    agent: ureq::Agent,
    base_url: String,
    auth: Option<String>,
}

impl HttpStore {
    pub fn new(config: &StoreConfig) -> Self {
        HttpStore {
            agent: ureq::Agent::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth: auth_header(config),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let req = self.agent.request(method, &self.url(path));
        match &self.auth {
            Some(header) => req.set("Authorization", header),
            None => req,
        }
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, StoreError> {
        debug!("GET {path}");
        let response = self.request("GET", path).call().map_err(request_err)?;
        response.into_json().map_err(|e| StoreError::Malformed {
            reason: e.to_string(),
        })
    }

    fn send_json(&self, method: &str, path: &str, payload: Value) -> Result<(), StoreError> {
        debug!("{method} {path}");
        self.request(method, path)
            .send_json(payload)
            .map_err(request_err)?;
        Ok(())
    }

    fn delete(&self, path: &str, what: String) -> Result<(), StoreError> {
        debug!("DELETE {path}");
        match self.request("DELETE", path).call() {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(404, _)) => Err(StoreError::NotFound { what }),
            Err(err) => Err(request_err(err)),
        }
    }

    fn library_version(&self, uid: &Uid) -> Result<i64, StoreError> {
        #[derive(Deserialize)]
        struct Envelope {
            result: Inner,
        }
        #[derive(Deserialize)]
        struct Inner {
            #[serde(default)]
            version: i64,
        }
        let envelope: Envelope = self.get_json(&format!("/api/library-elements/{uid}"))?;
        Ok(envelope.result.version)
    }
}

impl DefinitionStore for HttpStore {
    fn search(&self) -> Result<Vec<SearchMeta>, StoreError> {
        self.get_json(&format!("/api/search?limit={SEARCH_LIMIT}"))
    }

    fn get_dashboard(&self, uid: &Uid) -> Result<FetchedDashboard, StoreError> {
        let path = format!("/api/dashboards/uid/{uid}");
        match self.request("GET", &path).call() {
            Ok(response) => {
                let envelope: Value = response.into_json().map_err(|e| StoreError::Malformed {
                    reason: e.to_string(),
                })?;
                parse_dashboard(uid, envelope)
            }
            Err(ureq::Error::Status(404, _)) => Err(StoreError::NotFound {
                what: format!("dashboard {uid}"),
            }),
            Err(err) => Err(request_err(err)),
        }
    }

    fn create_or_update_dashboard(
        &self,
        body: &Value,
        folder_id: Option<i64>,
    ) -> Result<(), StoreError> {
        let mut dashboard = body.clone();
        if let Some(map) = dashboard.as_object_mut() {
            // The store allocates its own instance id on import.
            map.insert("id".to_string(), Value::Null);
        }
        let payload = json!({
            "dashboard": dashboard,
            "folderId": folder_id.unwrap_or(0),
            "overwrite": true,
        });
        self.send_json("POST", "/api/dashboards/db", payload)
    }

    fn delete_dashboard(&self, uid: &Uid) -> Result<(), StoreError> {
        self.delete(
            &format!("/api/dashboards/uid/{uid}"),
            format!("dashboard {uid}"),
        )
    }

    fn list_folders(&self) -> Result<Vec<FolderRef>, StoreError> {
        self.get_json("/api/folders?limit=1000")
    }

    fn create_or_update_folder(&self, uid: &Uid, title: &str) -> Result<(), StoreError> {
        let payload = json!({ "uid": uid, "title": title });
        match self.send_json("POST", "/api/folders", payload) {
            Ok(()) => Ok(()),
            // Already present under this uid; move to an overwriting update.
            Err(StoreError::Http { status, .. }) if status == 400 || status == 409 || status == 412 => {
                debug!("folder {uid} exists, updating title");
                self.send_json(
                    "PUT",
                    &format!("/api/folders/{uid}"),
                    json!({ "title": title, "overwrite": true }),
                )
            }
            Err(err) => Err(err),
        }
    }

    fn list_library_elements(&self) -> Result<Vec<FetchedLibrary>, StoreError> {
        #[derive(Deserialize)]
        struct Envelope {
            result: Page,
        }
        #[derive(Deserialize)]
        struct Page {
            #[serde(default)]
            elements: Vec<Value>,
        }

        let mut out = Vec::new();
        let mut page = 1usize;
        loop {
            let envelope: Envelope = self.get_json(&format!(
                "/api/library-elements/?perPage={LIBRARY_PAGE_SIZE}&page={page}"
            ))?;
            let count = envelope.result.elements.len();
            for raw in envelope.result.elements {
                let meta: LibraryMeta =
                    serde_json::from_value(raw.clone()).map_err(|e| StoreError::Malformed {
                        reason: format!("library element listing: {e}"),
                    })?;
                out.push(FetchedLibrary { meta, raw });
            }
            if count < LIBRARY_PAGE_SIZE {
                return Ok(out);
            }
            page += 1;
        }
    }

    fn create_or_update_library(
        &self,
        body: &Value,
        folder_id: Option<i64>,
    ) -> Result<(), StoreError> {
        let payload = library_payload(body, folder_id)?;
        let uid = payload["uid"].as_str().unwrap_or_default().to_string();

        match self.send_json("POST", "/api/library-elements", payload.clone()) {
            Ok(()) => Ok(()),
            // The store answers 400 when the uid already exists; re-submit
            // as an update carrying the store's current version.
            Err(StoreError::Http { status: 400, .. }) => {
                let version = self.library_version(&Uid::from(uid.as_str()))?;
                let mut update = payload;
                if let Some(map) = update.as_object_mut() {
                    map.insert("version".to_string(), json!(version));
                }
                debug!("library element {uid} exists, patching at version {version}");
                self.send_json("PATCH", &format!("/api/library-elements/{uid}"), update)
            }
            Err(err) => Err(err),
        }
    }

    fn delete_library(&self, uid: &Uid) -> Result<(), StoreError> {
        self.delete(
            &format!("/api/library-elements/{uid}"),
            format!("library element {uid}"),
        )
    }
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

fn auth_header(config: &StoreConfig) -> Option<String> {
    if let Some(key) = &config.api_key {
        return Some(format!("Bearer {key}"));
    }
    match (&config.username, &config.password) {
        (Some(user), Some(pass)) => {
            Some(format!("Basic {}", BASE64.encode(format!("{user}:{pass}"))))
        }
        _ => {
            warn!("no store credentials configured, requests are anonymous");
            None
        }
    }
}

/// Pull the fields reconciliation keys on out of the `GET /api/dashboards`
/// envelope (`{"dashboard": {...}, "meta": {...}}`).
fn parse_dashboard(uid: &Uid, envelope: Value) -> Result<FetchedDashboard, StoreError> {
    let body = envelope
        .get("dashboard")
        .cloned()
        .filter(Value::is_object)
        .ok_or_else(|| StoreError::Malformed {
            reason: format!("dashboard {uid}: envelope has no dashboard object"),
        })?;

    let title = body
        .get("title")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Malformed {
            reason: format!("dashboard {uid}: body has no title"),
        })?
        .to_string();

    let version = body.get("version").and_then(Value::as_i64).unwrap_or(0);

    let folder_uid = envelope
        .pointer("/meta/folderUid")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(FetchedDashboard {
        uid: uid.clone(),
        title,
        version,
        folder_uid,
        body,
    })
}

/// Build the write payload for a library element from its canonical body.
fn library_payload(body: &Value, folder_id: Option<i64>) -> Result<Value, StoreError> {
    let object = body.as_object().ok_or_else(|| StoreError::Malformed {
        reason: "library element body is not an object".to_string(),
    })?;

    let uid = object
        .get("uid")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Malformed {
            reason: "library element body has no uid".to_string(),
        })?;
    let name = object
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Malformed {
            reason: format!("library element {uid}: body has no name"),
        })?;
    let model = object.get("model").cloned().unwrap_or(Value::Null);
    let kind = object.get("kind").and_then(Value::as_i64).unwrap_or(1);

    Ok(json!({
        "uid": uid,
        "name": name,
        "kind": kind,
        "model": model,
        "folderId": folder_id.unwrap_or(0),
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
