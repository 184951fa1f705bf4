//! Definition-store client.
//!
//! [`DefinitionStore`] is the seam between the reconciliation engine and the
//! visualization server's HTTP API: the engine is written against the trait,
//! tests substitute an in-memory fake, and [`HttpStore`] is the production
//! implementation.

pub mod error;
pub mod http;

use serde_json::Value;

use boardsync_core::types::{FolderRef, LibraryMeta, SearchMeta, Uid};

pub use error::StoreError;
pub use http::HttpStore;

/// A dashboard fetched by uid: the full body plus the fields reconciliation
/// keys on.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedDashboard {
    pub uid: Uid,
    pub title: String,
    pub version: i64,
    pub folder_uid: Option<String>,
    pub body: Value,
}

/// A library element as listed by the store: parsed metadata plus the raw
/// element JSON the codec canonicalizes.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedLibrary {
    pub meta: LibraryMeta,
    pub raw: Value,
}

/// Operations the reconciliation engine needs from the definition store.
pub trait DefinitionStore {
    /// List every dashboard and folder the caller can see. Entries carry a
    /// type tag; kinds the engine does not manage are filtered downstream.
    fn search(&self) -> Result<Vec<SearchMeta>, StoreError>;

    fn get_dashboard(&self, uid: &Uid) -> Result<FetchedDashboard, StoreError>;

    /// Create or overwrite a dashboard. `folder_id` places it; `None` means
    /// the store's root folder.
    fn create_or_update_dashboard(
        &self,
        body: &Value,
        folder_id: Option<i64>,
    ) -> Result<(), StoreError>;

    fn delete_dashboard(&self, uid: &Uid) -> Result<(), StoreError>;

    fn list_folders(&self) -> Result<Vec<FolderRef>, StoreError>;

    /// Create the folder, or update its title if the uid already exists.
    fn create_or_update_folder(&self, uid: &Uid, title: &str) -> Result<(), StoreError>;

    fn list_library_elements(&self) -> Result<Vec<FetchedLibrary>, StoreError>;

    /// Create or update a library element. Updates need the store's current
    /// version; a stale version surfaces as a conflict the caller skips.
    fn create_or_update_library(
        &self,
        body: &Value,
        folder_id: Option<i64>,
    ) -> Result<(), StoreError>;

    fn delete_library(&self, uid: &Uid) -> Result<(), StoreError>;
}
