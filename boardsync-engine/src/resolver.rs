//! Folder-reference resolver.
//!
//! Canonical files carry the portable folder uid; some store write paths
//! only accept the store-local numeric folder id. The resolver bridges the
//! two against a folder listing fetched once per batch.

use tracing::warn;

use boardsync_core::types::FolderRef;

/// Map a folder uid to the store's numeric id by scanning `folders`.
///
/// A missing or empty reference means the root folder. An unresolvable
/// reference degrades to the root folder with a warning instead of failing
/// the write; the folder may have been deleted upstream.
pub fn resolve_folder_id(folders: &[FolderRef], folder_uid: Option<&str>) -> Option<i64> {
    let uid = folder_uid?;
    if uid.is_empty() {
        return None;
    }
    match folders.iter().find(|f| f.uid.0 == uid) {
        Some(folder) => Some(folder.id),
        None => {
            warn!("folder {uid} not found in store, placing entity at the root");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use boardsync_core::types::Uid;

    use super::*;

    fn folders() -> Vec<FolderRef> {
        vec![
            FolderRef {
                id: 3,
                uid: Uid::from("f1"),
                title: "Infra".to_string(),
            },
            FolderRef {
                id: 9,
                uid: Uid::from("f2"),
                title: "Apps".to_string(),
            },
        ]
    }

    #[test]
    fn resolves_known_uid() {
        assert_eq!(resolve_folder_id(&folders(), Some("f2")), Some(9));
    }

    #[test]
    fn unknown_uid_degrades_to_root() {
        assert_eq!(resolve_folder_id(&folders(), Some("gone")), None);
    }

    #[test]
    fn missing_and_empty_references_mean_root() {
        assert_eq!(resolve_folder_id(&folders(), None), None);
        assert_eq!(resolve_folder_id(&folders(), Some("")), None);
    }
}
