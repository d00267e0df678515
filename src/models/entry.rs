use serde::{Deserialize, Serialize};

use crate::services::fs::paths;

/// One filesystem object, recomputed from disk on every access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    pub name: String,
    pub parent_id: String,
    #[serde(flatten)]
    pub kind: EntryKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EntryKind {
    #[serde(rename_all = "camelCase")]
    File { content_type: String, size: u64 },
    Folder,
}

impl Entry {
    /// Builds a file entry. `id` must already be normalized.
    pub fn file(id: impl Into<String>, size: u64) -> Self {
        let id = id.into();
        Self {
            name: paths::entry_name(&id),
            parent_id: paths::parent_id(&id),
            kind: EntryKind::File {
                content_type: paths::content_type(&id),
                size,
            },
            id,
        }
    }

    /// Builds a folder entry. Folder names keep their full basename.
    pub fn folder(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: paths::basename(&id).to_string(),
            parent_id: paths::parent_id(&id),
            kind: EntryKind::Folder,
            id,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File { .. })
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, EntryKind::Folder)
    }

    /// Content type for files, empty for folders.
    pub fn content_type(&self) -> &str {
        match &self.kind {
            EntryKind::File { content_type, .. } => content_type,
            EntryKind::Folder => "",
        }
    }

    pub fn size(&self) -> Option<u64> {
        match &self.kind {
            EntryKind::File { size, .. } => Some(*size),
            EntryKind::Folder => None,
        }
    }
}
