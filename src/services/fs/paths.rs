//! Path arithmetic between virtual entry ids and the filesystem.
//!
//! Ids are slash-separated, rooted at `/`, and never carry a trailing slash
//! (except the root itself). Nothing in here touches the disk.

use std::path::{Path, PathBuf};

use crate::core::config::RepositoryOptions;
use crate::core::errors::{Error, Result};

pub const ROOT_ID: &str = "/";

const SIDECAR_EXTENSION: &str = "json";

pub fn cleanse_path(id: &str) -> String {
    id.replace('\\', "/")
}

/// Canonical form of a caller supplied id. `..` may not climb above the root.
pub fn normalize_id(id: &str) -> Result<String> {
    let cleansed = cleanse_path(id);
    let mut segments: Vec<&str> = Vec::new();
    for segment in cleansed.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    return Err(Error::InvalidArgument(format!(
                        "id '{id}' escapes the repository root"
                    )));
                }
            }
            other => segments.push(other),
        }
    }
    Ok(format!("/{}", segments.join("/")))
}

/// Joins a child name onto a normalized folder id.
pub fn child_id(parent: &str, name: &str) -> String {
    if parent == ROOT_ID {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

pub fn basename(id: &str) -> &str {
    id.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
}

/// Splits a basename into stem and extension. A leading dot does not start an extension.
fn split_extension(base: &str) -> (&str, Option<&str>) {
    match base.rfind('.') {
        None | Some(0) => (base, None),
        Some(index) => (&base[..index], Some(&base[index + 1..])),
    }
}

pub fn entry_name(id: &str) -> String {
    split_extension(basename(id)).0.to_string()
}

pub fn content_type(id: &str) -> String {
    split_extension(basename(id))
        .1
        .map(str::to_lowercase)
        .unwrap_or_default()
}

pub fn parent_id(id: &str) -> String {
    let cleansed = cleanse_path(id);
    let trimmed = cleansed.trim_end_matches('/');
    match trimmed.rfind('/') {
        None | Some(0) => ROOT_ID.to_string(),
        Some(index) => trimmed[..index].to_string(),
    }
}

/// Resolves ids against one repository's options.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    meta_folder_name: String,
    thumbs_prefix: String,
}

impl PathResolver {
    pub fn new(options: &RepositoryOptions) -> Self {
        Self {
            root: options.path.clone(),
            meta_folder_name: options.meta_folder_name.clone(),
            thumbs_prefix: options.thumbs_prefix.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta_folder_name(&self) -> &str {
        &self.meta_folder_name
    }

    /// Native path of a normalized id.
    pub fn fs_path(&self, id: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in id.split('/').filter(|segment| !segment.is_empty()) {
            path.push(segment);
        }
        path
    }

    /// Sidecar folder sitting next to the entry.
    pub fn meta_folder(&self, id: &str) -> PathBuf {
        self.fs_path(&parent_id(id)).join(&self.meta_folder_name)
    }

    pub fn meta_file(&self, id: &str) -> PathBuf {
        self.meta_folder(id)
            .join(format!("{}.{SIDECAR_EXTENSION}", basename(id)))
    }

    pub fn thumb_file(&self, id: &str) -> PathBuf {
        self.meta_folder(id).join(format!(
            "{}{}.{}",
            self.thumbs_prefix,
            entry_name(id),
            content_type(id)
        ))
    }
}
