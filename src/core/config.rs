use std::env;
use std::path::PathBuf;
use std::thread;

use crate::core::errors::{Error, Result};

pub const DEFAULT_META_FOLDER: &str = ".aspan";
pub const DEFAULT_THUMBS_PREFIX: &str = "thumb_";

pub const ENV_REPOSITORY_PATH: &str = "REPOSITORY_PATH";
pub const ENV_META_FOLDER: &str = "META_FOLDER";
pub const ENV_THUMB_PREFIX: &str = "THUMB_PREFIX";

/// Immutable settings a repository is opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryOptions {
    /// Root directory on disk that the `/` id maps to.
    pub path: PathBuf,
    /// Name of the hidden per-directory folder holding sidecars and thumbnails.
    pub meta_folder_name: String,
    /// Filename prefix for generated thumbnails.
    pub thumbs_prefix: String,
    /// Maximum number of directory listings in flight during a tree walk.
    pub walk_concurrency: usize,
    /// Maximum number of thumbnails generated at once in a batch.
    pub thumb_concurrency: usize,
}

impl RepositoryOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let parallelism = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            path: path.into(),
            meta_folder_name: DEFAULT_META_FOLDER.to_string(),
            thumbs_prefix: DEFAULT_THUMBS_PREFIX.to_string(),
            walk_concurrency: parallelism * 4,
            thumb_concurrency: parallelism,
        }
    }

    /// Reads `REPOSITORY_PATH`, `META_FOLDER` and `THUMB_PREFIX`.
    pub fn from_env() -> Result<Self> {
        let path = env::var(ENV_REPOSITORY_PATH)
            .ok()
            .filter(|value| !value.is_empty())
            .ok_or_else(|| Error::Config("repository path is missing".to_string()))?;

        let mut options = Self::new(path);
        if let Some(name) = non_empty_var(ENV_META_FOLDER) {
            options = options.with_meta_folder_name(name);
        }
        if let Some(prefix) = non_empty_var(ENV_THUMB_PREFIX) {
            options = options.with_thumbs_prefix(prefix);
        }
        Ok(options)
    }

    pub fn with_meta_folder_name(mut self, name: impl Into<String>) -> Self {
        self.meta_folder_name = name.into();
        self
    }

    pub fn with_thumbs_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thumbs_prefix = prefix.into();
        self
    }

    pub fn with_walk_concurrency(mut self, limit: usize) -> Self {
        self.walk_concurrency = limit.max(1);
        self
    }

    pub fn with_thumb_concurrency(mut self, limit: usize) -> Self {
        self.thumb_concurrency = limit.max(1);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let name = self.meta_folder_name.as_str();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(Error::Config(format!(
                "invalid meta folder name '{}'",
                self.meta_folder_name
            )));
        }
        if self.thumbs_prefix.contains(['/', '\\']) {
            return Err(Error::Config(format!(
                "invalid thumbnail prefix '{}'",
                self.thumbs_prefix
            )));
        }
        Ok(())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}
