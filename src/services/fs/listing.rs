use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::config::RepositoryOptions;
use crate::core::errors::{Error, Result};
use crate::models::Entry;
use crate::services::fs::paths::{child_id, normalize_id, PathResolver};

type Listing = (String, Vec<Entry>);

/// Resolves entries and folder contents straight from the filesystem.
#[derive(Debug, Clone)]
pub struct EntryCatalog {
    resolver: Arc<PathResolver>,
    walk_concurrency: usize,
}

impl EntryCatalog {
    pub fn new(options: &RepositoryOptions) -> Self {
        Self {
            resolver: Arc::new(PathResolver::new(options)),
            walk_concurrency: options.walk_concurrency.max(1),
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn walk_concurrency(&self) -> usize {
        self.walk_concurrency
    }

    /// Normalizes `id` and keeps the contents of meta folders out of reach.
    fn entry_id(&self, id: &str) -> Result<String> {
        let id = normalize_id(id)?;
        let meta_folder_name = self.resolver.meta_folder_name();
        if id.split('/').any(|segment| segment == meta_folder_name) {
            debug!(%id, "id points into a meta folder");
            return Err(Error::NotFound(id));
        }
        Ok(id)
    }

    pub async fn get_entry(&self, id: &str) -> Result<Entry> {
        let id = self.entry_id(id)?;
        let path = self.resolver.fs_path(&id);
        // Stat on the blocking pool, like every other filesystem call here.
        task::spawn_blocking(move || entry_impl(id, &path)).await?
    }

    pub async fn get_folder_entries(&self, id: &str) -> Result<Vec<Entry>> {
        let id = self.entry_id(id)?;
        let dir = self.resolver.fs_path(&id);
        let meta_folder_name = self.resolver.meta_folder_name().to_string();
        task::spawn_blocking(move || list_dir_impl(&id, &dir, &meta_folder_name)).await?
    }

    /// Every file below `root_id`, in depth-first order.
    ///
    /// Directory listings run concurrently, at most `walk_concurrency` at a
    /// time. Any listing failure aborts the walk.
    pub async fn walk_all(&self, root_id: &str, cancel: &CancellationToken) -> Result<Vec<Entry>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let root = self.get_entry(root_id).await?;
        if root.is_file() {
            return Ok(vec![root]);
        }

        let permits = Arc::new(Semaphore::new(self.walk_concurrency));
        let mut pending: JoinSet<Result<Listing>> = JoinSet::new();
        let mut listings: HashMap<String, Vec<Entry>> = HashMap::new();
        self.spawn_listing(&mut pending, &permits, root.id.clone());

        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                joined = pending.join_next() => joined,
            };
            let Some(joined) = joined else { break };
            let (folder_id, children) = joined??;
            for child in children.iter().filter(|child| child.is_folder()) {
                self.spawn_listing(&mut pending, &permits, child.id.clone());
            }
            listings.insert(folder_id, children);
        }

        debug!(root = %root.id, folders = listings.len(), "walk finished");
        Ok(flatten_depth_first(&root.id, listings))
    }

    fn spawn_listing(
        &self,
        pending: &mut JoinSet<Result<Listing>>,
        permits: &Arc<Semaphore>,
        folder_id: String,
    ) {
        let catalog = self.clone();
        let permits = Arc::clone(permits);
        pending.spawn(async move {
            let _permit = permits.acquire_owned().await.map_err(|_| Error::Cancelled)?;
            let children = catalog.get_folder_entries(&folder_id).await?;
            Ok((folder_id, children))
        });
    }
}

fn entry_impl(id: String, path: &Path) -> Result<Entry> {
    // lstat: symlinks are reported, never followed.
    match fs::symlink_metadata(path) {
        Ok(md) if md.is_dir() => Ok(Entry::folder(id)),
        Ok(md) => Ok(Entry::file(id, md.len())),
        Err(err) => {
            debug!(%id, path = %path.display(), error = %err, "stat failed");
            Err(Error::NotFound(id))
        }
    }
}

fn list_dir_impl(id: &str, dir: &Path, meta_folder_name: &str) -> Result<Vec<Entry>> {
    let read_dir = fs::read_dir(dir).map_err(|err| {
        debug!(%id, path = %dir.display(), error = %err, "listing failed");
        Error::NotFound(id.to_string())
    })?;

    let mut names: Vec<(String, std::path::PathBuf)> = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        let file_name = os_str_to_string(entry.file_name());
        if file_name == meta_folder_name {
            continue;
        }
        names.push((file_name, entry.path()));
    }
    names.sort_by(|a, b| a.0.to_lowercase().cmp(&b.0.to_lowercase()));

    let mut entries = Vec::with_capacity(names.len());
    for (name, path) in names {
        match entry_impl(child_id(id, &name), &path) {
            Ok(entry) => entries.push(entry),
            // Removed between readdir and stat.
            Err(Error::NotFound(child)) => debug!(%child, "skipping vanished entry"),
            Err(err) => return Err(err),
        }
    }
    Ok(entries)
}

fn flatten_depth_first(root_id: &str, mut listings: HashMap<String, Vec<Entry>>) -> Vec<Entry> {
    let mut files = Vec::new();
    let mut stack = Vec::new();
    if let Some(children) = listings.remove(root_id) {
        stack.push(children.into_iter());
    }

    loop {
        let next = match stack.last_mut() {
            Some(children) => children.next(),
            None => break,
        };
        match next {
            Some(entry) if entry.is_folder() => {
                if let Some(children) = listings.remove(&entry.id) {
                    stack.push(children.into_iter());
                }
            }
            Some(entry) => files.push(entry),
            None => {
                stack.pop();
            }
        }
    }
    files
}

fn os_str_to_string(s: impl AsRef<OsStr>) -> String {
    s.as_ref().to_string_lossy().into_owned()
}
