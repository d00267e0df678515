use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::config::RepositoryOptions;
use crate::core::errors::{Error, Result};
use crate::models::{AttributeValue, Entry, MetaData};
use crate::services::fs::EntryCatalog;
use crate::services::metadata::MetadataStore;
use crate::services::search::{SearchIndex, SearchRequest};
use crate::services::thumbnails::{ThumbnailGenerator, ThumbnailReport};

/// The contract external layers (CLI, API servers) consume.
///
/// Cheap to clone; every call goes to disk, nothing is cached.
#[derive(Debug, Clone)]
pub struct Repository {
    options: Arc<RepositoryOptions>,
    catalog: EntryCatalog,
    store: MetadataStore,
    search: SearchIndex,
    thumbnails: ThumbnailGenerator,
}

impl Repository {
    pub fn open(options: RepositoryOptions) -> Result<Self> {
        options.validate()?;
        if !options.path.is_dir() {
            return Err(Error::NotFound(format!(
                "repository root '{}' is not a directory",
                options.path.display()
            )));
        }

        let catalog = EntryCatalog::new(&options);
        let store = MetadataStore::new(catalog.clone());
        let search = SearchIndex::new(catalog.clone(), store.clone());
        let thumbnails = ThumbnailGenerator::new(catalog.clone(), options.thumb_concurrency);

        info!(
            root = %options.path.display(),
            meta_folder = %options.meta_folder_name,
            "repository opened"
        );
        Ok(Self {
            options: Arc::new(options),
            catalog,
            store,
            search,
            thumbnails,
        })
    }

    pub fn options(&self) -> &RepositoryOptions {
        &self.options
    }

    pub async fn get_entry(&self, id: &str) -> Result<Entry> {
        self.catalog.get_entry(id).await
    }

    pub async fn get_folder_entries(&self, id: &str) -> Result<Vec<Entry>> {
        self.catalog.get_folder_entries(id).await
    }

    pub async fn find_entries(&self, pattern: &str) -> Result<Vec<Entry>> {
        self.search.find_entries(pattern).await
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<Entry>> {
        self.search_with(request, &CancellationToken::new()).await
    }

    pub async fn search_with(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Entry>> {
        self.search.search(request, cancel).await
    }

    pub async fn get_metadata(&self, id: &str) -> Result<MetaData> {
        self.store.get_metadata(id).await
    }

    pub async fn set_metadata(&self, id: &str, metadata: &MetaData) -> Result<MetaData> {
        self.store.set_metadata(id, metadata).await
    }

    pub async fn add_tag(&self, id: &str, tag: &str) -> Result<MetaData> {
        require_non_empty("tag", tag)?;
        self.store.update(id, |metadata| metadata.add_tag(tag)).await
    }

    pub async fn remove_tag(&self, id: &str, tag: &str) -> Result<MetaData> {
        self.store.update(id, |metadata| metadata.remove_tag(tag)).await
    }

    pub async fn add_attribute(
        &self,
        id: &str,
        key: &str,
        value: impl Into<AttributeValue>,
    ) -> Result<MetaData> {
        require_non_empty("attribute key", key)?;
        let value = value.into();
        self.store
            .update(id, move |metadata| metadata.add_attribute(key, value))
            .await
    }

    pub async fn remove_attribute(&self, id: &str, key: &str) -> Result<MetaData> {
        self.store
            .update(id, |metadata| metadata.remove_attribute(key))
            .await
    }

    pub async fn make_thumb(&self, id: &str) -> Result<PathBuf> {
        self.thumbnails.make_thumb(id).await
    }

    pub async fn make_all_thumbs(&self) -> Result<ThumbnailReport> {
        self.make_all_thumbs_with(&CancellationToken::new()).await
    }

    pub async fn make_all_thumbs_with(&self, cancel: &CancellationToken) -> Result<ThumbnailReport> {
        self.thumbnails.make_all_thumbs(cancel).await
    }
}

fn require_non_empty(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidArgument(format!("{what} must not be empty")));
    }
    Ok(())
}
