//! Sidecar persistence for entry metadata.
//!
//! For an entry `/a/b.jpg` the record lives in `<root>/a/<meta folder>/b.jpg.json`.
//! Derived attributes are overlaid on every read and stripped on every write.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::fs;
use tokio::task;
use tracing::{debug, info};

use crate::core::errors::{Error, Result};
use crate::models::{Entry, MetaData};
use crate::services::fs::paths::ROOT_ID;
use crate::services::fs::EntryCatalog;

#[derive(Debug, Clone)]
pub struct MetadataStore {
    catalog: EntryCatalog,
}

impl MetadataStore {
    pub fn new(catalog: EntryCatalog) -> Self {
        Self { catalog }
    }

    /// Stored record of an existing entry with derived attributes overlaid.
    pub async fn get_metadata(&self, id: &str) -> Result<MetaData> {
        let entry = self.catalog.get_entry(id).await?;
        let stored = self.read_sidecar(&entry).await?.unwrap_or_default();
        Ok(with_derived(&entry, stored))
    }

    /// Persists `metadata` minus derived keys and returns what was persisted.
    pub async fn set_metadata(&self, id: &str, metadata: &MetaData) -> Result<MetaData> {
        let entry = self.catalog.get_entry(id).await?;
        let stripped = metadata.clone().without_derived();
        self.persist(&entry, &stripped).await?;
        Ok(stripped)
    }

    /// Applies `change` to the stored record and writes it back only if it changed.
    ///
    /// Returns the resulting record with derived attributes overlaid.
    pub async fn update<F>(&self, id: &str, change: F) -> Result<MetaData>
    where
        F: FnOnce(MetaData) -> MetaData,
    {
        let entry = self.catalog.get_entry(id).await?;
        let current = self
            .read_sidecar(&entry)
            .await?
            .unwrap_or_default()
            .without_derived();
        let next = change(current.clone()).without_derived();
        if next != current {
            self.persist(&entry, &next).await?;
        } else {
            debug!(id = %entry.id, "metadata unchanged, skipping write");
        }
        Ok(with_derived(&entry, next))
    }

    pub fn sidecar_path(&self, id: &str) -> PathBuf {
        self.catalog.resolver().meta_file(id)
    }

    async fn read_sidecar(&self, entry: &Entry) -> Result<Option<MetaData>> {
        if entry.id == ROOT_ID {
            return Ok(None);
        }
        let path = self.sidecar_path(&entry.id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| Error::MalformedSidecar { path, source })
    }

    async fn persist(&self, entry: &Entry, stripped: &MetaData) -> Result<()> {
        if entry.id == ROOT_ID {
            return Err(Error::InvalidArgument(
                "the repository root has no sidecar".to_string(),
            ));
        }
        let path = self.sidecar_path(&entry.id);
        if stripped.is_empty() {
            return remove_sidecar(&entry.id, &path).await;
        }

        let folder = self.catalog.resolver().meta_folder(&entry.id);
        let json = serde_json::to_vec_pretty(stripped).map_err(std::io::Error::from)?;
        task::spawn_blocking(move || write_atomically(&folder, &path, &json)).await??;
        info!(
            id = %entry.id,
            tags = stripped.tags.len(),
            attributes = stripped.attributes.len(),
            "metadata written"
        );
        Ok(())
    }
}

pub fn with_derived(entry: &Entry, metadata: MetaData) -> MetaData {
    metadata.with_derived(&entry.name, entry.content_type())
}

async fn remove_sidecar(id: &str, path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => {
            info!(%id, "metadata emptied, sidecar removed");
            if let Some(folder) = path.parent() {
                // Only succeeds when nothing else (other sidecars, thumbnails) lives there.
                let _ = fs::remove_dir(folder).await;
            }
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(%id, "empty metadata, nothing to write");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// Readers never observe a half written sidecar: the record goes to a temp
/// file in the same folder, which is then renamed over `path`. A temp file
/// that fails to write or persist is deleted on drop.
fn write_atomically(folder: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::create_dir_all(folder)?;
    let mut temp = NamedTempFile::new_in(folder)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.as_file_mut().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RepositoryOptions;
    use crate::models::metadata::{CONTENT_TYPE_KEY, NAME_KEY};
    use crate::models::AttributeValue;
    use tempfile::TempDir;

    fn create_store() -> Result<(MetadataStore, TempDir)> {
        let base = TempDir::new()?;
        std::fs::write(base.path().join("f1"), "")?;
        std::fs::write(base.path().join("photo.JPG"), "")?;
        std::fs::create_dir_all(base.path().join("fo1"))?;
        let options = RepositoryOptions::new(base.path()).with_meta_folder_name(".meta");
        Ok((MetadataStore::new(EntryCatalog::new(&options)), base))
    }

    #[tokio::test]
    async fn missing_sidecar_yields_derived_defaults() -> Result<()> {
        let (store, _base) = create_store()?;
        let meta = store.get_metadata("/photo.JPG").await?;
        assert!(meta.tags.is_empty());
        assert_eq!(meta.attributes.len(), 2);
        assert_eq!(meta.attributes[NAME_KEY], AttributeValue::from("photo"));
        assert_eq!(meta.attributes[CONTENT_TYPE_KEY], AttributeValue::from("jpg"));
        Ok(())
    }

    #[tokio::test]
    async fn get_metadata_requires_existing_entry() -> Result<()> {
        let (store, _base) = create_store()?;
        assert!(matches!(
            store.get_metadata("/doesnotexist").await,
            Err(Error::NotFound(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn set_then_get_round_trips() -> Result<()> {
        let (store, _base) = create_store()?;
        let meta = MetaData::default()
            .add_tag("firstFolder")
            .add_attribute("title", "fatWedding")
            .add_attribute("numberOfFiles", 45i64);

        let persisted = store.set_metadata("/fo1", &meta).await?;
        assert_eq!(persisted, meta);

        let read = store.get_metadata("/fo1").await?;
        assert_eq!(read.tags, meta.tags);
        assert_eq!(read.clone().without_derived(), meta);
        assert_eq!(read.attributes[NAME_KEY], AttributeValue::from("fo1"));
        Ok(())
    }

    #[tokio::test]
    async fn derived_keys_never_reach_the_sidecar() -> Result<()> {
        let (store, _base) = create_store()?;
        let mut meta = MetaData::default().add_tag("x");
        meta.attributes
            .insert(NAME_KEY.to_string(), AttributeValue::from("bogus"));
        store.set_metadata("/f1", &meta).await?;

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.sidecar_path("/f1"))?).unwrap();
        assert!(raw["attributes"].get(NAME_KEY).is_none());

        let read = store.get_metadata("/f1").await?;
        assert_eq!(read.attributes[NAME_KEY], AttributeValue::from("f1"));
        Ok(())
    }

    #[tokio::test]
    async fn empty_write_creates_no_sidecar() -> Result<()> {
        let (store, base) = create_store()?;
        let only_derived = MetaData::default().with_derived("f1", "");
        let persisted = store.set_metadata("/f1", &only_derived).await?;
        assert!(persisted.is_empty());
        assert!(!store.sidecar_path("/f1").exists());
        assert!(!base.path().join(".meta").exists());
        Ok(())
    }

    #[tokio::test]
    async fn emptied_record_removes_its_sidecar() -> Result<()> {
        let (store, base) = create_store()?;
        store
            .set_metadata("/f1", &MetaData::default().add_tag("x"))
            .await?;
        assert!(store.sidecar_path("/f1").exists());

        let after = store.update("/f1", |meta| meta.remove_tag("x")).await?;
        assert!(after.tags.is_empty());
        assert!(!store.sidecar_path("/f1").exists());
        assert!(!base.path().join(".meta").exists());
        Ok(())
    }

    #[tokio::test]
    async fn unchanged_update_writes_nothing() -> Result<()> {
        let (store, _base) = create_store()?;
        let meta = store
            .update("/f1", |meta| meta.remove_tag("absent").remove_attribute(NAME_KEY))
            .await?;
        assert_eq!(meta.attributes[NAME_KEY], AttributeValue::from("f1"));
        assert!(!store.sidecar_path("/f1").exists());
        Ok(())
    }

    #[tokio::test]
    async fn malformed_sidecar_is_reported() -> Result<()> {
        let (store, _base) = create_store()?;
        let path = store.sidecar_path("/f1");
        std::fs::create_dir_all(path.parent().unwrap())?;
        std::fs::write(&path, "{ not json")?;

        assert!(matches!(
            store.get_metadata("/f1").await,
            Err(Error::MalformedSidecar { .. })
        ));
        assert!(matches!(
            store.update("/f1", |meta| meta.add_tag("x")).await,
            Err(Error::MalformedSidecar { .. })
        ));
        Ok(())
    }

    fn meta_folder_names(base: &TempDir) -> Result<Vec<String>> {
        let mut names = std::fs::read_dir(base.path().join(".meta"))?
            .map(|entry| entry.map(|entry| entry.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }

    #[tokio::test]
    async fn rewrites_leave_only_the_sidecar() -> Result<()> {
        let (store, base) = create_store()?;
        for tag in ["a", "b", "c"] {
            store.update("/f1", |meta| meta.add_tag(tag)).await?;
        }
        assert_eq!(meta_folder_names(&base)?, vec!["f1.json"]);
        assert_eq!(store.get_metadata("/f1").await?.tags, vec!["a", "b", "c"]);
        Ok(())
    }

    #[tokio::test]
    async fn failed_write_leaves_no_temp_file() -> Result<()> {
        let (store, base) = create_store()?;
        // A directory squatting on the sidecar path makes the final rename fail.
        std::fs::create_dir_all(store.sidecar_path("/f1").join("blocker"))?;

        let result = store
            .set_metadata("/f1", &MetaData::default().add_tag("x"))
            .await;
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(meta_folder_names(&base)?, vec!["f1.json"]);
        Ok(())
    }

    #[tokio::test]
    async fn root_has_no_sidecar() -> Result<()> {
        let (store, _base) = create_store()?;
        let meta = store.get_metadata("/").await?;
        assert!(meta.tags.is_empty());
        assert!(matches!(
            store.set_metadata("/", &MetaData::default().add_tag("x")).await,
            Err(Error::InvalidArgument(_))
        ));
        Ok(())
    }
}
