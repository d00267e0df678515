use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use serde::Serialize;
use tokio::fs;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::errors::{Error, Result};
use crate::models::{Entry, EntryKind};
use crate::services::fs::paths::ROOT_ID;
use crate::services::fs::EntryCatalog;

/// Thumbnails fit inside a square of this many pixels.
pub const THUMBNAIL_SIZE: u32 = 200;

/// The maximum file size that an image can be in order to have a thumbnail generated.
pub const MAXIMUM_FILE_SIZE: u64 = MIB * 24;

const MIB: u64 = 1048576;

pub const SUPPORTED_CONTENT_TYPES: [&str; 4] = ["jpg", "jpeg", "png", "gif"];

pub fn is_supported(content_type: &str) -> bool {
    SUPPORTED_CONTENT_TYPES.contains(&content_type)
}

fn image_format(content_type: &str) -> Option<ImageFormat> {
    match content_type {
        "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
        "png" => Some(ImageFormat::Png),
        "gif" => Some(ImageFormat::Gif),
        _ => None,
    }
}

/// Outcome of a bulk run. Individual failures never abort the batch.
#[derive(Debug, Default, Serialize)]
pub struct ThumbnailReport {
    pub generated: Vec<String>,
    pub skipped: usize,
    pub failed: Vec<ThumbnailFailure>,
}

#[derive(Debug, Serialize)]
pub struct ThumbnailFailure {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ThumbnailGenerator {
    catalog: EntryCatalog,
    concurrency: usize,
}

impl ThumbnailGenerator {
    pub fn new(catalog: EntryCatalog, concurrency: usize) -> Self {
        Self {
            catalog,
            concurrency: concurrency.max(1),
        }
    }

    /// Writes a downsized copy of an image entry into its meta folder.
    pub async fn make_thumb(&self, id: &str) -> Result<PathBuf> {
        let entry = self.catalog.get_entry(id).await?;
        let (content_type, size) = match &entry.kind {
            EntryKind::File { content_type, size } => (content_type.as_str(), *size),
            EntryKind::Folder => return Err(Error::thumbnail(&entry.id, "not a file")),
        };
        let format = image_format(content_type).ok_or_else(|| {
            Error::thumbnail(
                &entry.id,
                format!("unsupported content type '{content_type}'"),
            )
        })?;
        if size > MAXIMUM_FILE_SIZE {
            return Err(Error::thumbnail(&entry.id, "the image is too large (over 24MiB)"));
        }

        let resolver = self.catalog.resolver();
        let source = resolver.fs_path(&entry.id);
        let output = resolver.thumb_file(&entry.id);

        // Entries are never followed, so neither are their images.
        if fs::symlink_metadata(&source).await?.file_type().is_symlink() {
            return Err(Error::thumbnail(&entry.id, "symbolic links are not followed"));
        }

        let id = entry.id.clone();
        let bytes = task::spawn_blocking(move || render_thumbnail(&id, &source, format)).await??;

        if let Some(folder) = output.parent() {
            fs::create_dir_all(folder).await?;
        }
        fs::write(&output, bytes).await?;

        debug!(id = %entry.id, output = %output.display(), "thumbnail written");
        Ok(output)
    }

    /// Thumbnails every supported image in the tree.
    ///
    /// At most `concurrency` generations run at once. A failed walk or a
    /// cancellation is returned as an error; thumbnails already written stay.
    pub async fn make_all_thumbs(&self, cancel: &CancellationToken) -> Result<ThumbnailReport> {
        let files = self.catalog.walk_all(ROOT_ID, cancel).await?;
        let (images, others): (Vec<Entry>, Vec<Entry>) = files
            .into_iter()
            .partition(|entry| is_supported(entry.content_type()));

        let mut report = ThumbnailReport {
            skipped: others.len(),
            ..ThumbnailReport::default()
        };
        let mut queue = images.into_iter();
        let mut pending: JoinSet<(String, Result<PathBuf>)> = JoinSet::new();

        loop {
            while pending.len() < self.concurrency {
                let Some(entry) = queue.next() else { break };
                let generator = self.clone();
                pending.spawn(async move {
                    let result = generator.make_thumb(&entry.id).await;
                    (entry.id, result)
                });
            }

            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                joined = pending.join_next() => joined,
            };
            let Some(joined) = joined else { break };
            match joined? {
                (id, Ok(_)) => report.generated.push(id),
                (id, Err(err)) => {
                    warn!(%id, error = %err, "thumbnail failed");
                    report.failed.push(ThumbnailFailure {
                        id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            generated = report.generated.len(),
            skipped = report.skipped,
            failed = report.failed.len(),
            "thumbnail batch finished"
        );
        Ok(report)
    }
}

fn render_thumbnail(id: &str, source: &Path, format: ImageFormat) -> Result<Vec<u8>> {
    let mut file = std::fs::File::open(source)?;
    // The file may have grown since it was listed.
    let size = file.metadata()?.len();
    if size > MAXIMUM_FILE_SIZE {
        return Err(Error::thumbnail(id, "the image is too large (over 24MiB)"));
    }
    let mut data = Vec::with_capacity(size as usize);
    file.by_ref()
        .take(MAXIMUM_FILE_SIZE + 1)
        .read_to_end(&mut data)?;
    if data.len() as u64 > MAXIMUM_FILE_SIZE {
        return Err(Error::thumbnail(id, "the image is too large (over 24MiB)"));
    }

    encode_thumbnail(&data, format).map_err(|err| Error::thumbnail(id, err))
}

fn encode_thumbnail(data: &[u8], format: ImageFormat) -> image::ImageResult<Vec<u8>> {
    let mut img = image::load_from_memory_with_format(data, format)?;

    if img.width() > THUMBNAIL_SIZE || img.height() > THUMBNAIL_SIZE {
        img = img.resize(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Triangle);
    }
    // The JPEG encoder has no alpha channel.
    if format == ImageFormat::Jpeg {
        img = DynamicImage::ImageRgb8(img.to_rgb8());
    }

    let mut encoded = Cursor::new(Vec::new());
    img.write_to(&mut encoded, format)?;
    Ok(encoded.into_inner())
}
