//! Seeds the reference repository used by tests and the `seed` command.

use std::io::ErrorKind;
use std::path::Path;

use tokio::fs;
use tracing::info;

use crate::core::config::RepositoryOptions;
use crate::core::errors::Result;
use crate::models::MetaData;
use crate::repository::Repository;
use crate::services::fs::PathResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    File,
    Folder,
}

const TREE: [(&str, Shape); 10] = [
    ("/f1", Shape::File),
    ("/f2", Shape::File),
    ("/fo1", Shape::Folder),
    ("/fo1/sf1", Shape::File),
    ("/fo1/sf2", Shape::File),
    ("/fo1/sfo1", Shape::Folder),
    ("/fo1/subFolder34", Shape::Folder),
    ("/fo1/subFolder34/checkCT.jpeg", Shape::File),
    ("/fo1/subFolder34/anotherExt_f2.jpg", Shape::File),
    ("/fo1/subFolder34/gifFile.gif", Shape::File),
];

fn tree_metadata() -> Vec<(&'static str, MetaData)> {
    vec![
        (
            "/f2",
            MetaData::default()
                .add_tag("receipts")
                .add_tag("electronics")
                .add_tag("NYtour"),
        ),
        (
            "/fo1",
            MetaData::default()
                .add_tag("firstFolder")
                .add_attribute("title", "fatWedding")
                .add_attribute("description", "who-an!")
                .add_attribute("lop", "ka"),
        ),
        (
            "/fo1/subFolder34",
            MetaData::default()
                .add_tag("notEmpty")
                .add_tag("NY")
                .add_tag("2018")
                .add_tag("friends")
                .add_attribute("empty", false)
                .add_attribute("title", "New Year celebration")
                .add_attribute("description", "At Zhukovs home")
                .add_attribute("numberOfFiles", 45i64),
        ),
        (
            "/fo1/subFolder34/checkCT.jpeg",
            MetaData::default()
                .add_tag("favorite")
                .add_tag("friends")
                .add_attribute("description", "Serega taking a picture"),
        ),
    ]
}

/// Empties `options.path`, recreates the reference tree and its sidecars.
///
/// Files are created empty.
pub async fn create_test_repository(options: &RepositoryOptions) -> Result<Repository> {
    empty_dir(&options.path).await?;

    let resolver = PathResolver::new(options);
    for (id, shape) in TREE {
        let path = resolver.fs_path(id);
        match shape {
            Shape::Folder => fs::create_dir_all(&path).await?,
            Shape::File => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).await?;
                }
                fs::write(&path, b"").await?;
            }
        }
    }

    let repository = Repository::open(options.clone())?;
    for (id, metadata) in tree_metadata() {
        repository.set_metadata(id, &metadata).await?;
    }

    info!(root = %options.path.display(), entries = TREE.len(), "test repository created");
    Ok(repository)
}

async fn empty_dir(path: &Path) -> Result<()> {
    let mut children = match fs::read_dir(path).await {
        Ok(children) => children,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            fs::create_dir_all(path).await?;
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    while let Some(child) = children.next_entry().await? {
        if child.file_type().await?.is_dir() {
            fs::remove_dir_all(child.path()).await?;
        } else {
            fs::remove_file(child.path()).await?;
        }
    }
    Ok(())
}
