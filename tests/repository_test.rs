use anyhow::Result;
use aspan::fixture::create_test_repository;
use aspan::models::metadata::{CONTENT_TYPE_KEY, NAME_KEY};
use aspan::{AttributeValue, Error, MetaData, Repository, RepositoryOptions, SearchRequest};
use tempfile::{tempdir, TempDir};
use walkdir::WalkDir;

const META: &str = ".metaFolder";

async fn seeded() -> Result<(Repository, TempDir)> {
    let temp_root = tempdir()?;
    let options = RepositoryOptions::new(temp_root.path().join("repo")).with_meta_folder_name(META);
    let repository = create_test_repository(&options).await?;
    Ok((repository, temp_root))
}

fn ids(entries: &[aspan::Entry]) -> Vec<&str> {
    entries.iter().map(|entry| entry.id.as_str()).collect()
}

fn sidecar_count(repository: &Repository) -> usize {
    WalkDir::new(&repository.options().path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry.path().extension().is_some_and(|ext| ext == "json")
        })
        .count()
}

#[tokio::test]
async fn metadata_of_the_reference_tree() -> Result<()> {
    let (repository, _temp) = seeded().await?;

    let f1 = repository.get_metadata("/f1").await?;
    assert!(f1.tags.is_empty());
    assert_eq!(
        f1.attributes.into_iter().collect::<Vec<_>>(),
        vec![
            (NAME_KEY.to_string(), AttributeValue::from("f1")),
            (CONTENT_TYPE_KEY.to_string(), AttributeValue::from("")),
        ]
    );

    let fo1 = repository.get_metadata("/fo1").await?;
    assert_eq!(fo1.tags, vec!["firstFolder"]);
    let keys: Vec<_> = fo1.attributes.keys().map(String::as_str).collect();
    assert_eq!(keys, vec![NAME_KEY, CONTENT_TYPE_KEY, "title", "description", "lop"]);
    assert_eq!(fo1.attributes[NAME_KEY], AttributeValue::from("fo1"));
    assert_eq!(fo1.attributes[CONTENT_TYPE_KEY], AttributeValue::from(""));
    assert_eq!(fo1.attributes["title"], AttributeValue::from("fatWedding"));

    let picture = repository
        .get_metadata("/fo1/subFolder34/checkCT.jpeg")
        .await?;
    assert_eq!(picture.tags, vec!["favorite", "friends"]);
    assert_eq!(picture.attributes[CONTENT_TYPE_KEY], AttributeValue::from("jpeg"));
    assert_eq!(picture.attributes[NAME_KEY], AttributeValue::from("checkCT"));
    Ok(())
}

#[tokio::test]
async fn sidecars_are_written_only_for_entries_with_metadata() -> Result<()> {
    let (repository, _temp) = seeded().await?;
    assert_eq!(sidecar_count(&repository), 4);

    repository.set_metadata("/f1", &MetaData::default()).await?;
    repository.remove_tag("/fo1/sf1", "absent").await?;
    repository.remove_attribute("/fo1/sf2", "title").await?;
    assert_eq!(sidecar_count(&repository), 4);

    let sidecar = repository
        .options()
        .path
        .join(META)
        .join("f1.json");
    assert!(!sidecar.exists());
    Ok(())
}

#[tokio::test]
async fn listing_and_lookup() -> Result<()> {
    let (repository, _temp) = seeded().await?;

    let root = repository.get_folder_entries("/").await?;
    assert_eq!(ids(&root), vec!["/f1", "/f2", "/fo1"]);
    assert!(root.iter().all(|entry| entry.name != META));

    let pictures = repository.get_folder_entries("/fo1/subFolder34").await?;
    assert_eq!(
        ids(&pictures),
        vec![
            "/fo1/subFolder34/anotherExt_f2.jpg",
            "/fo1/subFolder34/checkCT.jpeg",
            "/fo1/subFolder34/gifFile.gif"
        ]
    );

    let folder = repository.get_entry("/fo1/sfo1").await?;
    assert!(folder.is_folder());
    assert_eq!(folder.parent_id, "/fo1");

    assert!(matches!(
        repository.get_entry("/doesnotexits").await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        repository.get_folder_entries("/doesnotexits").await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        repository.get_metadata("/doesnotexits").await,
        Err(Error::NotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn find_entries_over_the_reference_tree() -> Result<()> {
    let (repository, _temp) = seeded().await?;

    let found = repository.find_entries("*f2*").await?;
    assert_eq!(
        ids(&found),
        vec!["/f2", "/fo1/sf2", "/fo1/subFolder34/anotherExt_f2.jpg"]
    );
    assert!(repository.find_entries("/doesnotexist").await?.is_empty());

    let friends = repository.search(&SearchRequest::text("^friends$")).await?;
    assert_eq!(ids(&friends), vec!["/fo1/subFolder34/checkCT.jpeg"]);
    Ok(())
}

#[tokio::test]
async fn tag_and_attribute_mutations() -> Result<()> {
    let (repository, _temp) = seeded().await?;

    let once = repository.add_tag("/f1", "x").await?;
    let twice = repository.add_tag("/f1", "x").await?;
    assert_eq!(once, twice);
    assert_eq!(twice.tags, vec!["x"]);

    let f2 = repository.remove_tag("/f2", "electronics").await?;
    assert_eq!(f2.tags, vec!["receipts", "NYtour"]);
    assert_eq!(repository.get_metadata("/f2").await?.tags, f2.tags);

    let updated = repository
        .add_attribute("/fo1", "numberOfGuests", 120i64)
        .await?;
    assert_eq!(updated.attributes["numberOfGuests"], AttributeValue::from(120i64));

    let renamed = repository.add_attribute("/fo1", NAME_KEY, "other").await?;
    assert_eq!(renamed.attributes[NAME_KEY], AttributeValue::from("fo1"));
    let removed = repository.remove_attribute("/fo1", CONTENT_TYPE_KEY).await?;
    assert_eq!(removed.attributes[CONTENT_TYPE_KEY], AttributeValue::from(""));

    let without_lop = repository.remove_attribute("/fo1", "lop").await?;
    assert!(!without_lop.attributes.contains_key("lop"));
    assert_eq!(repository.get_metadata("/fo1").await?, without_lop);

    assert!(matches!(
        repository.add_tag("/f1", "").await,
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        repository.add_tag("/../outside", "x").await,
        Err(Error::InvalidArgument(_))
    ));
    Ok(())
}

#[tokio::test]
async fn removing_the_last_tag_removes_the_sidecar() -> Result<()> {
    let (repository, _temp) = seeded().await?;
    let sidecar = repository.options().path.join(META).join("f1.json");

    repository.add_tag("/f1", "temporary").await?;
    assert!(sidecar.exists());

    let meta = repository.remove_tag("/f1", "temporary").await?;
    assert!(meta.tags.is_empty());
    assert!(!sidecar.exists());
    // The root meta folder still holds f2.json.
    assert!(repository.options().path.join(META).join("f2.json").exists());
    Ok(())
}

#[tokio::test]
async fn open_requires_an_existing_root() -> Result<()> {
    let temp_root = tempdir()?;
    let options = RepositoryOptions::new(temp_root.path().join("missing"));
    assert!(matches!(Repository::open(options), Err(Error::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn sidecars_are_not_addressable_as_entries() -> Result<()> {
    let (repository, _temp) = seeded().await?;
    let sidecar = format!("/{META}/f2.json");

    assert!(matches!(
        repository.get_entry(&sidecar).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        repository.get_folder_entries(&format!("/{META}")).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        repository.add_tag(&sidecar, "y").await,
        Err(Error::NotFound(_))
    ));
    assert!(!repository.options().path.join(META).join(META).exists());
    assert_eq!(sidecar_count(&repository), 4);
    Ok(())
}
