use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use aspan::core::telemetry::logging::init_logging;
use aspan::fixture::create_test_repository;
use aspan::{AttributeValue, Repository, RepositoryOptions, SearchRequest};

#[derive(Debug, Parser)]
#[command(
    name = "aspan",
    version,
    about = "Browse a folder tree and manage tags and attributes kept beside it"
)]
struct Cli {
    /// Repository root. Falls back to REPOSITORY_PATH.
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Sidecar folder name. Falls back to META_FOLDER, then `.aspan`.
    #[arg(long, global = true)]
    meta_folder: Option<String>,
    /// Thumbnail filename prefix. Falls back to THUMB_PREFIX, then `thumb_`.
    #[arg(long, global = true)]
    thumbs_prefix: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the entries of a folder.
    Ls {
        #[arg(default_value = "/")]
        id: String,
    },
    /// Show a single entry.
    Stat { id: String },
    /// Show the metadata of an entry.
    Meta { id: String },
    /// Add a tag.
    Tag { id: String, tag: String },
    /// Remove a tag.
    Untag { id: String, tag: String },
    /// Set an attribute. `true`, `false` and numbers are stored as such.
    SetAttr { id: String, key: String, value: String },
    /// Remove an attribute.
    UnsetAttr { id: String, key: String },
    /// Find files whose id matches a glob.
    Find {
        pattern: String,
        #[arg(long)]
        within: Option<String>,
    },
    /// Find files whose id, tags or attribute values match a regex.
    Grep {
        pattern: String,
        #[arg(long)]
        within: Option<String>,
    },
    /// Generate the thumbnail of one image.
    Thumb { id: String },
    /// Generate thumbnails for every image. Ctrl-C stops the batch.
    Thumbs,
    /// Recreate the reference test repository at the root.
    Seed {
        /// Wipe the root even when it is not empty.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let options = resolve_options(&cli)?;

    match cli.command {
        Command::Seed { force } => {
            if !force && !is_empty_dir(&options.path)? {
                bail!(
                    "'{}' is not empty, pass --force to wipe it",
                    options.path.display()
                );
            }
            create_test_repository(&options).await?;
            print_json(&repository_summary(&options))
        }
        Command::Ls { id } => print_json(&open(options)?.get_folder_entries(&id).await?),
        Command::Stat { id } => print_json(&open(options)?.get_entry(&id).await?),
        Command::Meta { id } => print_json(&open(options)?.get_metadata(&id).await?),
        Command::Tag { id, tag } => print_json(&open(options)?.add_tag(&id, &tag).await?),
        Command::Untag { id, tag } => print_json(&open(options)?.remove_tag(&id, &tag).await?),
        Command::SetAttr { id, key, value } => {
            let value = AttributeValue::parse_literal(&value);
            print_json(&open(options)?.add_attribute(&id, &key, value).await?)
        }
        Command::UnsetAttr { id, key } => {
            print_json(&open(options)?.remove_attribute(&id, &key).await?)
        }
        Command::Find { pattern, within } => {
            let request = scoped(SearchRequest::glob(pattern), within);
            print_json(&open(options)?.search(&request).await?)
        }
        Command::Grep { pattern, within } => {
            let request = scoped(SearchRequest::text(pattern), within);
            print_json(&open(options)?.search(&request).await?)
        }
        Command::Thumb { id } => print_json(&open(options)?.make_thumb(&id).await?),
        Command::Thumbs => {
            let repository = open(options)?;
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, stopping thumbnail batch");
                    on_interrupt.cancel();
                }
            });
            print_json(&repository.make_all_thumbs_with(&cancel).await?)
        }
    }
}

fn open(options: RepositoryOptions) -> Result<Repository> {
    Repository::open(options).context("cannot open repository")
}

fn resolve_options(cli: &Cli) -> Result<RepositoryOptions> {
    let mut options = match &cli.root {
        Some(root) => RepositoryOptions::new(root),
        None => RepositoryOptions::from_env()?,
    };
    if let Some(name) = &cli.meta_folder {
        options = options.with_meta_folder_name(name);
    }
    if let Some(prefix) = &cli.thumbs_prefix {
        options = options.with_thumbs_prefix(prefix);
    }
    Ok(options)
}

fn scoped(request: SearchRequest, within: Option<String>) -> SearchRequest {
    match within {
        Some(id) => request.within(id),
        None => request,
    }
}

fn is_empty_dir(path: &Path) -> Result<bool> {
    match std::fs::read_dir(path) {
        Ok(mut children) => Ok(children.next().is_none()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(err) => Err(err).with_context(|| format!("cannot read '{}'", path.display())),
    }
}

#[derive(Serialize)]
struct SeedSummary {
    root: PathBuf,
    meta_folder: String,
}

fn repository_summary(options: &RepositoryOptions) -> SeedSummary {
    SeedSummary {
        root: options.path.clone(),
        meta_folder: options.meta_folder_name.clone(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
