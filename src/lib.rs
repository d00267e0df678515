//! Files and folders under a root directory, with tags and attributes kept in
//! sidecar JSON files next to them.

pub mod core;
pub mod fixture;
pub mod models;
pub mod repository;
pub mod services;

pub use crate::core::config::RepositoryOptions;
pub use crate::core::errors::{Error, Result};
pub use crate::models::{AttributeValue, Entry, EntryKind, MetaData};
pub use crate::repository::Repository;
pub use crate::services::search::{SearchQuery, SearchRequest, SearchScope};
pub use crate::services::thumbnails::{ThumbnailFailure, ThumbnailReport};
