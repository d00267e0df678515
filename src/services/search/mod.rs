use globset::{Glob, GlobMatcher};
use regex::Regex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::errors::{Error, Result};
use crate::models::Entry;
use crate::services::fs::paths::{normalize_id, ROOT_ID};
use crate::services::fs::EntryCatalog;
use crate::services::metadata::MetadataStore;

/// Controls how the query string is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    /// Glob matched against the full entry id, e.g. `*f2*` or `/fo1/**/*.jpg`.
    Glob(String),
    /// Regular expression matched against the id, tags and stored attribute values.
    Text(String),
}

/// Restricts search to either the entire root or a subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchScope {
    Root,
    Subtree(String),
}

/// Defines a search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: SearchQuery,
    pub scope: SearchScope,
}

impl SearchRequest {
    pub fn glob(pattern: impl Into<String>) -> Self {
        Self {
            query: SearchQuery::Glob(pattern.into()),
            scope: SearchScope::Root,
        }
    }

    pub fn text(pattern: impl Into<String>) -> Self {
        Self {
            query: SearchQuery::Text(pattern.into()),
            scope: SearchScope::Root,
        }
    }

    pub fn within(mut self, id: impl Into<String>) -> Self {
        self.scope = SearchScope::Subtree(id.into());
        self
    }
}

enum Matcher {
    Glob(GlobMatcher),
    Text(Regex),
}

impl Matcher {
    fn compile(query: &SearchQuery) -> Result<Matcher> {
        match query {
            SearchQuery::Glob(pattern) => Glob::new(pattern)
                .map(|glob| Matcher::Glob(glob.compile_matcher()))
                .map_err(|e| Error::invalid_pattern(pattern, e.kind())),
            SearchQuery::Text(pattern) => Regex::new(pattern)
                .map(Matcher::Text)
                .map_err(|e| Error::invalid_pattern(pattern, e)),
        }
    }
}

/// Pattern search over the live tree. Nothing is indexed ahead of time.
#[derive(Debug, Clone)]
pub struct SearchIndex {
    catalog: EntryCatalog,
    store: MetadataStore,
}

impl SearchIndex {
    pub fn new(catalog: EntryCatalog, store: MetadataStore) -> Self {
        Self { catalog, store }
    }

    /// Files whose id matches the glob `pattern`, in discovery order.
    pub async fn find_entries(&self, pattern: &str) -> Result<Vec<Entry>> {
        self.search(&SearchRequest::glob(pattern), &CancellationToken::new())
            .await
    }

    pub async fn search(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Entry>> {
        let matcher = Matcher::compile(&request.query)?;
        let root = match &request.scope {
            SearchScope::Root => ROOT_ID.to_string(),
            SearchScope::Subtree(id) => normalize_id(id)?,
        };

        let files = self.catalog.walk_all(&root, cancel).await?;
        let candidates = files.len();
        let hits: Vec<Entry> = match matcher {
            Matcher::Glob(glob) => files
                .into_iter()
                .filter(|entry| glob.is_match(&entry.id))
                .collect(),
            Matcher::Text(regex) => self.match_text(files, &regex, cancel).await?,
        };

        debug!(query = ?request.query, %root, candidates, hits = hits.len(), "search finished");
        Ok(hits)
    }

    /// Metadata reads run concurrently, at most `walk_concurrency` at a time.
    /// Hits keep discovery order.
    async fn match_text(
        &self,
        files: Vec<Entry>,
        regex: &Regex,
        cancel: &CancellationToken,
    ) -> Result<Vec<Entry>> {
        let limit = self.catalog.walk_concurrency();
        let mut matched = vec![false; files.len()];
        let mut queue = files.iter().map(|entry| entry.id.clone()).enumerate();
        let mut pending: JoinSet<(usize, bool)> = JoinSet::new();

        loop {
            while pending.len() < limit {
                let Some((index, id)) = queue.next() else { break };
                let store = self.store.clone();
                let regex = regex.clone();
                pending.spawn(async move { (index, text_matches(&store, &id, &regex).await) });
            }

            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                joined = pending.join_next() => joined,
            };
            let Some(joined) = joined else { break };
            let (index, hit) = joined?;
            matched[index] = hit;
        }

        Ok(files
            .into_iter()
            .zip(matched)
            .filter_map(|(entry, hit)| hit.then_some(entry))
            .collect())
    }
}

async fn text_matches(store: &MetadataStore, id: &str, regex: &Regex) -> bool {
    if regex.is_match(id) {
        return true;
    }
    match store.get_metadata(id).await {
        Ok(metadata) => {
            let stored = metadata.without_derived();
            stored.tags.iter().any(|tag| regex.is_match(tag))
                || stored
                    .attributes
                    .values()
                    .any(|value| regex.is_match(&value.to_string()))
        }
        Err(err) => {
            warn!(%id, error = %err, "metadata unreadable, matched by id only");
            false
        }
    }
}
