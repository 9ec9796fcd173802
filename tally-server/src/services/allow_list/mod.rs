//! In-memory cache of the metric names each application may report.
//!
//! The cache holds one generation of allow-lists at a time. An [update](AllowListCache::update)
//! builds the next generation off to the side and swaps it in with a single write, so readers
//! never observe entries from two different generations.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use futures::stream;
use parking_lot::RwLock;
use tally_protocol::AllowedMetricsResponse;
use tokio::sync::Mutex;

mod source;

pub use self::source::*;
pub use crate::http::HttpError;

/// The metric names an application is permitted to report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllowList {
    app_id: String,
    allowed: HashSet<String>,
}

impl AllowList {
    /// Creates an allow-list for `app_id`.
    pub fn new<I, S>(app_id: impl Into<String>, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            app_id: app_id.into(),
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    /// The application this list belongs to.
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Returns `true` if the application may report `metric`.
    pub fn is_allowed(&self, metric: &str) -> bool {
        self.allowed.contains(metric)
    }

    /// All allowed metric names.
    pub fn allowed(&self) -> &HashSet<String> {
        &self.allowed
    }
}

/// A complete generation of allow-lists, keyed by application id.
pub type AllowLists = HashMap<String, Arc<AllowList>>;

/// Returned by [`AllowListCache::get_allowed_metrics`].
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The application is not in the current generation.
    #[error("no metric definition found for app {0}")]
    UnknownApp(String),
}

/// A refresh cycle that did not produce a new generation.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// The manifest could not be fetched. The cache is unchanged.
    #[error("failed to fetch the manifest")]
    Manifest(#[source] FetchError),
    /// The cycle did not finish within the refresh timeout. The cache is unchanged.
    #[error("refresh timed out")]
    Timeout,
}

/// Outcome of a successful refresh cycle.
///
/// All lists are sorted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Number of applications in the new generation.
    pub apps: usize,
    /// Applications that were not in the previous generation.
    pub added: Vec<String>,
    /// Applications from the previous generation that were dropped.
    pub removed: Vec<String>,
    /// Applications whose fetch failed and which kept their previous entry.
    pub stale: Vec<String>,
    /// Applications whose fetch failed without a previous entry to fall back to.
    pub failed: Vec<String>,
}

/// Concurrent read access to the current allow-lists, refreshed from an [`AllowListSource`].
#[derive(Debug)]
pub struct AllowListCache {
    current: RwLock<Arc<AllowLists>>,
    update_lock: Mutex<()>,
    loaded: AtomicBool,
    max_concurrent_fetches: usize,
}

impl AllowListCache {
    /// Creates an empty cache.
    ///
    /// Updates fetch at most `max_concurrent_fetches` allow-lists at the same time.
    pub fn new(max_concurrent_fetches: usize) -> Self {
        Self {
            current: RwLock::new(Arc::default()),
            update_lock: Mutex::new(()),
            loaded: AtomicBool::new(false),
            max_concurrent_fetches: max_concurrent_fetches.max(1),
        }
    }

    /// Returns the allow-list of `app_id` from the current generation.
    ///
    /// An empty cache reports every application as unknown.
    pub fn get_allowed_metrics(&self, app_id: &str) -> Result<Arc<AllowList>, LookupError> {
        self.current
            .read()
            .get(app_id)
            .cloned()
            .ok_or_else(|| LookupError::UnknownApp(app_id.to_owned()))
    }

    /// Returns `true` once an update has completed.
    pub fn is_ready(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Returns the current generation.
    pub fn snapshot(&self) -> Arc<AllowLists> {
        Arc::clone(&self.current.read())
    }

    /// Runs one refresh cycle against `source`.
    ///
    /// Concurrent calls are serialized. If the manifest cannot be fetched, the cache is left
    /// untouched. Applications whose allow-list cannot be fetched keep their previous entry.
    pub async fn update<S>(&self, source: &S) -> Result<UpdateSummary, UpdateError>
    where
        S: AllowListSource,
    {
        let _guard = self.update_lock.lock().await;

        let manifest = source
            .fetch_manifest()
            .await
            .map_err(UpdateError::Manifest)?;

        let app_ids: BTreeSet<String> = manifest.metrics_apps.into_iter().collect();
        let previous = self.snapshot();

        let results: Vec<_> = stream::iter(app_ids)
            .map(|app_id| fetch_allow_list(source, app_id))
            .buffer_unordered(self.max_concurrent_fetches)
            .collect()
            .await;

        let mut summary = UpdateSummary::default();
        let mut next = AllowLists::with_capacity(results.len());

        for (app_id, result) in results {
            let entry = match result {
                Ok(response) => Arc::new(AllowList::new(app_id.as_str(), response.metrics)),
                Err(error) => match previous.get(&app_id) {
                    Some(entry) => {
                        tally_log::warn!(
                            error = &error as &dyn Error,
                            app_id = %app_id,
                            "failed to fetch allow-list, keeping previous entry",
                        );
                        summary.stale.push(app_id.clone());
                        Arc::clone(entry)
                    }
                    None => {
                        tally_log::warn!(
                            error = &error as &dyn Error,
                            app_id = %app_id,
                            "failed to fetch allow-list",
                        );
                        summary.failed.push(app_id);
                        continue;
                    }
                },
            };

            next.insert(app_id, entry);
        }

        summary.apps = next.len();
        summary.added = next
            .keys()
            .filter(|app_id| !previous.contains_key(*app_id))
            .cloned()
            .collect();
        summary.removed = previous
            .keys()
            .filter(|app_id| !next.contains_key(*app_id))
            .cloned()
            .collect();

        summary.added.sort_unstable();
        summary.removed.sort_unstable();
        summary.stale.sort_unstable();
        summary.failed.sort_unstable();

        *self.current.write() = Arc::new(next);
        self.loaded.store(true, Ordering::Release);

        tally_log::info!(
            apps = summary.apps,
            added = ?summary.added,
            removed = ?summary.removed,
            "updated allow-lists",
        );

        Ok(summary)
    }
}

async fn fetch_allow_list<S>(
    source: &S,
    app_id: String,
) -> (String, Result<AllowedMetricsResponse, FetchError>)
where
    S: AllowListSource,
{
    let result = source.fetch_allow_list(&app_id).await;
    (app_id, result)
}
