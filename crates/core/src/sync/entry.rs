use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::error::SyncError;

/// One page of a paginated collection, as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
}

impl<T> Page<T> {
    /// Builds a single-page result from a full result set.
    pub fn from_results(results: Vec<T>) -> Self {
        let count = results.len() as u64;
        Self {
            results,
            count,
            next: None,
            previous: None,
        }
    }
}

/// The cached value for one key: a single entity or a collection
/// page, tagged explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue<E> {
    Entity(E),
    Page(Page<E>),
}

impl<E> CachedValue<E> {
    pub(crate) fn as_page(&self) -> Option<&Page<E>> {
        match self {
            CachedValue::Page(page) => Some(page),
            CachedValue::Entity(_) => None,
        }
    }

    pub(crate) fn as_entity(&self) -> Option<&E> {
        match self {
            CachedValue::Entity(entity) => Some(entity),
            CachedValue::Page(_) => None,
        }
    }
}

/// A cache entry: the last-known value plus freshness bookkeeping.
///
/// `version` is the monotonic sequence number of the write that
/// produced the value; settlement of a fetch is rejected when a
/// higher version has already been applied.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry<E> {
    pub value: CachedValue<E>,
    pub fetched_at: Instant,
    pub stale: bool,
    pub version: u64,
    pub last_error: Option<SyncError>,
}

impl<E> CacheEntry<E> {
    /// A freshly fetched or server-confirmed entry.
    pub fn fresh(value: CachedValue<E>, version: u64) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
            stale: false,
            version,
            last_error: None,
        }
    }

    /// Returns true if the entry may be served without revalidation.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        !self.stale && self.fetched_at.elapsed() < ttl
    }
}

/// What a subscriber sees for one key: the last-known value together
/// with staleness, in-flight and error flags. Read failures are
/// reported here instead of being thrown past the subscription
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRead<T> {
    pub value: Option<T>,
    pub stale: bool,
    pub fetching: bool,
    pub error: Option<SyncError>,
}

impl<T> CacheRead<T> {
    pub(crate) fn empty(fetching: bool) -> Self {
        Self {
            value: None,
            stale: false,
            fetching,
            error: None,
        }
    }
}

/// Freshness windows for the two entry shapes.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub collection_ttl: Duration,
    pub entity_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            collection_ttl: Duration::from_secs(30),
            entity_ttl: Duration::from_secs(120),
        }
    }
}
