//! The entity cache: read-through fetching with request
//! de-duplication, optimistic mutations with snapshot rollback, and
//! stale-while-revalidate reads.
//!
//! All cache state lives behind a single async mutex. Every
//! optimistic write captures its snapshot and applies its patch
//! inside one lock acquisition with no await in between, so no other
//! task can observe a half-applied mutation or capture a corrupt
//! snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use super::entry::{CacheConfig, CacheEntry, CacheRead, CachedValue, Page};
use super::error::{Result, SyncError};
use super::keys::{CacheKey, Scope};
use super::traits::{CollectionQuery, EntitySource, SyncEntity};

/// Signal fanned out to callers awaiting a shared in-flight fetch.
/// On success waiters re-read the (now populated) entry; on failure
/// they receive the error itself.
type WaiterSignal = std::result::Result<(), SyncError>;

struct InFlight {
    seq: u64,
    tx: broadcast::Sender<WaiterSignal>,
}

struct CacheInner<E> {
    entries: HashMap<CacheKey, CacheEntry<E>>,
    in_flight: HashMap<CacheKey, InFlight>,
    seq: u64,
}

impl<E> CacheInner<E> {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

/// Rollback state for one pending mutation: every touched key with
/// its prior entry (or prior absence), captured before the optimistic
/// patch. Rollback restores exactly these keys and nothing else, so
/// overlapping mutations compose.
struct MutationSnapshot<E> {
    prior: Vec<(CacheKey, Option<CacheEntry<E>>)>,
}

impl<E: Clone> MutationSnapshot<E> {
    fn new() -> Self {
        Self { prior: Vec::new() }
    }

    fn record(&mut self, key: CacheKey, entry: Option<CacheEntry<E>>) {
        if !self.prior.iter().any(|(k, _)| *k == key) {
            self.prior.push((key, entry));
        }
    }

    fn len(&self) -> usize {
        self.prior.len()
    }
}

/// Client-side cache of one entity type, synchronized against a
/// remote [`EntitySource`].
///
/// Cheap to clone; clones share the same cache state. Construct one
/// per entity type at the application's composition root (tests build
/// a fresh instance each). There is no global instance.
pub struct EntityCache<E: SyncEntity> {
    source: Arc<dyn EntitySource<E>>,
    inner: Arc<Mutex<CacheInner<E>>>,
    config: CacheConfig,
}

impl<E: SyncEntity> Clone for EntityCache<E> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            inner: Arc::clone(&self.inner),
            config: self.config,
        }
    }
}

impl<E: SyncEntity> EntityCache<E> {
    /// Creates a cache with default freshness windows.
    pub fn new(source: Arc<dyn EntitySource<E>>) -> Self {
        Self::with_config(source, CacheConfig::default())
    }

    /// Creates a cache with explicit freshness windows.
    pub fn with_config(source: Arc<dyn EntitySource<E>>, config: CacheConfig) -> Self {
        Self {
            source,
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                seq: 0,
            })),
            config,
        }
    }

    fn collection_key(query: &E::Query) -> CacheKey {
        CacheKey::collection(format!("{}:{}", E::KIND, query.cache_key()))
    }

    // ---- reads ------------------------------------------------------

    /// Returns the cached page for `query`, fetching it when absent
    /// or no longer fresh. Concurrent callers for the same query
    /// share a single remote request. On failure any previously
    /// cached value is left intact and the error is surfaced to every
    /// waiting caller.
    pub async fn fetch_collection(&self, query: &E::Query) -> Result<Page<E>> {
        let key = Self::collection_key(query);
        let lead = {
            let mut inner = self.inner.lock().await;
            if let Some(page) = inner
                .entries
                .get(&key)
                .filter(|entry| entry.is_fresh(self.config.collection_ttl))
                .and_then(|entry| entry.value.as_page())
            {
                return Ok(page.clone());
            }
            self.join_or_lead(&mut inner, &key)
        };
        match lead {
            Err(rx) => {
                Self::await_waiter(rx).await?;
                self.page_from_cache(&key).await
            }
            Ok((seq, tx)) => {
                debug!(kind = E::KIND, key = %key, seq, "fetching collection");
                let result = self.source.fetch_page(query).await;
                self.settle_page_fetch(key, seq, tx, result).await
            }
        }
    }

    /// Returns the cached entity for `id`, fetching it when absent or
    /// no longer fresh. Same sharing and failure semantics as
    /// [`fetch_collection`](Self::fetch_collection).
    pub async fn fetch_entity(&self, id: &str) -> Result<E> {
        let key = CacheKey::entity(id);
        let lead = {
            let mut inner = self.inner.lock().await;
            if let Some(entity) = inner
                .entries
                .get(&key)
                .filter(|entry| entry.is_fresh(self.config.entity_ttl))
                .and_then(|entry| entry.value.as_entity())
            {
                return Ok(entity.clone());
            }
            self.join_or_lead(&mut inner, &key)
        };
        match lead {
            Err(rx) => {
                Self::await_waiter(rx).await?;
                self.entity_from_cache(&key).await
            }
            Ok((seq, tx)) => {
                debug!(kind = E::KIND, key = %key, seq, "fetching entity");
                let result = self.source.fetch_one(id).await;
                self.settle_entity_fetch(key, seq, tx, result).await
            }
        }
    }

    /// Forces a refetch for `query`, superseding any in-flight fetch
    /// for the same key: if the older request settles afterwards its
    /// response is discarded.
    pub async fn refresh_collection(&self, query: &E::Query) -> Result<Page<E>> {
        let key = Self::collection_key(query);
        let (seq, tx) = self.lead(&key).await;
        let result = self.source.fetch_page(query).await;
        self.settle_page_fetch(key, seq, tx, result).await
    }

    /// Forces a refetch for `id`, superseding any in-flight fetch for
    /// the same key.
    pub async fn refresh_entity(&self, id: &str) -> Result<E> {
        let key = CacheKey::entity(id);
        let (seq, tx) = self.lead(&key).await;
        let result = self.source.fetch_one(id).await;
        self.settle_entity_fetch(key, seq, tx, result).await
    }

    /// Peeks at the cached state for `query` without side effects:
    /// the last-known value plus staleness, in-flight and error
    /// flags. Read failures never escape this boundary.
    pub async fn read_collection(&self, query: &E::Query) -> CacheRead<Page<E>> {
        let key = Self::collection_key(query);
        let inner = self.inner.lock().await;
        let fetching = inner.in_flight.contains_key(&key);
        match inner.entries.get(&key) {
            Some(entry) => CacheRead {
                value: entry.value.as_page().cloned(),
                stale: !entry.is_fresh(self.config.collection_ttl),
                fetching,
                error: entry.last_error.clone(),
            },
            None => CacheRead::empty(fetching),
        }
    }

    /// Peeks at the cached state for `id` without side effects.
    pub async fn read_entity(&self, id: &str) -> CacheRead<E> {
        let key = CacheKey::entity(id);
        let inner = self.inner.lock().await;
        let fetching = inner.in_flight.contains_key(&key);
        match inner.entries.get(&key) {
            Some(entry) => CacheRead {
                value: entry.value.as_entity().cloned(),
                stale: !entry.is_fresh(self.config.entity_ttl),
                fetching,
                error: entry.last_error.clone(),
            },
            None => CacheRead::empty(fetching),
        }
    }

    /// Subscription read: like [`read_collection`](Self::read_collection),
    /// but a stale value additionally triggers a background refetch
    /// (stale-while-revalidate). The stale value is served
    /// immediately.
    pub async fn observe_collection(&self, query: &E::Query) -> CacheRead<Page<E>> {
        let read = self.read_collection(query).await;
        if read.value.is_some() && read.stale && !read.fetching {
            let cache = self.clone();
            let query = query.clone();
            tokio::spawn(async move {
                if let Err(err) = cache.refresh_collection(&query).await {
                    debug!(kind = E::KIND, error = %err, "background revalidation failed");
                }
            });
        }
        read
    }

    /// Subscription read for a single entity, with background
    /// revalidation of stale values.
    pub async fn observe_entity(&self, id: &str) -> CacheRead<E> {
        let read = self.read_entity(id).await;
        if read.value.is_some() && read.stale && !read.fetching {
            let cache = self.clone();
            let id = id.to_string();
            tokio::spawn(async move {
                if let Err(err) = cache.refresh_entity(&id).await {
                    debug!(kind = E::KIND, error = %err, "background revalidation failed");
                }
            });
        }
        read
    }

    // ---- mutations --------------------------------------------------

    /// Creates an entity optimistically: a provisional record is
    /// inserted into every cached collection before the remote call.
    /// On success the provisional row is replaced by the
    /// server-confirmed entity everywhere and collections are marked
    /// stale to resync ordering; on failure every touched entry is
    /// rolled back to its snapshot.
    pub async fn create(&self, payload: E::Create) -> Result<E> {
        let provisional_id = format!("provisional-{}", Uuid::new_v4());
        let snapshot = {
            let mut guard = self.inner.lock().await;
            let seq = guard.next_seq();
            let inner = &mut *guard;
            let provisional = E::provisional(&payload, provisional_id.clone());
            let mut snapshot = MutationSnapshot::new();
            for (key, entry) in inner.entries.iter_mut() {
                if !key.is_collection() {
                    continue;
                }
                snapshot.record(key.clone(), Some(entry.clone()));
                if let CachedValue::Page(page) = &mut entry.value {
                    page.results.insert(0, provisional.clone());
                    page.count += 1;
                }
                entry.version = seq;
            }
            snapshot
        };

        match self.source.create(&payload).await {
            Ok(confirmed) => {
                let mut guard = self.inner.lock().await;
                let seq = guard.next_seq();
                let inner = &mut *guard;
                for (key, entry) in inner.entries.iter_mut() {
                    if !key.is_collection() {
                        continue;
                    }
                    if let CachedValue::Page(page) = &mut entry.value {
                        for row in page.results.iter_mut() {
                            if row.id() == provisional_id {
                                *row = confirmed.clone();
                            }
                        }
                    }
                    // Ordering and pagination are server-side; force a
                    // resync while still serving the confirmed row.
                    entry.stale = true;
                    entry.version = seq;
                }
                inner.entries.insert(
                    CacheKey::entity(confirmed.id()),
                    CacheEntry::fresh(CachedValue::Entity(confirmed.clone()), seq),
                );
                debug!(kind = E::KIND, id = confirmed.id(), "create confirmed");
                Ok(confirmed)
            }
            Err(err) => {
                self.rollback(snapshot, &err).await;
                Err(err)
            }
        }
    }

    /// Applies `patch` optimistically to the cached single entity and
    /// to every cached collection row with that id, then issues the
    /// remote update. On success the server-confirmed entity replaces
    /// the optimistic value and the touched entries are fresh;
    /// collections that did not contain the id are marked stale since
    /// the patch may have moved the entity into their result set. On
    /// failure every touched entry is rolled back.
    pub async fn update(&self, id: &str, patch: E::Patch) -> Result<E> {
        let snapshot = {
            let mut guard = self.inner.lock().await;
            let seq = guard.next_seq();
            let inner = &mut *guard;
            let mut snapshot = MutationSnapshot::new();

            let entity_key = CacheKey::entity(id);
            if let Some(entry) = inner.entries.get_mut(&entity_key) {
                snapshot.record(entity_key, Some(entry.clone()));
                if let CachedValue::Entity(entity) = &mut entry.value {
                    entity.apply_patch(&patch);
                }
                entry.version = seq;
            }

            for (key, entry) in inner.entries.iter_mut() {
                let contains = entry
                    .value
                    .as_page()
                    .is_some_and(|page| page.results.iter().any(|row| row.id() == id));
                if !contains {
                    continue;
                }
                snapshot.record(key.clone(), Some(entry.clone()));
                if let CachedValue::Page(page) = &mut entry.value {
                    for row in page.results.iter_mut() {
                        if row.id() == id {
                            row.apply_patch(&patch);
                        }
                    }
                }
                entry.version = seq;
            }
            snapshot
        };

        match self.source.update(id, &patch).await {
            Ok(confirmed) => {
                let mut guard = self.inner.lock().await;
                let seq = guard.next_seq();
                let inner = &mut *guard;
                for (key, entry) in inner.entries.iter_mut() {
                    if !key.is_collection() {
                        continue;
                    }
                    let mut contains = false;
                    if let CachedValue::Page(page) = &mut entry.value {
                        for row in page.results.iter_mut() {
                            if row.id() == id {
                                *row = confirmed.clone();
                                contains = true;
                            }
                        }
                    }
                    if contains {
                        *entry = CacheEntry::fresh(entry.value.clone(), seq);
                    } else {
                        entry.stale = true;
                    }
                }
                inner.entries.insert(
                    CacheKey::entity(id),
                    CacheEntry::fresh(CachedValue::Entity(confirmed.clone()), seq),
                );
                debug!(kind = E::KIND, id, "update confirmed");
                Ok(confirmed)
            }
            Err(err) => {
                self.rollback(snapshot, &err).await;
                Err(err)
            }
        }
    }

    /// Removes `id` optimistically from every cached collection
    /// (decrementing counts) and drops the single-entity entry, then
    /// issues the remote delete. Success is terminal; failure
    /// re-inserts the removed state from the snapshot.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let snapshot = {
            let mut guard = self.inner.lock().await;
            let seq = guard.next_seq();
            let inner = &mut *guard;
            let mut snapshot = MutationSnapshot::new();

            let entity_key = CacheKey::entity(id);
            if let Some(entry) = inner.entries.remove(&entity_key) {
                snapshot.record(entity_key, Some(entry));
            }

            for (key, entry) in inner.entries.iter_mut() {
                let contains = entry
                    .value
                    .as_page()
                    .is_some_and(|page| page.results.iter().any(|row| row.id() == id));
                if !contains {
                    continue;
                }
                snapshot.record(key.clone(), Some(entry.clone()));
                if let CachedValue::Page(page) = &mut entry.value {
                    page.results.retain(|row| row.id() != id);
                    page.count = page.count.saturating_sub(1);
                }
                entry.version = seq;
            }
            snapshot
        };

        match self.source.delete(id).await {
            Ok(()) => {
                debug!(kind = E::KIND, id, "delete confirmed");
                Ok(())
            }
            Err(err) => {
                self.rollback(snapshot, &err).await;
                Err(err)
            }
        }
    }

    /// Marks every entry in `scope` stale without deleting it: the
    /// value keeps being served while the next read revalidates.
    pub async fn invalidate(&self, scope: Scope) {
        let mut inner = self.inner.lock().await;
        let mut marked = 0usize;
        for (key, entry) in inner.entries.iter_mut() {
            if scope.matches(key) {
                entry.stale = true;
                marked += 1;
            }
        }
        debug!(kind = E::KIND, ?scope, marked, "invalidated cache entries");
    }

    /// Drops entries that have not been refreshed for longer than
    /// `max_age` and have no fetch in flight.
    pub async fn evict_idle(&self, max_age: Duration) {
        let mut guard = self.inner.lock().await;
        let CacheInner {
            entries, in_flight, ..
        } = &mut *guard;
        let before = entries.len();
        entries.retain(|key, entry| {
            entry.fetched_at.elapsed() <= max_age || in_flight.contains_key(key)
        });
        debug!(
            kind = E::KIND,
            evicted = before - entries.len(),
            "evicted idle cache entries"
        );
    }

    // ---- internals --------------------------------------------------

    /// Joins the in-flight fetch for `key` if one exists, otherwise
    /// registers this caller as the leader.
    #[allow(clippy::type_complexity)]
    fn join_or_lead(
        &self,
        inner: &mut CacheInner<E>,
        key: &CacheKey,
    ) -> std::result::Result<(u64, broadcast::Sender<WaiterSignal>), broadcast::Receiver<WaiterSignal>>
    {
        if let Some(flight) = inner.in_flight.get(key) {
            Err(flight.tx.subscribe())
        } else {
            let seq = inner.next_seq();
            let (tx, _rx) = broadcast::channel(4);
            inner.in_flight.insert(
                key.clone(),
                InFlight {
                    seq,
                    tx: tx.clone(),
                },
            );
            Ok((seq, tx))
        }
    }

    /// Registers a leading fetch for `key` unconditionally, replacing
    /// (and thereby superseding) any older in-flight request.
    async fn lead(&self, key: &CacheKey) -> (u64, broadcast::Sender<WaiterSignal>) {
        let mut inner = self.inner.lock().await;
        let seq = inner.next_seq();
        let (tx, _rx) = broadcast::channel(4);
        inner.in_flight.insert(
            key.clone(),
            InFlight {
                seq,
                tx: tx.clone(),
            },
        );
        (seq, tx)
    }

    async fn await_waiter(mut rx: broadcast::Receiver<WaiterSignal>) -> Result<()> {
        match rx.recv().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(SyncError::Network("in-flight request dropped".to_string())),
        }
    }

    async fn page_from_cache(&self, key: &CacheKey) -> Result<Page<E>> {
        let inner = self.inner.lock().await;
        inner
            .entries
            .get(key)
            .and_then(|entry| entry.value.as_page())
            .cloned()
            .ok_or_else(|| SyncError::Network("cache entry missing after fetch".to_string()))
    }

    async fn entity_from_cache(&self, key: &CacheKey) -> Result<E> {
        let inner = self.inner.lock().await;
        inner
            .entries
            .get(key)
            .and_then(|entry| entry.value.as_entity())
            .cloned()
            .ok_or_else(|| SyncError::Network("cache entry missing after fetch".to_string()))
    }

    async fn settle_page_fetch(
        &self,
        key: CacheKey,
        seq: u64,
        tx: broadcast::Sender<WaiterSignal>,
        result: Result<Page<E>>,
    ) -> Result<Page<E>> {
        let mut inner = self.inner.lock().await;
        if inner.in_flight.get(&key).is_some_and(|f| f.seq == seq) {
            inner.in_flight.remove(&key);
        }
        match result {
            Ok(page) => {
                if inner.entries.get(&key).is_some_and(|e| e.version > seq) {
                    debug!(kind = E::KIND, key = %key, seq, "discarding superseded response");
                } else {
                    inner.entries.insert(
                        key.clone(),
                        CacheEntry::fresh(CachedValue::Page(page.clone()), seq),
                    );
                }
                let _ = tx.send(Ok(()));
                let current = inner
                    .entries
                    .get(&key)
                    .and_then(|entry| entry.value.as_page())
                    .cloned();
                Ok(current.unwrap_or(page))
            }
            Err(err) => {
                // Stale-while-error: the prior value stays served.
                if let Some(entry) = inner.entries.get_mut(&key) {
                    entry.last_error = Some(err.clone());
                }
                warn!(kind = E::KIND, key = %key, error = %err, "collection fetch failed");
                let _ = tx.send(Err(err.clone()));
                Err(err)
            }
        }
    }

    async fn settle_entity_fetch(
        &self,
        key: CacheKey,
        seq: u64,
        tx: broadcast::Sender<WaiterSignal>,
        result: Result<E>,
    ) -> Result<E> {
        let mut inner = self.inner.lock().await;
        if inner.in_flight.get(&key).is_some_and(|f| f.seq == seq) {
            inner.in_flight.remove(&key);
        }
        match result {
            Ok(entity) => {
                if inner.entries.get(&key).is_some_and(|e| e.version > seq) {
                    debug!(kind = E::KIND, key = %key, seq, "discarding superseded response");
                } else {
                    inner.entries.insert(
                        key.clone(),
                        CacheEntry::fresh(CachedValue::Entity(entity.clone()), seq),
                    );
                }
                let _ = tx.send(Ok(()));
                let current = inner
                    .entries
                    .get(&key)
                    .and_then(|entry| entry.value.as_entity())
                    .cloned();
                Ok(current.unwrap_or(entity))
            }
            Err(err) => {
                if let Some(entry) = inner.entries.get_mut(&key) {
                    entry.last_error = Some(err.clone());
                }
                warn!(kind = E::KIND, key = %key, error = %err, "entity fetch failed");
                let _ = tx.send(Err(err.clone()));
                Err(err)
            }
        }
    }

    /// Restores every key owned by a settled mutation to its
    /// snapshotted state. A conflict additionally marks the restored
    /// keys stale so the next read refetches server truth.
    async fn rollback(&self, snapshot: MutationSnapshot<E>, err: &SyncError) {
        let mut guard = self.inner.lock().await;
        let seq = guard.next_seq();
        let inner = &mut *guard;
        warn!(
            kind = E::KIND,
            error = %err,
            keys = snapshot.len(),
            "rolling back optimistic mutation"
        );
        let conflict = matches!(err, SyncError::Conflict(_));
        for (key, prior) in snapshot.prior {
            match prior {
                Some(mut entry) => {
                    entry.version = seq;
                    if conflict {
                        entry.stale = true;
                    }
                    inner.entries.insert(key, entry);
                }
                None => {
                    inner.entries.remove(&key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::todo::{CreateTaskRequest, Task, TaskQuery, TaskStatus, UpdateTaskRequest};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    struct Scripted<T> {
        gate: Option<Arc<Notify>>,
        result: Result<T>,
    }

    impl<T> Scripted<T> {
        fn ok(value: T) -> Self {
            Self {
                gate: None,
                result: Ok(value),
            }
        }

        fn err(err: SyncError) -> Self {
            Self {
                gate: None,
                result: Err(err),
            }
        }

        fn gated(result: Result<T>, gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                result,
            }
        }
    }

    /// In-memory source replaying scripted responses per operation,
    /// optionally held open by a gate for interleaving tests.
    #[derive(Default)]
    struct ScriptedSource {
        pages: StdMutex<VecDeque<Scripted<Page<Task>>>>,
        singles: StdMutex<VecDeque<Scripted<Task>>>,
        creates: StdMutex<VecDeque<Scripted<Task>>>,
        updates: StdMutex<VecDeque<Scripted<Task>>>,
        deletes: StdMutex<VecDeque<Scripted<()>>>,
        page_calls: AtomicUsize,
        single_calls: AtomicUsize,
        create_calls: AtomicUsize,
        update_calls: AtomicUsize,
        delete_calls: AtomicUsize,
    }

    async fn replay<T>(queue: &StdMutex<VecDeque<Scripted<T>>>, what: &str) -> Result<T> {
        let scripted = queue.lock().unwrap().pop_front();
        match scripted {
            Some(scripted) => {
                if let Some(gate) = scripted.gate {
                    gate.notified().await;
                }
                scripted.result
            }
            None => Err(SyncError::Network(format!("no scripted {what} response"))),
        }
    }

    #[async_trait]
    impl EntitySource<Task> for ScriptedSource {
        async fn fetch_page(&self, _query: &TaskQuery) -> Result<Page<Task>> {
            self.page_calls.fetch_add(1, Ordering::SeqCst);
            replay(&self.pages, "page").await
        }

        async fn fetch_one(&self, _id: &str) -> Result<Task> {
            self.single_calls.fetch_add(1, Ordering::SeqCst);
            replay(&self.singles, "single").await
        }

        async fn create(&self, _payload: &CreateTaskRequest) -> Result<Task> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            replay(&self.creates, "create").await
        }

        async fn update(&self, _id: &str, _patch: &UpdateTaskRequest) -> Result<Task> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            replay(&self.updates, "update").await
        }

        async fn delete(&self, _id: &str) -> Result<()> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            replay(&self.deletes, "delete").await
        }
    }

    fn task(id: &str, status: TaskStatus) -> Task {
        Task::new(id, "l-1", format!("Task {id}")).with_status(status)
    }

    fn page(tasks: Vec<Task>) -> Page<Task> {
        Page::from_results(tasks)
    }

    /// Lets spawned tasks run to their next suspension point.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn harness() -> (Arc<ScriptedSource>, EntityCache<Task>) {
        let source = Arc::new(ScriptedSource::default());
        let cache = EntityCache::new(source.clone() as Arc<dyn EntitySource<Task>>);
        (source, cache)
    }

    async fn seed_collection(
        source: &ScriptedSource,
        cache: &EntityCache<Task>,
        query: &TaskQuery,
        tasks: Vec<Task>,
    ) -> Page<Task> {
        source
            .pages
            .lock()
            .unwrap()
            .push_back(Scripted::ok(page(tasks)));
        cache.fetch_collection(query).await.unwrap()
    }

    #[tokio::test]
    async fn test_fetch_collection_serves_fresh_cache() {
        let (source, cache) = harness();
        let query = TaskQuery::default();
        let first = seed_collection(&source, &cache, &query, vec![task("a", TaskStatus::Todo)]).await;

        // Second call is a cache hit; the scripted queue is empty, so
        // a remote call would fail the test.
        let second = cache.fetch_collection(&query).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(source.page_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidated_collection_is_refetched() {
        let (source, cache) = harness();
        let query = TaskQuery::default();
        seed_collection(&source, &cache, &query, vec![task("a", TaskStatus::Todo)]).await;

        cache.invalidate(Scope::Collections).await;
        source
            .pages
            .lock()
            .unwrap()
            .push_back(Scripted::ok(page(vec![task("a", TaskStatus::Done)])));

        let refetched = cache.fetch_collection(&query).await.unwrap();
        assert_eq!(refetched.results[0].status, TaskStatus::Done);
        assert_eq!(source.page_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_request() {
        let (source, cache) = harness();
        let gate = Arc::new(Notify::new());
        source.pages.lock().unwrap().push_back(Scripted::gated(
            Ok(page(vec![task("a", TaskStatus::Todo)])),
            gate.clone(),
        ));

        let query = TaskQuery::default();
        let leader = {
            let cache = cache.clone();
            let query = query.clone();
            tokio::spawn(async move { cache.fetch_collection(&query).await })
        };
        settle().await;
        let waiter = {
            let cache = cache.clone();
            let query = query.clone();
            tokio::spawn(async move { cache.fetch_collection(&query).await })
        };
        settle().await;

        gate.notify_one();
        let first = leader.await.unwrap().unwrap();
        let second = waiter.await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(source.page_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_error_preserves_cached_value() {
        let (source, cache) = harness();
        let query = TaskQuery::default();
        let seeded = seed_collection(&source, &cache, &query, vec![task("a", TaskStatus::Todo)]).await;

        cache.invalidate(Scope::Collections).await;
        source
            .pages
            .lock()
            .unwrap()
            .push_back(Scripted::err(SyncError::Network("offline".to_string())));

        let err = cache.fetch_collection(&query).await.unwrap_err();
        assert_eq!(err, SyncError::Network("offline".to_string()));

        let read = cache.read_collection(&query).await;
        assert_eq!(read.value, Some(seeded));
        assert!(read.stale);
        assert_eq!(read.error, Some(err));
    }

    #[tokio::test]
    async fn test_observe_collection_revalidates_stale_value() {
        let (source, cache) = harness();
        let query = TaskQuery::default();
        let seeded = seed_collection(&source, &cache, &query, vec![task("a", TaskStatus::Todo)]).await;

        cache.invalidate(Scope::Collections).await;
        source
            .pages
            .lock()
            .unwrap()
            .push_back(Scripted::ok(page(vec![task("a", TaskStatus::Done)])));

        // The stale value is served immediately...
        let read = cache.observe_collection(&query).await;
        assert_eq!(read.value, Some(seeded));
        assert!(read.stale);

        // ...and the background refetch replaces it.
        settle().await;
        let read = cache.read_collection(&query).await;
        assert_eq!(read.value.unwrap().results[0].status, TaskStatus::Done);
        assert!(!read.stale);
        assert_eq!(source.page_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let (source, cache) = harness();
        let slow_gate = Arc::new(Notify::new());
        let fast_gate = Arc::new(Notify::new());
        {
            let mut singles = source.singles.lock().unwrap();
            singles.push_back(Scripted::gated(
                Ok(task("x", TaskStatus::Todo)),
                slow_gate.clone(),
            ));
            singles.push_back(Scripted::gated(
                Ok(task("x", TaskStatus::Done)),
                fast_gate.clone(),
            ));
        }

        let slow = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.fetch_entity("x").await })
        };
        settle().await;
        let fast = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.refresh_entity("x").await })
        };
        settle().await;

        // The later-issued request settles first.
        fast_gate.notify_one();
        let fresh = fast.await.unwrap().unwrap();
        assert_eq!(fresh.status, TaskStatus::Done);

        // The slow response arrives afterwards and is discarded; the
        // superseded caller still observes the fresher value.
        slow_gate.notify_one();
        let superseded = slow.await.unwrap().unwrap();
        assert_eq!(superseded.status, TaskStatus::Done);

        let read = cache.read_entity("x").await;
        assert_eq!(read.value.unwrap().status, TaskStatus::Done);
        assert_eq!(source.single_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_update_rolls_back_on_failure() {
        let (source, cache) = harness();
        let query = TaskQuery::default();
        let seeded = seed_collection(
            &source,
            &cache,
            &query,
            vec![
                task("a", TaskStatus::Todo),
                task("b", TaskStatus::Ongoing),
                task("c", TaskStatus::Done),
            ],
        )
        .await;

        source.updates.lock().unwrap().push_back(Scripted::err(SyncError::Server {
            status: 500,
            message: "boom".to_string(),
        }));

        let err = cache
            .update("b", UpdateTaskRequest::status(TaskStatus::Done))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Server { status: 500, .. }));

        let read = cache.read_collection(&query).await;
        assert_eq!(read.value, Some(seeded));
    }

    #[tokio::test]
    async fn test_update_is_optimistic_then_confirmed_fresh() {
        let (source, cache) = harness();
        let query = TaskQuery::default();
        seed_collection(&source, &cache, &query, vec![task("a", TaskStatus::Todo)]).await;

        let gate = Arc::new(Notify::new());
        source.updates.lock().unwrap().push_back(Scripted::gated(
            Ok(task("a", TaskStatus::Done)),
            gate.clone(),
        ));

        let pending = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .update("a", UpdateTaskRequest::status(TaskStatus::Done))
                    .await
            })
        };
        settle().await;

        // Optimistic value is visible while the remote call is held.
        let read = cache.read_collection(&query).await;
        assert_eq!(read.value.unwrap().results[0].status, TaskStatus::Done);

        gate.notify_one();
        let confirmed = pending.await.unwrap().unwrap();
        assert_eq!(confirmed.status, TaskStatus::Done);

        // After settlement the containing collection is fresh.
        let read = cache.read_collection(&query).await;
        let page = read.value.unwrap();
        assert_eq!(page.results[0].status, TaskStatus::Done);
        assert_eq!(page.count, 1);
        assert!(!read.stale);
        assert!(read.error.is_none());
    }

    #[tokio::test]
    async fn test_update_stales_collections_not_containing_the_id() {
        let (source, cache) = harness();
        let all = TaskQuery::default();
        let done_only = TaskQuery {
            status: Some(TaskStatus::Done),
            ..TaskQuery::default()
        };
        seed_collection(&source, &cache, &all, vec![task("a", TaskStatus::Todo)]).await;
        seed_collection(&source, &cache, &done_only, vec![task("z", TaskStatus::Done)]).await;

        source
            .updates
            .lock()
            .unwrap()
            .push_back(Scripted::ok(task("a", TaskStatus::Done)));
        cache
            .update("a", UpdateTaskRequest::status(TaskStatus::Done))
            .await
            .unwrap();

        // "a" may now belong in the done-only result set.
        assert!(!cache.read_collection(&all).await.stale);
        assert!(cache.read_collection(&done_only).await.stale);
    }

    #[tokio::test]
    async fn test_create_replaces_provisional_with_confirmed() {
        let (source, cache) = harness();
        let query = TaskQuery::default();
        seed_collection(&source, &cache, &query, vec![task("a", TaskStatus::Todo)]).await;

        let gate = Arc::new(Notify::new());
        source
            .creates
            .lock()
            .unwrap()
            .push_back(Scripted::gated(Ok(task("srv-1", TaskStatus::Todo)), gate.clone()));

        let pending = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .create(CreateTaskRequest::new("l-1", "New task"))
                    .await
            })
        };
        settle().await;

        // Provisional row is visible and counted before settlement.
        let read = cache.read_collection(&query).await;
        let page = read.value.unwrap();
        assert_eq!(page.count, 2);
        assert!(page.results[0].id.starts_with("provisional-"));

        gate.notify_one();
        let confirmed = pending.await.unwrap().unwrap();
        assert_eq!(confirmed.id, "srv-1");

        // No cache entry retains the provisional id afterwards.
        let read = cache.read_collection(&query).await;
        let page = read.value.unwrap();
        assert_eq!(page.count, 2);
        assert!(page.results.iter().any(|t| t.id == "srv-1"));
        assert!(!page.results.iter().any(|t| t.id.starts_with("provisional-")));
        assert!(read.stale);

        let single = cache.read_entity("srv-1").await;
        assert_eq!(single.value.unwrap().id, "srv-1");
        assert!(!single.stale);
    }

    #[tokio::test]
    async fn test_create_rolls_back_on_failure() {
        let (source, cache) = harness();
        let query = TaskQuery::default();
        let seeded = seed_collection(&source, &cache, &query, vec![task("a", TaskStatus::Todo)]).await;

        source
            .creates
            .lock()
            .unwrap()
            .push_back(Scripted::err(SyncError::validation(
                "title",
                "This field may not be blank.",
            )));

        let err = cache
            .create(CreateTaskRequest::new("l-1", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        let read = cache.read_collection(&query).await;
        assert_eq!(read.value, Some(seeded));
    }

    #[tokio::test]
    async fn test_remove_applies_and_rolls_back() {
        let (source, cache) = harness();
        let query = TaskQuery::default();
        let seeded = seed_collection(
            &source,
            &cache,
            &query,
            vec![task("a", TaskStatus::Todo), task("b", TaskStatus::Done)],
        )
        .await;
        source
            .singles
            .lock()
            .unwrap()
            .push_back(Scripted::ok(task("a", TaskStatus::Todo)));
        cache.fetch_entity("a").await.unwrap();

        // Failed delete restores rows, counts and the single entry.
        source.deletes.lock().unwrap().push_back(Scripted::err(
            SyncError::Conflict("already deleted".to_string()),
        ));
        let err = cache.remove("a").await.unwrap_err();
        assert!(matches!(err, SyncError::Conflict(_)));
        let read = cache.read_collection(&query).await;
        assert_eq!(read.value, Some(seeded));
        // Conflict rollback forces a refetch of server truth.
        assert!(read.stale);
        assert!(cache.read_entity("a").await.value.is_some());

        // Successful delete is terminal.
        source.deletes.lock().unwrap().push_back(Scripted::ok(()));
        cache.remove("a").await.unwrap();
        let read = cache.read_collection(&query).await;
        let page = read.value.unwrap();
        assert_eq!(page.count, 1);
        assert!(!page.results.iter().any(|t| t.id == "a"));
        assert!(cache.read_entity("a").await.value.is_none());
    }

    #[tokio::test]
    async fn test_rollback_restores_only_owned_keys() {
        let (source, cache) = harness();
        let q1 = TaskQuery::for_list("l-1");
        let q2 = TaskQuery::for_list("l-2");
        let seeded_q1 = seed_collection(&source, &cache, &q1, vec![task("a", TaskStatus::Todo)]).await;
        seed_collection(&source, &cache, &q2, vec![task("b", TaskStatus::Todo)]).await;

        // Second mutation patches q2 while the first mutation's
        // rollback only owns q1.
        source
            .updates
            .lock()
            .unwrap()
            .push_back(Scripted::err(SyncError::Network("offline".to_string())));
        cache
            .update("a", UpdateTaskRequest::status(TaskStatus::Done))
            .await
            .unwrap_err();

        source
            .updates
            .lock()
            .unwrap()
            .push_back(Scripted::ok(task("b", TaskStatus::Done)));
        cache
            .update("b", UpdateTaskRequest::status(TaskStatus::Done))
            .await
            .unwrap();

        assert_eq!(cache.read_collection(&q1).await.value, Some(seeded_q1));
        assert_eq!(
            cache.read_collection(&q2).await.value.unwrap().results[0].status,
            TaskStatus::Done
        );
    }

    #[tokio::test]
    async fn test_evict_idle_drops_expired_entries() {
        let (source, cache) = harness();
        let query = TaskQuery::default();
        seed_collection(&source, &cache, &query, vec![task("a", TaskStatus::Todo)]).await;

        cache.evict_idle(Duration::from_secs(60)).await;
        assert!(cache.read_collection(&query).await.value.is_some());

        cache.evict_idle(Duration::ZERO).await;
        assert!(cache.read_collection(&query).await.value.is_none());
    }

    #[tokio::test]
    async fn test_fetch_entity_caches_and_dedupes() {
        let (source, cache) = harness();
        source
            .singles
            .lock()
            .unwrap()
            .push_back(Scripted::ok(task("x", TaskStatus::Todo)));

        let first = cache.fetch_entity("x").await.unwrap();
        let second = cache.fetch_entity("x").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(source.single_calls.load(Ordering::SeqCst), 1);
    }
}
