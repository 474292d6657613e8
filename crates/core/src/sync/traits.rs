use async_trait::async_trait;

use super::entry::Page;
use super::error::Result;

/// A filter/ordering specification identifying one server-side
/// result set. Two queries with different parameters are independent
/// cache entries even when their result sets overlap.
pub trait CollectionQuery: Clone + Send + Sync + 'static {
    /// Canonical cache-key string for this query. Must be
    /// deterministic: equal queries produce equal strings, and any
    /// parameter difference changes the string.
    fn cache_key(&self) -> String;
}

/// A domain record the cache can synchronize.
///
/// The cache never interprets field semantics beyond the id; patches
/// and provisional construction are delegated to the entity type.
pub trait SyncEntity: Clone + Send + Sync + 'static {
    /// Collection filter type for this entity.
    type Query: CollectionQuery;
    /// Creation payload.
    type Create: Clone + Send + Sync + 'static;
    /// Partial-update payload.
    type Patch: Clone + Send + Sync + 'static;

    /// Short kind tag used in cache keys and log lines.
    const KIND: &'static str;

    /// Opaque identifier, unique within the entity type.
    fn id(&self) -> &str;

    /// Builds the provisional entity inserted optimistically while a
    /// create is in flight. Server-computed fields take placeholder
    /// values and are replaced on confirmation.
    fn provisional(payload: &Self::Create, provisional_id: String) -> Self;

    /// Applies a patch to a cached copy (the optimistic update).
    fn apply_patch(&mut self, patch: &Self::Patch);
}

/// The remote half of the synchronizer: how entities of one type are
/// fetched and mutated. Implemented by the HTTP client; tests provide
/// scripted in-memory sources.
#[async_trait]
pub trait EntitySource<E: SyncEntity>: Send + Sync {
    /// Fetches one collection page for a query.
    async fn fetch_page(&self, query: &E::Query) -> Result<Page<E>>;

    /// Fetches a single entity by id.
    async fn fetch_one(&self, id: &str) -> Result<E>;

    /// Creates an entity, returning the server-confirmed record.
    async fn create(&self, payload: &E::Create) -> Result<E>;

    /// Applies a partial update, returning the server-confirmed
    /// record.
    async fn update(&self, id: &str, patch: &E::Patch) -> Result<E>;

    /// Deletes an entity by id.
    async fn delete(&self, id: &str) -> Result<()>;
}
