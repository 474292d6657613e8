//! Synchronized store for todo lists.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use track_core::sync::{
    CacheRead, EntityCache, EntitySource, Page, Result as SyncResult, Scope, SyncError,
};
use track_core::todo::{
    validate_list_patch, validate_new_list, CreateListRequest, ListError, ListQuery, TodoList,
    UpdateListRequest,
};

use crate::client::TrackClient;

/// Remote source backed by the todo list endpoints.
struct ListApi {
    client: TrackClient,
}

#[async_trait]
impl EntitySource<TodoList> for ListApi {
    async fn fetch_page(&self, query: &ListQuery) -> SyncResult<Page<TodoList>> {
        self.client.list_lists(query).await.map_err(SyncError::from)
    }

    async fn fetch_one(&self, id: &str) -> SyncResult<TodoList> {
        self.client.get_list(id).await.map_err(SyncError::from)
    }

    async fn create(&self, payload: &CreateListRequest) -> SyncResult<TodoList> {
        self.client.create_list(payload).await.map_err(SyncError::from)
    }

    async fn update(&self, id: &str, patch: &UpdateListRequest) -> SyncResult<TodoList> {
        self.client
            .update_list(id, patch)
            .await
            .map_err(SyncError::from)
    }

    async fn delete(&self, id: &str) -> SyncResult<()> {
        self.client.delete_list(id).await.map_err(SyncError::from)
    }
}

fn validation_error(err: ListError) -> SyncError {
    let field = match err {
        ListError::EmptyName | ListError::NameTooLong => "name",
        ListError::InvalidColor(_) => "color",
    };
    SyncError::validation(field, err.to_string())
}

/// Cached todo lists, synchronized against the API.
#[derive(Clone)]
pub struct ListStore {
    cache: EntityCache<TodoList>,
}

impl ListStore {
    pub fn new(client: TrackClient) -> Self {
        Self::with_source(Arc::new(ListApi { client }))
    }

    /// Builds a store over any source. Tests inject mocks here.
    pub fn with_source(source: Arc<dyn EntitySource<TodoList>>) -> Self {
        Self {
            cache: EntityCache::new(source),
        }
    }

    pub(crate) fn cache(&self) -> &EntityCache<TodoList> {
        &self.cache
    }

    /// Current cached state for `query`, revalidating in the
    /// background when stale.
    pub async fn lists(&self, query: &ListQuery) -> CacheRead<Page<TodoList>> {
        self.cache.observe_collection(query).await
    }

    /// Current cached state for one list.
    pub async fn list(&self, id: &str) -> CacheRead<TodoList> {
        self.cache.observe_entity(id).await
    }

    /// Fetches `query`, serving a fresh cached page when available.
    pub async fn fetch_lists(&self, query: &ListQuery) -> SyncResult<Page<TodoList>> {
        self.cache.fetch_collection(query).await
    }

    /// Fetches one list, serving a fresh cached record when available.
    pub async fn fetch_list(&self, id: &str) -> SyncResult<TodoList> {
        self.cache.fetch_entity(id).await
    }

    /// Forces a refetch for `query`.
    pub async fn refresh_lists(&self, query: &ListQuery) -> SyncResult<Page<TodoList>> {
        self.cache.refresh_collection(query).await
    }

    /// Creates a list optimistically. Invalid input is rejected
    /// before any cache entry is touched.
    pub async fn create(&self, req: CreateListRequest) -> SyncResult<TodoList> {
        validate_new_list(&req).map_err(validation_error)?;
        self.cache.create(req).await
    }

    /// Updates a list optimistically.
    pub async fn update(&self, id: &str, patch: UpdateListRequest) -> SyncResult<TodoList> {
        validate_list_patch(&patch).map_err(validation_error)?;
        self.cache.update(id, patch).await
    }

    /// Deletes a list optimistically.
    pub async fn remove(&self, id: &str) -> SyncResult<()> {
        self.cache.remove(id).await
    }

    /// Marks cached entries in `scope` stale.
    pub async fn invalidate(&self, scope: Scope) {
        self.cache.invalidate(scope).await;
    }

    /// Drops entries idle for longer than `max_age`.
    pub async fn evict_idle(&self, max_age: Duration) {
        self.cache.evict_idle(max_age).await;
    }
}
