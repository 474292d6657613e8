//! Synchronized store for tasks.
//!
//! Task mutations change the owning list's task counts, so every
//! settled task write also invalidates the cached list collections.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use track_core::sync::{
    CacheRead, EntityCache, EntitySource, Page, Result as SyncResult, Scope, SyncError,
};
use track_core::todo::{
    validate_new_task, validate_task_patch, CreateTaskRequest, Task, TaskError, TaskQuery,
    TaskStatus, TodoList, UpdateTaskRequest,
};

use crate::client::TrackClient;

/// Remote source backed by the task endpoints.
struct TaskApi {
    client: TrackClient,
}

#[async_trait]
impl EntitySource<Task> for TaskApi {
    async fn fetch_page(&self, query: &TaskQuery) -> SyncResult<Page<Task>> {
        self.client.list_tasks(query).await.map_err(SyncError::from)
    }

    async fn fetch_one(&self, id: &str) -> SyncResult<Task> {
        self.client.get_task(id).await.map_err(SyncError::from)
    }

    async fn create(&self, payload: &CreateTaskRequest) -> SyncResult<Task> {
        self.client.create_task(payload).await.map_err(SyncError::from)
    }

    async fn update(&self, id: &str, patch: &UpdateTaskRequest) -> SyncResult<Task> {
        self.client
            .update_task(id, patch)
            .await
            .map_err(SyncError::from)
    }

    async fn delete(&self, id: &str) -> SyncResult<()> {
        self.client.delete_task(id).await.map_err(SyncError::from)
    }
}

fn validation_error(err: TaskError) -> SyncError {
    let field = match err {
        TaskError::EmptyTitle | TaskError::TitleTooLong => "title",
        TaskError::MissingList => "todo_list",
        TaskError::InvalidDateRange => "end_date",
    };
    SyncError::validation(field, err.to_string())
}

/// Cached tasks, synchronized against the API.
#[derive(Clone)]
pub struct TaskStore {
    cache: EntityCache<Task>,
    lists: EntityCache<TodoList>,
    client: Option<TrackClient>,
}

impl TaskStore {
    pub fn new(client: TrackClient, lists: EntityCache<TodoList>) -> Self {
        let api = TaskApi {
            client: client.clone(),
        };
        Self {
            cache: EntityCache::new(Arc::new(api)),
            lists,
            client: Some(client),
        }
    }

    /// Builds a store over any source. Tests inject mocks here; bulk
    /// operations are unavailable without a client.
    pub fn with_source(source: Arc<dyn EntitySource<Task>>, lists: EntityCache<TodoList>) -> Self {
        Self {
            cache: EntityCache::new(source),
            lists,
            client: None,
        }
    }

    /// Current cached state for `query`, revalidating in the
    /// background when stale.
    pub async fn tasks(&self, query: &TaskQuery) -> CacheRead<Page<Task>> {
        self.cache.observe_collection(query).await
    }

    /// Current cached state for one task.
    pub async fn task(&self, id: &str) -> CacheRead<Task> {
        self.cache.observe_entity(id).await
    }

    /// Fetches `query`, serving a fresh cached page when available.
    pub async fn fetch_tasks(&self, query: &TaskQuery) -> SyncResult<Page<Task>> {
        self.cache.fetch_collection(query).await
    }

    /// Fetches one task, serving a fresh cached record when available.
    pub async fn fetch_task(&self, id: &str) -> SyncResult<Task> {
        self.cache.fetch_entity(id).await
    }

    /// Forces a refetch for `query`.
    pub async fn refresh_tasks(&self, query: &TaskQuery) -> SyncResult<Page<Task>> {
        self.cache.refresh_collection(query).await
    }

    /// Creates a task optimistically. Invalid input is rejected
    /// before any cache entry is touched.
    pub async fn create(&self, req: CreateTaskRequest) -> SyncResult<Task> {
        validate_new_task(&req).map_err(validation_error)?;
        let task = self.cache.create(req).await?;
        self.invalidate_lists().await;
        Ok(task)
    }

    /// Updates a task optimistically.
    pub async fn update(&self, id: &str, patch: UpdateTaskRequest) -> SyncResult<Task> {
        validate_task_patch(&patch).map_err(validation_error)?;
        let task = self.cache.update(id, patch).await?;
        self.invalidate_lists().await;
        Ok(task)
    }

    /// Deletes a task optimistically.
    pub async fn remove(&self, id: &str) -> SyncResult<()> {
        self.cache.remove(id).await?;
        self.invalidate_lists().await;
        Ok(())
    }

    /// Sets the status of many tasks in one request, returning the
    /// affected count. Applied pessimistically: the cache is only
    /// invalidated after the server confirms, since partial failure
    /// cannot be rolled back row by row.
    pub async fn bulk_update_status(
        &self,
        task_ids: &[String],
        status: TaskStatus,
    ) -> SyncResult<u64> {
        let client = self.bulk_client()?;
        let updated = client
            .bulk_update_status(task_ids, status)
            .await
            .map_err(SyncError::from)?;
        debug!(updated, status = status.as_str(), "bulk status update");
        self.cache.invalidate(Scope::All).await;
        self.invalidate_lists().await;
        Ok(updated)
    }

    /// Deletes many tasks in one request, returning the affected
    /// count. Pessimistic, like
    /// [`bulk_update_status`](Self::bulk_update_status).
    pub async fn bulk_delete(&self, task_ids: &[String]) -> SyncResult<u64> {
        let client = self.bulk_client()?;
        let deleted = client.bulk_delete(task_ids).await.map_err(SyncError::from)?;
        debug!(deleted, "bulk delete");
        self.cache.invalidate(Scope::All).await;
        self.invalidate_lists().await;
        Ok(deleted)
    }

    /// Marks cached entries in `scope` stale.
    pub async fn invalidate(&self, scope: Scope) {
        self.cache.invalidate(scope).await;
    }

    /// Drops entries idle for longer than `max_age`.
    pub async fn evict_idle(&self, max_age: Duration) {
        self.cache.evict_idle(max_age).await;
    }

    /// Task counts live on the lists (collections and single entries
    /// both), so settled task writes stale every cached list.
    async fn invalidate_lists(&self) {
        self.lists.invalidate(Scope::All).await;
    }

    fn bulk_client(&self) -> SyncResult<&TrackClient> {
        self.client
            .as_ref()
            .ok_or_else(|| SyncError::Network("no API client configured".to_string()))
    }
}
