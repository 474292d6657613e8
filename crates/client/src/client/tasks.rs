//! Task API operations.

use serde::{Deserialize, Serialize};
use track_core::sync::Page;
use track_core::todo::{CreateTaskRequest, Task, TaskQuery, TaskStatus, UpdateTaskRequest};

use super::TrackClient;
use crate::error::Result;

#[derive(Debug, Serialize)]
struct BulkStatusRequest<'a> {
    task_ids: &'a [String],
    status: TaskStatus,
}

#[derive(Debug, Serialize)]
struct BulkDeleteRequest<'a> {
    task_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
struct BulkStatusResponse {
    updated_count: u64,
}

#[derive(Debug, Deserialize)]
struct BulkDeleteResponse {
    deleted_count: u64,
}

impl TrackClient {
    /// List tasks with filters.
    pub async fn list_tasks(&self, query: &TaskQuery) -> Result<Page<Task>> {
        let response = self
            .send(self.client.get(self.url("/api/tasks/")).query(query))
            .await?;
        self.parse_response(response, "task").await
    }

    /// Get a task by id.
    pub async fn get_task(&self, id: &str) -> Result<Task> {
        let response = self
            .send(self.client.get(self.url(&format!("/api/tasks/{id}/"))))
            .await?;
        self.parse_response(response, "task").await
    }

    /// Create a new task.
    pub async fn create_task(&self, req: &CreateTaskRequest) -> Result<Task> {
        let response = self
            .send(self.client.post(self.url("/api/tasks/")).json(req))
            .await?;
        self.parse_response(response, "task").await
    }

    /// Partially update a task.
    pub async fn update_task(&self, id: &str, req: &UpdateTaskRequest) -> Result<Task> {
        let response = self
            .send(
                self.client
                    .patch(self.url(&format!("/api/tasks/{id}/")))
                    .json(req),
            )
            .await?;
        self.parse_response(response, "task").await
    }

    /// Delete a task by id.
    pub async fn delete_task(&self, id: &str) -> Result<()> {
        let response = self
            .send(self.client.delete(self.url(&format!("/api/tasks/{id}/"))))
            .await?;
        self.parse_empty_response(response, "task").await
    }

    /// Set the status of many tasks in one request. Returns how many
    /// rows the server changed.
    pub async fn bulk_update_status(&self, task_ids: &[String], status: TaskStatus) -> Result<u64> {
        let response = self
            .send(
                self.client
                    .post(self.url("/api/tasks/bulk-update-status/"))
                    .json(&BulkStatusRequest { task_ids, status }),
            )
            .await?;
        let body: BulkStatusResponse = self.parse_response(response, "task").await?;
        Ok(body.updated_count)
    }

    /// Delete many tasks in one request. Returns how many rows the
    /// server deleted.
    pub async fn bulk_delete(&self, task_ids: &[String]) -> Result<u64> {
        let response = self
            .send(
                self.client
                    .post(self.url("/api/tasks/bulk-delete/"))
                    .json(&BulkDeleteRequest { task_ids }),
            )
            .await?;
        let body: BulkDeleteResponse = self.parse_response(response, "task").await?;
        Ok(body.deleted_count)
    }
}
