//! Todo list API operations.

use track_core::sync::Page;
use track_core::todo::{CreateListRequest, ListQuery, TodoList, UpdateListRequest};

use super::TrackClient;
use crate::error::Result;

impl TrackClient {
    /// List todo lists with filters.
    pub async fn list_lists(&self, query: &ListQuery) -> Result<Page<TodoList>> {
        let response = self
            .send(self.client.get(self.url("/api/todolists/")).query(query))
            .await?;
        self.parse_response(response, "todo list").await
    }

    /// Get a todo list by id.
    pub async fn get_list(&self, id: &str) -> Result<TodoList> {
        let response = self
            .send(self.client.get(self.url(&format!("/api/todolists/{id}/"))))
            .await?;
        self.parse_response(response, "todo list").await
    }

    /// Create a new todo list.
    pub async fn create_list(&self, req: &CreateListRequest) -> Result<TodoList> {
        let response = self
            .send(self.client.post(self.url("/api/todolists/")).json(req))
            .await?;
        self.parse_response(response, "todo list").await
    }

    /// Partially update a todo list.
    pub async fn update_list(&self, id: &str, req: &UpdateListRequest) -> Result<TodoList> {
        let response = self
            .send(
                self.client
                    .patch(self.url(&format!("/api/todolists/{id}/")))
                    .json(req),
            )
            .await?;
        self.parse_response(response, "todo list").await
    }

    /// Delete a todo list and all of its tasks.
    pub async fn delete_list(&self, id: &str) -> Result<()> {
        let response = self
            .send(
                self.client
                    .delete(self.url(&format!("/api/todolists/{id}/"))),
            )
            .await?;
        self.parse_empty_response(response, "todo list").await
    }
}
