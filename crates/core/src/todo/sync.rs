//! Cache wiring for the todo domain: how lists and tasks key their
//! collections, build provisional records, and absorb patches.

use chrono::Utc;

use super::requests::{
    CreateListRequest, CreateTaskRequest, ListQuery, TaskQuery, UpdateListRequest,
    UpdateTaskRequest,
};
use super::types::{Priority, Task, TaskStatus, TodoList};
use crate::sync::{CollectionQuery, SyncEntity};

impl CollectionQuery for ListQuery {
    /// Deterministic key for this query: only set filters appear, in
    /// a fixed order, so equal queries always share a cache entry.
    fn cache_key(&self) -> String {
        let mut key = String::from("lists");
        if let Some(search) = &self.search {
            key.push_str(&format!("|search={search}"));
        }
        if let Some(ordering) = &self.ordering {
            key.push_str(&format!("|ordering={ordering}"));
        }
        key
    }
}

impl CollectionQuery for TaskQuery {
    fn cache_key(&self) -> String {
        let mut key = String::from("tasks");
        if let Some(todo_list) = &self.todo_list {
            key.push_str(&format!("|list={todo_list}"));
        }
        if let Some(status) = &self.status {
            key.push_str(&format!("|status={}", status.as_str()));
        }
        if let Some(priority) = &self.priority {
            key.push_str(&format!("|priority={}", priority.as_str()));
        }
        if let Some(search) = &self.search {
            key.push_str(&format!("|search={search}"));
        }
        if let Some(ordering) = &self.ordering {
            key.push_str(&format!("|ordering={ordering}"));
        }
        if let Some(start_date) = &self.start_date {
            key.push_str(&format!("|start={}", start_date.format("%Y-%m-%d")));
        }
        if let Some(end_date) = &self.end_date {
            key.push_str(&format!("|end={}", end_date.format("%Y-%m-%d")));
        }
        if let Some(is_overdue) = self.is_overdue {
            key.push_str(&format!("|overdue={is_overdue}"));
        }
        key
    }
}

impl SyncEntity for TodoList {
    type Query = ListQuery;
    type Create = CreateListRequest;
    type Patch = UpdateListRequest;

    const KIND: &'static str = "list";

    fn id(&self) -> &str {
        &self.id
    }

    fn provisional(payload: &CreateListRequest, provisional_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: provisional_id,
            name: payload.name.clone(),
            description: payload.description.clone(),
            color: payload.color.clone().unwrap_or_else(|| "#3b82f6".to_string()),
            task_count: 0,
            completed_tasks: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply_patch(&mut self, patch: &UpdateListRequest) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(color) = &patch.color {
            self.color = color.clone();
        }
        self.updated_at = Utc::now();
    }
}

impl SyncEntity for Task {
    type Query = TaskQuery;
    type Create = CreateTaskRequest;
    type Patch = UpdateTaskRequest;

    const KIND: &'static str = "task";

    fn id(&self) -> &str {
        &self.id
    }

    fn provisional(payload: &CreateTaskRequest, provisional_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: provisional_id,
            todo_list: payload.todo_list.clone(),
            title: payload.title.clone(),
            description: payload.description.clone(),
            priority: payload.priority.unwrap_or(Priority::Medium),
            status: payload.status.unwrap_or(TaskStatus::Todo),
            start_date: payload.start_date,
            end_date: payload.end_date,
            is_overdue: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply_patch(&mut self, patch: &UpdateTaskRequest) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(start_date) = patch.start_date {
            self.start_date = Some(start_date);
        }
        if let Some(end_date) = patch.end_date {
            self.end_date = Some(end_date);
        }
        self.updated_at = Utc::now();
    }
}
