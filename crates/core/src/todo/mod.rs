mod error;
mod operations;
mod requests;
mod sync;
mod types;

pub use error::{ListError, TaskError};
pub use operations::{
    validate_list_patch, validate_new_list, validate_new_task, validate_task_patch,
};
pub use requests::{
    CreateListRequest, CreateTaskRequest, ListQuery, TaskQuery, UpdateListRequest,
    UpdateTaskRequest,
};
pub use types::{Priority, Task, TaskStatus, TodoList};
