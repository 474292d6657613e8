//! Synchronized stores over the track API.
//!
//! A store pairs an [`track_core::sync::EntityCache`] with the API
//! endpoints for its entity type and adds the domain rules the cache
//! itself does not know: input validation before optimistic writes
//! and cross-entity invalidation.

pub mod lists;
pub mod tasks;

pub use lists::ListStore;
pub use tasks::TaskStore;

use crate::client::TrackClient;

/// Composition root: one store per entity type, sharing a client.
///
/// Cheap to clone; clones share cache state.
#[derive(Clone)]
pub struct Stores {
    pub lists: ListStore,
    pub tasks: TaskStore,
}

impl Stores {
    pub fn new(client: TrackClient) -> Self {
        let lists = ListStore::new(client.clone());
        let tasks = TaskStore::new(client, lists.cache().clone());
        Self { lists, tasks }
    }
}
