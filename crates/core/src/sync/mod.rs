//! Entity cache synchronization.
//!
//! [`EntityCache`] keeps a client-side map of paginated collection
//! results and single records for one entity type, synchronized
//! against a remote [`EntitySource`]. It deduplicates concurrent
//! fetches, applies mutations optimistically with snapshot rollback,
//! and serves stale values while revalidating in the background.

mod engine;
mod entry;
mod error;
mod keys;
mod traits;

pub use engine::EntityCache;
pub use entry::{CacheConfig, CacheRead, Page};
pub use error::{FieldErrors, Result, SyncError};
pub use keys::{CacheKey, Scope};
pub use traits::{CollectionQuery, EntitySource, SyncEntity};
