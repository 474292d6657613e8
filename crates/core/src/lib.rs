//! Core domain and client-side cache synchronization for the Track
//! task-tracking application.
//!
//! - [`todo`] holds the domain types (todo lists, tasks) together with
//!   their request, patch and query types.
//! - [`calendar`] derives month-grid views from cached tasks.
//! - [`sync`] is the generic entity cache: read-through fetching with
//!   de-duplication, optimistic mutations with rollback, and
//!   stale-while-revalidate reads.

pub mod calendar;
pub mod sync;
pub mod todo;
