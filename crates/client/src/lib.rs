//! track_client - HTTP client and synchronized stores for the track API.

pub mod auth;
pub mod client;
pub mod error;
pub mod store;

pub use auth::{AuthTokens, TokenStore};
pub use client::TrackClient;
pub use error::{ClientError, Result};
pub use store::{ListStore, Stores, TaskStore};
