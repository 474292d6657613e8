//! Cache keys and invalidation scopes.
//!
//! Keys are tagged rather than stringly-typed: an entry is either a
//! single entity or a collection page, and the two can never collide.

use std::fmt;

/// Key for one cache entry of a given entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A single entity, keyed by its id.
    Entity(String),
    /// A collection page, keyed by the canonical query string.
    Collection(String),
}

impl CacheKey {
    /// Key for a single entity.
    pub fn entity(id: impl Into<String>) -> Self {
        CacheKey::Entity(id.into())
    }

    /// Key for a collection page.
    pub fn collection(query_key: impl Into<String>) -> Self {
        CacheKey::Collection(query_key.into())
    }

    /// Returns true for collection keys.
    pub fn is_collection(&self) -> bool {
        matches!(self, CacheKey::Collection(_))
    }

    /// Returns the entity id for entity keys.
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            CacheKey::Entity(id) => Some(id),
            CacheKey::Collection(_) => None,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Entity(id) => write!(f, "single:{id}"),
            CacheKey::Collection(query) => write!(f, "collection:{query}"),
        }
    }
}

/// Which cache entries an invalidation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every entry of the entity type.
    All,
    /// Every collection entry of the entity type.
    Collections,
    /// The single entry for one entity id.
    Entity(String),
}

impl Scope {
    /// Returns true if `key` falls inside this scope.
    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            Scope::All => true,
            Scope::Collections => key.is_collection(),
            Scope::Entity(id) => key.entity_id() == Some(id.as_str()),
        }
    }
}
