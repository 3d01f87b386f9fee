//! Loader trait and change events for cached resources.

use async_trait::async_trait;
use std::fmt::Debug;
use std::hash::Hash;
use treenav_core::NavResult;

/// Bounds every cache key must satisfy. Keys compare by value.
pub trait ResourceKey: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> ResourceKey for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// Source of values for a [`crate::CachedResource`].
///
/// A single call receives every key that needs fetching, so loaders backed
/// by a batch endpoint can serve them in one request. Keys missing from the
/// returned pairs are reported to the caller as
/// [`treenav_core::FetchError::MissingEntry`].
#[async_trait]
pub trait ResourceLoader<K, V>: Send + Sync + 'static {
    async fn load(&self, keys: &[K]) -> NavResult<Vec<(K, V)>>;
}

/// Change notification emitted by a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent<K> {
    /// Values were stored (fetched, set or edited in place).
    Updated(Vec<K>),
    /// Entries were marked stale.
    Outdated(Vec<K>),
    /// Entries were removed.
    Deleted(Vec<K>),
}

impl<K> ResourceEvent<K> {
    pub fn keys(&self) -> &[K] {
        match self {
            ResourceEvent::Updated(keys)
            | ResourceEvent::Outdated(keys)
            | ResourceEvent::Deleted(keys) => keys,
        }
    }

    pub fn is_invalidation(&self) -> bool {
        matches!(self, ResourceEvent::Outdated(_))
    }
}
