//! Invalidating cache with per-key request coalescing.
//!
//! A [`CachedResource`] owns a map of entries and fetches lazily through a
//! [`ResourceLoader`]. Staleness is explicit: an entry marked outdated stays
//! readable through [`CachedResource::get`] but the next
//! [`CachedResource::load`] re-fetches it.
//!
//! # Coalescing
//!
//! Every fetch is a shared future registered per key. A `load` that finds a
//! fetch already running for its key awaits that future instead of starting
//! another one, so all waiters see the same value or the same error. A fetch
//! whose key was marked outdated while it ran is not joined: the load waits
//! for it to settle and then fetches again.
//!
//! # Late results
//!
//! A fetch remembers an id. When it completes, a key is written only if the
//! key is still registered to that id; `delete`, `set` and forced refreshes
//! unregister it, so their effect is never overwritten by an older fetch.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use futures_util::future::{join_all, try_join_all, BoxFuture, FutureExt, Shared};
use tokio::sync::broadcast;
use treenav_core::{FetchError, NavError, NavResult};

use crate::traits::{ResourceEvent, ResourceKey, ResourceLoader};

type FetchOutput<K, V> = NavResult<Arc<HashMap<K, V>>>;
type SharedFetch<K, V> = Shared<BoxFuture<'static, FetchOutput<K, V>>>;
type Listener<K> = Arc<dyn Fn(&ResourceEvent<K>) + Send + Sync>;

/// Cached value plus its staleness bit.
#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    outdated: bool,
    loaded_at: DateTime<Utc>,
    /// Bumped on every write to the entry.
    revision: u64,
}

struct Inflight<K, V> {
    fetch_id: u64,
    fetch: SharedFetch<K, V>,
    /// Set when the key was marked outdated while this fetch was running.
    outdated: bool,
}

struct State<K, V> {
    entries: HashMap<K, Entry<V>>,
    inflight: HashMap<K, Inflight<K, V>>,
    next_fetch_id: u64,
    next_revision: u64,
}

impl<K, V> State<K, V> {
    fn bump_revision(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }
}

struct Inner<K, V> {
    name: &'static str,
    loader: Arc<dyn ResourceLoader<K, V>>,
    state: Mutex<State<K, V>>,
    events: broadcast::Sender<ResourceEvent<K>>,
    listeners: Mutex<Vec<Listener<K>>>,
}

impl<K, V> Inner<K, V>
where
    K: ResourceKey,
    V: Clone + Send + Sync + 'static,
{
    // Entries are replaced whole; a panic elsewhere cannot leave one torn.
    fn state(&self) -> MutexGuard<'_, State<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ResourceEvent<K>) {
        let listeners: Vec<Listener<K>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in &listeners {
            listener(&event);
        }
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Store the outcome of fetch `fetch_id` for every key still bound to it.
    fn commit(
        &self,
        fetch_id: u64,
        keys: &[K],
        result: NavResult<Vec<(K, V)>>,
    ) -> FetchOutput<K, V> {
        match result {
            Ok(pairs) => {
                let values: HashMap<K, V> = pairs.into_iter().collect();
                let mut stored = Vec::new();
                {
                    let mut state = self.state();
                    let now = Utc::now();
                    for key in keys {
                        let outdated = match state.inflight.get(key) {
                            Some(inflight) if inflight.fetch_id == fetch_id => inflight.outdated,
                            _ => continue,
                        };
                        state.inflight.remove(key);
                        if let Some(value) = values.get(key) {
                            let revision = state.bump_revision();
                            state.entries.insert(
                                key.clone(),
                                Entry {
                                    value: value.clone(),
                                    outdated,
                                    loaded_at: now,
                                    revision,
                                },
                            );
                            stored.push(key.clone());
                        }
                    }
                }
                tracing::debug!(resource = self.name, fetch_id, stored = stored.len(), "fetch committed");
                if !stored.is_empty() {
                    self.emit(ResourceEvent::Updated(stored));
                }
                Ok(Arc::new(values))
            }
            Err(error) => {
                let mut state = self.state();
                for key in keys {
                    if state
                        .inflight
                        .get(key)
                        .is_some_and(|inflight| inflight.fetch_id == fetch_id)
                    {
                        state.inflight.remove(key);
                    }
                }
                tracing::warn!(resource = self.name, fetch_id, error = %error, "fetch failed");
                Err(error)
            }
        }
    }
}

/// Generic async cache keyed by value.
///
/// Cloning yields another handle to the same cache.
pub struct CachedResource<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for CachedResource<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> fmt::Debug for CachedResource<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedResource")
            .field("name", &self.inner.name)
            .finish()
    }
}

impl<K, V> CachedResource<K, V>
where
    K: ResourceKey,
    V: Clone + Send + Sync + 'static,
{
    /// Create a resource.
    ///
    /// `event_capacity` bounds the change channel; slow subscribers see
    /// `RecvError::Lagged` rather than blocking the cache.
    pub fn new(
        name: &'static str,
        loader: Arc<dyn ResourceLoader<K, V>>,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                name,
                loader,
                state: Mutex::new(State {
                    entries: HashMap::new(),
                    inflight: HashMap::new(),
                    next_fetch_id: 0,
                    next_revision: 0,
                }),
                events,
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Cached value, fresh or outdated. Never fetches.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner
            .state()
            .entries
            .get(key)
            .map(|entry| entry.value.clone())
    }

    pub fn is_loaded(&self, key: &K) -> bool {
        self.inner.state().entries.contains_key(key)
    }

    pub fn is_outdated(&self, key: &K) -> bool {
        self.inner
            .state()
            .entries
            .get(key)
            .is_some_and(|entry| entry.outdated)
    }

    pub fn is_loading(&self, key: &K) -> bool {
        self.inner.state().inflight.contains_key(key)
    }

    /// When the cached value for `key` was stored.
    pub fn loaded_at(&self, key: &K) -> Option<DateTime<Utc>> {
        self.inner
            .state()
            .entries
            .get(key)
            .map(|entry| entry.loaded_at)
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.state().entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state().entries.is_empty()
    }

    // ========================================================================
    // LOADING
    // ========================================================================

    /// Fresh value for `key`, fetching if absent or outdated.
    pub async fn load(&self, key: &K) -> NavResult<V> {
        let mut values = self.load_many(std::slice::from_ref(key)).await?;
        values.pop().ok_or_else(|| missing(key))
    }

    /// Fresh values for `keys`, in input order. Every key that needs a fetch
    /// and is not already being fetched goes into one loader call.
    pub async fn load_many(&self, keys: &[K]) -> NavResult<Vec<V>> {
        self.load_inner(keys, false).await
    }

    /// Fetch `key` again regardless of its state. A fetch already running for
    /// it is superseded: its result still reaches its own callers but is not
    /// stored.
    pub async fn refresh(&self, key: &K) -> NavResult<V> {
        let mut values = self.refresh_many(std::slice::from_ref(key)).await?;
        values.pop().ok_or_else(|| missing(key))
    }

    pub async fn refresh_many(&self, keys: &[K]) -> NavResult<Vec<V>> {
        self.load_inner(keys, true).await
    }

    async fn load_inner(&self, keys: &[K], force: bool) -> NavResult<Vec<V>> {
        loop {
            let mut ready: HashMap<K, V> = HashMap::new();
            let mut waits: Vec<(u64, SharedFetch<K, V>)> = Vec::new();
            // Fetches invalidated while running: awaited, then fetched again.
            let mut stale: Vec<(u64, SharedFetch<K, V>)> = Vec::new();
            let mut to_fetch: Vec<K> = Vec::new();

            {
                let mut state = self.inner.state();

                for key in keys {
                    if ready.contains_key(key) || to_fetch.contains(key) {
                        continue;
                    }
                    if !force {
                        if let Some(entry) = state.entries.get(key) {
                            if !entry.outdated {
                                ready.insert(key.clone(), entry.value.clone());
                                continue;
                            }
                        }
                        if let Some(inflight) = state.inflight.get(key) {
                            let bucket = if inflight.outdated { &mut stale } else { &mut waits };
                            if !bucket.iter().any(|(id, _)| *id == inflight.fetch_id) {
                                bucket.push((inflight.fetch_id, inflight.fetch.clone()));
                            }
                            continue;
                        }
                    }
                    to_fetch.push(key.clone());
                }

                if stale.is_empty() && !to_fetch.is_empty() {
                    state.next_fetch_id += 1;
                    let fetch_id = state.next_fetch_id;
                    let fetch = self.fetch(fetch_id, to_fetch.clone());
                    for key in &to_fetch {
                        state.inflight.insert(
                            key.clone(),
                            Inflight {
                                fetch_id,
                                fetch: fetch.clone(),
                                outdated: false,
                            },
                        );
                    }
                    waits.push((fetch_id, fetch));
                }
            }

            if !stale.is_empty() {
                tracing::trace!(resource = self.inner.name, stale = stale.len(), "waiting out invalidated fetches");
                // Their outcome is superseded by the next pass.
                join_all(stale.into_iter().map(|(_, fetch)| fetch)).await;
                continue;
            }

            let fetched = try_join_all(waits.into_iter().map(|(_, fetch)| fetch)).await?;

            return keys
                .iter()
                .map(|key| {
                    ready
                        .get(key)
                        .cloned()
                        .or_else(|| fetched.iter().find_map(|values| values.get(key).cloned()))
                        .ok_or_else(|| missing(key))
                })
                .collect();
        }
    }

    fn fetch(&self, fetch_id: u64, keys: Vec<K>) -> SharedFetch<K, V> {
        let loader = Arc::clone(&self.inner.loader);
        let inner: Weak<Inner<K, V>> = Arc::downgrade(&self.inner);
        let name = self.inner.name;

        async move {
            tracing::debug!(resource = name, fetch_id, keys = ?keys, "fetch started");
            let result = loader.load(&keys).await;
            match inner.upgrade() {
                Some(inner) => inner.commit(fetch_id, &keys, result),
                None => result.map(|pairs| Arc::new(pairs.into_iter().collect())),
            }
        }
        .boxed()
        .shared()
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Store a value obtained elsewhere. Supersedes a running fetch.
    pub fn set(&self, key: K, value: V) {
        {
            let mut state = self.inner.state();
            state.inflight.remove(&key);
            let revision = state.bump_revision();
            state.entries.insert(
                key.clone(),
                Entry {
                    value,
                    outdated: false,
                    loaded_at: Utc::now(),
                    revision,
                },
            );
        }
        self.inner.emit(ResourceEvent::Updated(vec![key]));
    }

    /// Edit a cached value. Returns false when nothing is cached.
    ///
    /// `edit` runs on a copy outside the cache lock, so it may call back into
    /// this resource. The copy replaces the entry only if the entry was not
    /// replaced or deleted meanwhile.
    pub fn update<F>(&self, key: &K, edit: F) -> bool
    where
        F: FnOnce(&mut V),
    {
        let Some(original) = self.inner.state().entries.get(key).cloned() else {
            return false;
        };
        let mut value = original.value;
        edit(&mut value);

        let updated = {
            let mut state = self.inner.state();
            let revision = state.bump_revision();
            match state.entries.get_mut(key) {
                Some(entry) if entry.revision == original.revision => {
                    entry.value = value;
                    entry.revision = revision;
                    true
                }
                _ => false,
            }
        };
        if updated {
            self.inner.emit(ResourceEvent::Updated(vec![key.clone()]));
        }
        updated
    }

    pub fn mark_outdated(&self, key: &K) {
        self.mark_outdated_many(std::slice::from_ref(key));
    }

    /// Flag entries stale without fetching. Only keys whose state changed are
    /// reported in the resulting event.
    pub fn mark_outdated_many(&self, keys: &[K]) {
        let mut marked = Vec::new();
        {
            let mut state = self.inner.state();
            for key in keys {
                let mut changed = false;
                if let Some(entry) = state.entries.get_mut(key) {
                    changed |= !entry.outdated;
                    entry.outdated = true;
                }
                if let Some(inflight) = state.inflight.get_mut(key) {
                    changed |= !inflight.outdated;
                    inflight.outdated = true;
                }
                if changed && !marked.contains(key) {
                    marked.push(key.clone());
                }
            }
        }
        if !marked.is_empty() {
            tracing::trace!(resource = self.inner.name, count = marked.len(), "marked outdated");
            self.inner.emit(ResourceEvent::Outdated(marked));
        }
    }

    pub fn mark_all_outdated(&self) {
        let keys = self.keys();
        self.mark_outdated_many(&keys);
    }

    pub fn delete(&self, key: &K) {
        self.delete_many(std::slice::from_ref(key));
    }

    /// Drop entries. Fetches running for them finish but are not stored.
    pub fn delete_many(&self, keys: &[K]) {
        let mut deleted = Vec::new();
        {
            let mut state = self.inner.state();
            for key in keys {
                let had_entry = state.entries.remove(key).is_some();
                let had_fetch = state.inflight.remove(key).is_some();
                if (had_entry || had_fetch) && !deleted.contains(key) {
                    deleted.push(key.clone());
                }
            }
        }
        if !deleted.is_empty() {
            self.inner.emit(ResourceEvent::Deleted(deleted));
        }
    }

    // ========================================================================
    // NOTIFICATIONS
    // ========================================================================

    /// Stream of change events.
    pub fn subscribe(&self) -> broadcast::Receiver<ResourceEvent<K>> {
        self.inner.events.subscribe()
    }

    /// Register a listener run synchronously after every change, outside the
    /// cache lock. Listeners may call back into the resource.
    pub fn on_change<F>(&self, listener: F)
    where
        F: Fn(&ResourceEvent<K>) + Send + Sync + 'static,
    {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    /// Follow changes of `other`.
    ///
    /// `on_update` runs when `other` stores or deletes values and
    /// `on_invalidate` when it marks entries outdated. Neither invalidates
    /// this resource by itself; the callbacks decide. The link holds this
    /// resource weakly.
    pub fn sync<K2, V2, U, I>(&self, other: &CachedResource<K2, V2>, on_update: U, on_invalidate: I)
    where
        K2: ResourceKey,
        V2: Clone + Send + Sync + 'static,
        U: Fn(&CachedResource<K, V>, &[K2]) + Send + Sync + 'static,
        I: Fn(&CachedResource<K, V>, &[K2]) + Send + Sync + 'static,
    {
        let this = Arc::downgrade(&self.inner);
        other.on_change(move |event| {
            let Some(inner) = this.upgrade() else {
                return;
            };
            let resource = CachedResource { inner };
            match event {
                ResourceEvent::Outdated(keys) => on_invalidate(&resource, keys.as_slice()),
                ResourceEvent::Updated(keys) | ResourceEvent::Deleted(keys) => {
                    on_update(&resource, keys.as_slice())
                }
            }
        });
    }
}

fn missing<K: fmt::Debug>(key: &K) -> NavError {
    NavError::Fetch(FetchError::MissingEntry {
        key: format!("{key:?}"),
    })
}
