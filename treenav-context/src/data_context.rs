//! Layered, versioned data context.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use treenav_core::{ContextError, NavError, NavResult};

use crate::DataContextGetter;

type ContextValue = Arc<dyn Any + Send + Sync>;

struct Versioned {
    version: u64,
    value: ContextValue,
}

#[derive(Default)]
struct LayerState {
    /// token id -> versions, oldest first. The last entry is the live value.
    slots: HashMap<u64, Vec<Versioned>>,
    next_version: u64,
}

struct Layer {
    fallback: Option<DataContext>,
    state: Mutex<LayerState>,
}

/// Typed key/value registry with a fallback chain.
///
/// Each `set` pushes a new version for the token on this layer and returns a
/// [`DeleteCallback`] that removes exactly that version, so undoing a set
/// brings back whatever was visible before it. Lookups that miss on this
/// layer continue into the fallback.
///
/// Cloning is cheap and yields a handle to the same layer.
#[derive(Clone)]
pub struct DataContext {
    layer: Arc<Layer>,
}

impl Default for DataContext {
    fn default() -> Self {
        Self::new()
    }
}

impl DataContext {
    /// Create a root context with no fallback.
    pub fn new() -> Self {
        Self {
            layer: Arc::new(Layer {
                fallback: None,
                state: Mutex::new(LayerState::default()),
            }),
        }
    }

    /// Create a context layered over `fallback`.
    pub fn with_fallback(fallback: &DataContext) -> Self {
        Self {
            layer: Arc::new(Layer {
                fallback: Some(fallback.clone()),
                state: Mutex::new(LayerState::default()),
            }),
        }
    }

    pub fn fallback(&self) -> Option<&DataContext> {
        self.layer.fallback.as_ref()
    }

    /// True when both handles point at the same layer.
    pub fn ptr_eq(&self, other: &DataContext) -> bool {
        Arc::ptr_eq(&self.layer, &other.layer)
    }

    // Slots hold plain values; a panic mid-update cannot leave them torn.
    fn state(&self) -> MutexGuard<'_, LayerState> {
        self.layer.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install `value` for `token` on this layer.
    ///
    /// If this layer's live value for the token is already equal to `value`
    /// nothing changes and the callback for the existing version is returned.
    pub fn set<T>(&self, token: &DataContextGetter<T>, value: T) -> DeleteCallback
    where
        T: PartialEq + Send + Sync + 'static,
    {
        let mut state = self.state();

        if let Some(live) = state.slots.get(&token.id()).and_then(|versions| versions.last()) {
            if live.value.downcast_ref::<T>() == Some(&value) {
                return DeleteCallback::new(&self.layer, token.id(), live.version);
            }
        }

        state.next_version += 1;
        let version = state.next_version;
        state.slots.entry(token.id()).or_default().push(Versioned {
            version,
            value: Arc::new(value),
        });

        DeleteCallback::new(&self.layer, token.id(), version)
    }

    /// Remove one version of `token` from this layer, or every version when
    /// `version` is `None`. The fallback is never touched.
    pub fn delete<T>(&self, token: &DataContextGetter<T>, version: Option<u64>) -> &Self {
        remove_version(&mut self.state(), token.id(), version);
        self
    }

    pub fn has_own<T>(&self, token: &DataContextGetter<T>) -> bool {
        self.state()
            .slots
            .get(&token.id())
            .is_some_and(|versions| !versions.is_empty())
    }

    pub fn has<T>(&self, token: &DataContextGetter<T>) -> bool {
        let mut layer = Some(self);
        while let Some(context) = layer {
            if context.has_own(token) {
                return true;
            }
            layer = context.fallback();
        }
        false
    }

    /// Live value on this layer only.
    pub fn get_own<T>(&self, token: &DataContextGetter<T>) -> Option<T>
    where
        T: Clone + 'static,
    {
        self.state()
            .slots
            .get(&token.id())
            .and_then(|versions| versions.last())
            .and_then(|live| live.value.downcast_ref::<T>().cloned())
    }

    /// Live value on the nearest layer that holds the token.
    pub fn try_get<T>(&self, token: &DataContextGetter<T>) -> Option<T>
    where
        T: Clone + 'static,
    {
        let mut layer = Some(self);
        while let Some(context) = layer {
            if let Some(value) = context.get_own(token) {
                return Some(value);
            }
            layer = context.fallback();
        }
        None
    }

    /// Like [`DataContext::try_get`] but a miss is a [`ContextError::NotFound`].
    pub fn get<T>(&self, token: &DataContextGetter<T>) -> NavResult<T>
    where
        T: Clone + 'static,
    {
        self.try_get(token).ok_or_else(|| {
            NavError::Context(ContextError::NotFound {
                context: token.name().to_string(),
            })
        })
    }

    /// Whether any version of `token` anywhere in the chain equals `value`.
    pub fn has_value<T>(&self, token: &DataContextGetter<T>, value: &T) -> bool
    where
        T: PartialEq + Clone + 'static,
    {
        self.find(token, |candidate| candidate == value).is_some()
    }

    /// First value for `token` satisfying `predicate`, scanning this layer
    /// newest-first and then the fallback chain.
    pub fn find<T, P>(&self, token: &DataContextGetter<T>, predicate: P) -> Option<T>
    where
        T: Clone + 'static,
        P: Fn(&T) -> bool,
    {
        let mut layer = Some(self);
        while let Some(context) = layer {
            let found = context.state().slots.get(&token.id()).and_then(|versions| {
                versions
                    .iter()
                    .rev()
                    .filter_map(|entry| entry.value.downcast_ref::<T>())
                    .find(|candidate| predicate(candidate))
                    .cloned()
            });
            if found.is_some() {
                return found;
            }
            layer = context.fallback();
        }
        None
    }
}

impl fmt::Debug for DataContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("DataContext")
            .field("slots", &state.slots.len())
            .field("has_fallback", &self.layer.fallback.is_some())
            .finish()
    }
}

fn remove_version(state: &mut LayerState, key: u64, version: Option<u64>) {
    let emptied = match state.slots.get_mut(&key) {
        Some(versions) => {
            match version {
                Some(version) => versions.retain(|entry| entry.version != version),
                None => versions.clear(),
            }
            versions.is_empty()
        }
        None => false,
    };
    if emptied {
        state.slots.remove(&key);
    }
}

// ============================================================================
// DELETE CALLBACK
// ============================================================================

/// Undo handle for one [`DataContext::set`].
///
/// Calling it more than once, or after the context is gone, is a no-op.
#[derive(Clone)]
pub struct DeleteCallback {
    layer: Weak<Layer>,
    key: u64,
    version: u64,
}

impl DeleteCallback {
    fn new(layer: &Arc<Layer>, key: u64, version: u64) -> Self {
        Self {
            layer: Arc::downgrade(layer),
            key,
            version,
        }
    }

    /// A callback that undoes nothing.
    pub fn noop() -> Self {
        Self {
            layer: Weak::new(),
            key: 0,
            version: 0,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn call(&self) {
        if let Some(layer) = self.layer.upgrade() {
            let mut state = layer.state.lock().unwrap_or_else(PoisonError::into_inner);
            remove_version(&mut state, self.key, Some(self.version));
        }
    }
}

impl fmt::Debug for DeleteCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeleteCallback")
            .field("key", &self.key)
            .field("version", &self.version)
            .finish()
    }
}
