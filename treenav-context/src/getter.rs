//! Typed context tokens.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GETTER_ID: AtomicU64 = AtomicU64::new(1);

/// Key for one logical slot in a [`crate::DataContext`].
///
/// Each call to [`DataContextGetter::new`] yields a distinct slot, even for
/// equal names; tokens compare by identity. The value type travels with the
/// token, so lookups through it are typed.
pub struct DataContextGetter<T> {
    id: u64,
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> DataContextGetter<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            id: NEXT_GETTER_ID.fetch_add(1, Ordering::Relaxed),
            name,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for DataContextGetter<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DataContextGetter<T> {}

impl<T> PartialEq for DataContextGetter<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for DataContextGetter<T> {}

impl<T> Hash for DataContextGetter<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for DataContextGetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataContextGetter")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}
