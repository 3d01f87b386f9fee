//! Overlay that records its sets so they can be torn down together.

use std::sync::{Mutex, MutexGuard, PoisonError};

use treenav_core::NavResult;

use crate::{DataContext, DataContextGetter, DeleteCallback};

/// Writes through to a fallback [`DataContext`] while remembering every set.
///
/// [`DynamicDataContext::clear`] undoes all recorded sets, newest first, so
/// the fallback ends up exactly as it was before the overlay touched it.
/// Re-pointing the fallback clears first, and so does dropping the overlay.
pub struct DynamicDataContext {
    fallback: Mutex<DataContext>,
    contexts: Mutex<Vec<(u64, DeleteCallback)>>,
}

impl DynamicDataContext {
    pub fn new(fallback: DataContext) -> Self {
        Self {
            fallback: Mutex::new(fallback),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn fallback(&self) -> DataContext {
        self.fallback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn contexts(&self) -> MutexGuard<'_, Vec<(u64, DeleteCallback)>> {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Point the overlay at another context. Values set through the overlay
    /// are removed from the old fallback first.
    pub fn set_fallback(&self, fallback: DataContext) {
        if self.fallback().ptr_eq(&fallback) {
            return;
        }
        self.clear();
        *self.fallback.lock().unwrap_or_else(PoisonError::into_inner) = fallback;
    }

    pub fn set<T>(&self, token: &DataContextGetter<T>, value: T) -> DeleteCallback
    where
        T: PartialEq + Clone + Send + Sync + 'static,
    {
        let fallback = self.fallback();

        if fallback.try_get(token).as_ref() == Some(&value) {
            return self
                .contexts()
                .iter()
                .rev()
                .find(|(key, _)| *key == token.id())
                .map(|(_, callback)| callback.clone())
                .unwrap_or_else(DeleteCallback::noop);
        }

        let callback = fallback.set(token, value);
        self.contexts().push((token.id(), callback.clone()));
        callback
    }

    /// Undo every set of `token` made through this overlay.
    pub fn delete<T>(&self, token: &DataContextGetter<T>) -> &Self {
        let removed: Vec<DeleteCallback> = {
            let mut contexts = self.contexts();
            let mut removed = Vec::new();
            contexts.retain(|(key, callback)| {
                if *key == token.id() {
                    removed.push(callback.clone());
                    false
                } else {
                    true
                }
            });
            removed
        };
        for callback in removed.iter().rev() {
            callback.call();
        }
        self
    }

    pub fn has_own<T>(&self, token: &DataContextGetter<T>) -> bool {
        self.fallback().has_own(token)
    }

    pub fn has<T>(&self, token: &DataContextGetter<T>) -> bool {
        self.fallback().has(token)
    }

    pub fn get<T: Clone + 'static>(&self, token: &DataContextGetter<T>) -> NavResult<T> {
        self.fallback().get(token)
    }

    pub fn get_own<T: Clone + 'static>(&self, token: &DataContextGetter<T>) -> Option<T> {
        self.fallback().get_own(token)
    }

    pub fn try_get<T: Clone + 'static>(&self, token: &DataContextGetter<T>) -> Option<T> {
        self.fallback().try_get(token)
    }

    pub fn has_value<T>(&self, token: &DataContextGetter<T>, value: &T) -> bool
    where
        T: PartialEq + Clone + 'static,
    {
        self.fallback().has_value(token, value)
    }

    pub fn find<T, P>(&self, token: &DataContextGetter<T>, predicate: P) -> Option<T>
    where
        T: Clone + 'static,
        P: Fn(&T) -> bool,
    {
        self.fallback().find(token, predicate)
    }

    /// Number of sets currently recorded.
    pub fn len(&self) -> usize {
        self.contexts().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts().is_empty()
    }

    /// Undo every recorded set exactly once.
    pub fn clear(&self) {
        let drained: Vec<(u64, DeleteCallback)> = self.contexts().drain(..).collect();
        if !drained.is_empty() {
            tracing::trace!(count = drained.len(), "clearing dynamic data context");
        }
        for (_, callback) in drained.into_iter().rev() {
            callback.call();
        }
    }
}

impl Drop for DynamicDataContext {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use proptest::prelude::*;
    use treenav_core::{ContextError, NavError};

    static ACTIVE_TAB: Lazy<DataContextGetter<String>> =
        Lazy::new(|| DataContextGetter::new("active-tab"));

    #[test]
    fn test_clear_restores_fallback_value() {
        let base = DataContext::new();
        base.set(&ACTIVE_TAB, "tab-1".to_string());

        let overlay = DynamicDataContext::new(base.clone());
        overlay.set(&ACTIVE_TAB, "tab-2".to_string());
        assert_eq!(base.get(&ACTIVE_TAB).unwrap(), "tab-2");

        overlay.clear();
        assert_eq!(base.get(&ACTIVE_TAB).unwrap(), "tab-1");
        assert!(overlay.is_empty());
    }

    #[test]
    fn test_clear_restores_absence() {
        let token = DataContextGetter::<u32>::new("counter");
        let base = DataContext::new();
        let overlay = DynamicDataContext::new(base.clone());
        overlay.set(&token, 1);
        overlay.set(&token, 2);
        assert_eq!(overlay.len(), 2);

        overlay.clear();
        assert_eq!(
            base.get(&token),
            Err(NavError::Context(ContextError::NotFound {
                context: "counter".to_string()
            }))
        );
    }

    #[test]
    fn test_identical_set_returns_existing_callback() {
        let token = DataContextGetter::<u32>::new("n");
        let base = DataContext::new();
        let overlay = DynamicDataContext::new(base.clone());
        let first = overlay.set(&token, 4);
        let second = overlay.set(&token, 4);
        assert_eq!(first.version(), second.version());
        assert_eq!(overlay.len(), 1);

        // value already held by the fallback itself: nothing recorded
        let other = DataContextGetter::<u32>::new("m");
        base.set(&other, 9);
        overlay.set(&other, 9);
        assert_eq!(overlay.len(), 1);
    }

    #[test]
    fn test_set_fallback_clears_previous() {
        let token = DataContextGetter::<u32>::new("n");
        let first = DataContext::new();
        let second = DataContext::new();
        let overlay = DynamicDataContext::new(first.clone());
        overlay.set(&token, 1);

        overlay.set_fallback(second.clone());
        assert!(!first.has(&token));
        assert!(!second.has(&token));

        overlay.set(&token, 2);
        assert_eq!(second.get(&token).unwrap(), 2);

        // same fallback: no clear
        overlay.set_fallback(second.clone());
        assert_eq!(second.get(&token).unwrap(), 2);
    }

    #[test]
    fn test_drop_clears() {
        let token = DataContextGetter::<u32>::new("n");
        let base = DataContext::new();
        {
            let overlay = DynamicDataContext::new(base.clone());
            overlay.set(&token, 3);
            assert!(base.has(&token));
        }
        assert!(!base.has(&token));
    }

    #[test]
    fn test_delete_only_touches_overlay_sets() {
        let token = DataContextGetter::<u32>::new("n");
        let base = DataContext::new();
        base.set(&token, 1);
        let overlay = DynamicDataContext::new(base.clone());
        overlay.set(&token, 2);
        overlay.set(&token, 3);

        overlay.delete(&token);
        assert_eq!(base.get(&token).unwrap(), 1);
        assert!(overlay.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Any sequence of overlay sets is fully undone by clear.
        #[test]
        fn prop_clear_restores_prior_state(
            prior in proptest::option::of(any::<u16>()),
            writes in proptest::collection::vec(any::<u16>(), 0..12)
        ) {
            let token = DataContextGetter::<u16>::new("value");
            let base = DataContext::new();
            if let Some(value) = prior {
                base.set(&token, value);
            }

            let overlay = DynamicDataContext::new(base.clone());
            for value in &writes {
                overlay.set(&token, *value);
            }
            overlay.clear();

            prop_assert_eq!(base.try_get(&token), prior);
        }
    }
}
