//! Ordered handler pipeline with per-key coalescing.
//!
//! A [`Navigator`] runs every registered [`NavigationHandler`] in order over
//! a fresh [`ContextProvider`]. Navigations whose extracted key matches one
//! already running join it and observe the same outcome.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tracing::{info_span, Instrument};
use treenav_context::{DataContext, DataContextGetter};
use treenav_core::NavResult;

use crate::provider::{
    ContextContributor, ContextProvider, ContributorMap, ErasedContributor, NavigationOutcome,
    NavigationState, Registered,
};

type SharedNavigation = Shared<BoxFuture<'static, NavResult<NavigationOutcome>>>;
type KeyExtractor<D> = Box<dyn Fn(&D) -> String + Send + Sync>;

/// One step of a navigation.
///
/// Returning an error aborts the navigation and skips the remaining
/// handlers. Calling [`ContextProvider::interrupt`] ends it without error.
#[async_trait]
pub trait NavigationHandler<D>: Send + Sync {
    async fn handle(&self, contexts: &ContextProvider<D>) -> NavResult<()>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

struct NavigatorInner<D> {
    extract_key: KeyExtractor<D>,
    base: DataContext,
    handlers: RwLock<Vec<Arc<dyn NavigationHandler<D>>>>,
    contributors: RwLock<ContributorMap<D>>,
    /// Tokens resolved before the first handler runs, in registration order.
    required: RwLock<Vec<(u64, &'static str)>>,
    inflight: Mutex<HashMap<String, SharedNavigation>>,
}

impl<D> NavigatorInner<D> {
    fn inflight(&self) -> MutexGuard<'_, HashMap<String, SharedNavigation>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Navigation pipeline for requests of type `D`.
pub struct Navigator<D> {
    inner: Arc<NavigatorInner<D>>,
}

impl<D> Clone for Navigator<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D> fmt::Debug for Navigator<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Navigator")
            .field(
                "handlers",
                &self
                    .inner
                    .handlers
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .len(),
            )
            .field("inflight", &self.inner.inflight().len())
            .finish()
    }
}

impl<D> Navigator<D>
where
    D: Send + Sync + 'static,
{
    /// Create a navigator. Requests with equal `extract_key` results share
    /// one run while it is in flight.
    pub fn new<F>(extract_key: F) -> Self
    where
        F: Fn(&D) -> String + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(NavigatorInner {
                extract_key: Box::new(extract_key),
                base: DataContext::new(),
                handlers: RwLock::new(Vec::new()),
                contributors: RwLock::new(HashMap::new()),
                required: RwLock::new(Vec::new()),
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Context shared by every navigation. Each invocation's own layer
    /// falls back to it.
    pub fn context(&self) -> &DataContext {
        &self.inner.base
    }

    /// Append a handler. Handlers run in the order they were added.
    pub fn add_handler<H>(&self, handler: H)
    where
        H: NavigationHandler<D> + 'static,
    {
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(handler));
    }

    /// Register the contributor computing `token` on demand. A later
    /// registration for the same token replaces the earlier one.
    pub fn add_context_contributor<C>(&self, token: &DataContextGetter<C::Context>, contributor: C)
    where
        C: ContextContributor<D>,
    {
        let registered: Arc<dyn ErasedContributor<D>> = Arc::new(Registered {
            token: *token,
            contributor,
        });
        self.inner
            .contributors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.id(), registered);
    }

    /// Like [`Navigator::add_context_contributor`], but the context is built
    /// before any handler runs and a failure fails the navigation.
    pub fn add_required_context<C>(&self, token: &DataContextGetter<C::Context>, contributor: C)
    where
        C: ContextContributor<D>,
    {
        self.add_context_contributor(token, contributor);
        let mut required = self
            .inner
            .required
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !required.iter().any(|(id, _)| *id == token.id()) {
            required.push((token.id(), token.name()));
        }
    }

    /// True while a navigation for `data`'s key is running.
    pub fn is_navigating(&self, data: &D) -> bool {
        let key = (self.inner.extract_key)(data);
        self.inner.inflight().contains_key(&key)
    }

    /// Run the pipeline for `data`, or join the run already in flight for
    /// the same key.
    pub async fn navigate_to(&self, data: D) -> NavResult<NavigationOutcome> {
        let key = (self.inner.extract_key)(&data);

        let navigation = {
            let mut inflight = self.inner.inflight();
            match inflight.get(&key) {
                Some(running) => {
                    tracing::debug!(key = %key, "joining navigation in flight");
                    running.clone()
                }
                None => {
                    let navigation = self.start(key.clone(), data);
                    inflight.insert(key, navigation.clone());
                    navigation
                }
            }
        };

        navigation.await
    }

    fn start(&self, key: String, data: D) -> SharedNavigation {
        let handlers = self
            .inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let contributors = Arc::new(
            self.inner
                .contributors
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        );
        let required = self
            .inner
            .required
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let provider = ContextProvider::new(Arc::new(data), &self.inner.base, contributors);
        let span = info_span!("navigation", id = %provider.id(), key = %key);
        let inner: Weak<NavigatorInner<D>> = Arc::downgrade(&self.inner);

        async move {
            let result = run(&provider, &required, &handlers).await;
            if let Some(inner) = inner.upgrade() {
                inner.inflight().remove(&key);
            }
            result
        }
        .instrument(span)
        .boxed()
        .shared()
    }
}

async fn run<D>(
    provider: &ContextProvider<D>,
    required: &[(u64, &'static str)],
    handlers: &[Arc<dyn NavigationHandler<D>>],
) -> NavResult<NavigationOutcome>
where
    D: Send + Sync + 'static,
{
    provider.set_state(NavigationState::ContextBuilding);
    for (token_id, name) in required {
        if let Err(error) = provider.resolve(*token_id, *name).await {
            provider.set_state(NavigationState::Failed);
            tracing::warn!(context = name, error = %error, "navigation context failed");
            return Err(error);
        }
    }

    provider.set_state(NavigationState::HandlersRunning);
    for handler in handlers {
        if provider.is_interrupted() {
            break;
        }
        if let Err(error) = handler.handle(provider).await {
            provider.set_state(NavigationState::Failed);
            tracing::warn!(handler = handler.name(), error = %error, "navigation handler failed");
            return Err(error);
        }
    }

    let contexts = provider.contexts().clone();
    if provider.is_interrupted() {
        provider.set_state(NavigationState::Interrupted);
        tracing::debug!("navigation interrupted");
        Ok(NavigationOutcome::Interrupted(contexts))
    } else {
        provider.set_state(NavigationState::Completed);
        tracing::debug!("navigation completed");
        Ok(NavigationOutcome::Completed(contexts))
    }
}
