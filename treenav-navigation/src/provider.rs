//! Per-invocation view handed to handlers and contributors.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use treenav_context::{DataContext, DataContextGetter};
use treenav_core::{ContextError, NavError, NavResult};
use uuid::Uuid;

// ============================================================================
// STATE AND OUTCOME
// ============================================================================

/// Lifecycle of a single navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationState {
    Created,
    /// Required contexts are being resolved; no handler has run yet.
    ContextBuilding,
    HandlersRunning,
    Completed,
    Interrupted,
    Failed,
}

impl NavigationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NavigationState::Completed | NavigationState::Interrupted | NavigationState::Failed
        )
    }
}

/// How a navigation that did not fail ended. Both cases carry the
/// invocation's data context.
#[derive(Clone)]
pub enum NavigationOutcome {
    Completed(DataContext),
    /// A handler called [`ContextProvider::interrupt`]; later handlers were skipped.
    Interrupted(DataContext),
}

impl NavigationOutcome {
    pub fn contexts(&self) -> &DataContext {
        match self {
            NavigationOutcome::Completed(contexts) | NavigationOutcome::Interrupted(contexts) => {
                contexts
            }
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, NavigationOutcome::Interrupted(_))
    }

    pub fn state(&self) -> NavigationState {
        match self {
            NavigationOutcome::Completed(_) => NavigationState::Completed,
            NavigationOutcome::Interrupted(_) => NavigationState::Interrupted,
        }
    }
}

impl fmt::Debug for NavigationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NavigationOutcome").field(&self.state()).finish()
    }
}

// ============================================================================
// CONTRIBUTORS
// ============================================================================

/// Computes one context value for a navigation in progress.
///
/// A contributor runs at most once per navigation; its value is stored in the
/// invocation's [`DataContext`] under the token it was registered with.
#[async_trait]
pub trait ContextContributor<D>: Send + Sync + 'static {
    type Context: Clone + PartialEq + Send + Sync + 'static;

    async fn contribute(&self, contexts: &ContextProvider<D>) -> NavResult<Self::Context>;
}

/// Contributor with its value type erased, keyed by token id.
#[async_trait]
pub(crate) trait ErasedContributor<D>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn contribute_into(&self, contexts: &ContextProvider<D>) -> NavResult<()>;
}

pub(crate) struct Registered<C, T> {
    pub(crate) token: DataContextGetter<T>,
    pub(crate) contributor: C,
}

#[async_trait]
impl<D, C, T> ErasedContributor<D> for Registered<C, T>
where
    D: Send + Sync + 'static,
    C: ContextContributor<D, Context = T>,
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.token.name()
    }

    async fn contribute_into(&self, contexts: &ContextProvider<D>) -> NavResult<()> {
        let value = self.contributor.contribute(contexts).await?;
        contexts.contexts().set(&self.token, value);
        Ok(())
    }
}

pub(crate) type ContributorMap<D> = HashMap<u64, Arc<dyn ErasedContributor<D>>>;

// ============================================================================
// CONTEXT PROVIDER
// ============================================================================

/// What a handler sees of the navigation it runs in.
pub struct ContextProvider<D> {
    id: Uuid,
    data: Arc<D>,
    contexts: DataContext,
    contributors: Arc<ContributorMap<D>>,
    state: Mutex<NavigationState>,
    interrupted: AtomicBool,
}

impl<D> ContextProvider<D>
where
    D: Send + Sync + 'static,
{
    pub(crate) fn new(
        data: Arc<D>,
        base: &DataContext,
        contributors: Arc<ContributorMap<D>>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            data,
            contexts: DataContext::with_fallback(base),
            contributors,
            state: Mutex::new(NavigationState::Created),
            interrupted: AtomicBool::new(false),
        }
    }

    /// Invocation id, also recorded on the navigation's tracing span.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The request being navigated.
    pub fn data(&self) -> &D {
        &self.data
    }

    /// This navigation's context layer. It falls back to the navigator's
    /// shared context.
    pub fn contexts(&self) -> &DataContext {
        &self.contexts
    }

    /// Value for `token`, computing it with the registered contributor on
    /// first use.
    pub async fn get_context<T>(&self, token: &DataContextGetter<T>) -> NavResult<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        if let Some(value) = self.contexts.try_get(token) {
            return Ok(value);
        }
        self.resolve(token.id(), token.name()).await?;
        self.contexts.get(token)
    }

    pub(crate) async fn resolve(&self, token_id: u64, name: &'static str) -> NavResult<()> {
        let contributor = self.contributors.get(&token_id).cloned().ok_or_else(|| {
            NavError::Context(ContextError::ContributorMissing {
                context: name.to_string(),
            })
        })?;
        tracing::trace!(context = contributor.name(), "contributing context");
        contributor.contribute_into(self).await
    }

    /// Stop the handler chain after the current handler returns.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> NavigationState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_state(&self, state: NavigationState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}
