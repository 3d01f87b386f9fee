#![allow(dead_code)]
//! Shared wiring for navigation integration tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use treenav_core::{NavConfig, NavError, NavResult, NavigationError, NodeId};
use treenav_navigation::{
    assemble, Collaborators, ContextProvider, NavigationHandler, NodeManager, NodeNavigationData,
};
use treenav_test_utils::{
    init_test_tracing, sample_tree, MockConnectionAuth, MockNavNodeFetcher, RecordingNotifier,
    StaticPermissions,
};

pub struct Harness {
    pub fetcher: Arc<MockNavNodeFetcher>,
    pub auth: Arc<MockConnectionAuth>,
    pub notifier: Arc<RecordingNotifier>,
    pub manager: NodeManager,
}

pub fn harness() -> Harness {
    harness_with(
        sample_tree(),
        MockConnectionAuth::new(),
        StaticPermissions::public(),
        NavConfig::default(),
    )
}

pub fn harness_with(
    fetcher: MockNavNodeFetcher,
    auth: MockConnectionAuth,
    permissions: StaticPermissions,
    config: NavConfig,
) -> Harness {
    init_test_tracing();
    let fetcher = Arc::new(fetcher);
    let auth = Arc::new(auth);
    let notifier = Arc::new(RecordingNotifier::new());
    let manager = assemble(
        Collaborators {
            fetcher: fetcher.clone(),
            authenticator: auth.clone(),
            notifier: notifier.clone(),
            permissions: Arc::new(permissions),
        },
        config,
    )
    .expect("default config is valid");

    Harness {
        fetcher,
        auth,
        notifier,
        manager,
    }
}

pub fn id(value: &str) -> NodeId {
    NodeId::new(value)
}

pub type Log = Arc<Mutex<Vec<String>>>;

/// Handler that records the node it saw and optionally fails or interrupts.
pub struct Step {
    pub label: &'static str,
    pub log: Log,
    pub fail: bool,
    pub interrupt: bool,
}

impl Step {
    pub fn new(label: &'static str, log: &Log) -> Self {
        Self {
            label,
            log: Arc::clone(log),
            fail: false,
            interrupt: false,
        }
    }

    pub fn failing(label: &'static str, log: &Log) -> Self {
        Self {
            fail: true,
            ..Self::new(label, log)
        }
    }

    pub fn interrupting(label: &'static str, log: &Log) -> Self {
        Self {
            interrupt: true,
            ..Self::new(label, log)
        }
    }
}

#[async_trait]
impl NavigationHandler<NodeNavigationData> for Step {
    async fn handle(&self, contexts: &ContextProvider<NodeNavigationData>) -> NavResult<()> {
        self.log.lock().unwrap().push(self.label.to_string());
        if self.interrupt {
            contexts.interrupt();
        }
        if self.fail {
            return Err(NavError::Navigation(NavigationError::HandlerFailed {
                handler: self.label.to_string(),
                reason: "step failed".to_string(),
            }));
        }
        Ok(())
    }
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}
