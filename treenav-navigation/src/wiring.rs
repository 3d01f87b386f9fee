//! Composition root.

use std::sync::Arc;

use treenav_core::{
    ConnectionAuthenticator, NavConfig, NavNodeFetcher, NavResult, Notifier, PermissionGate,
};

use crate::auth::ConnectionAuthHandler;
use crate::manager::NodeManager;

/// External services the node manager is built from.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn NavNodeFetcher>,
    pub authenticator: Arc<dyn ConnectionAuthenticator>,
    pub notifier: Arc<dyn Notifier>,
    pub permissions: Arc<dyn PermissionGate>,
}

/// Validate `config` and build a [`NodeManager`] with the connection
/// authentication handler registered as its first handler.
pub fn assemble(collaborators: Collaborators, config: NavConfig) -> NavResult<NodeManager> {
    config.validate()?;

    let Collaborators {
        fetcher,
        authenticator,
        notifier,
        permissions,
    } = collaborators;

    let manager = NodeManager::new(fetcher, permissions, config);
    manager.add_handler(ConnectionAuthHandler::new(authenticator, notifier));

    tracing::debug!(config = ?manager.config(), "node manager assembled");
    Ok(manager)
}
