//! Opens the connection behind a navigated database object.

use std::sync::Arc;

use async_trait::async_trait;
use treenav_core::{
    ConnectionAuthenticator, NavError, NavResult, NavigationError, NavigationType, Notifier,
};

use crate::navigator::NavigationHandler;
use crate::node_context::{NodeNavigationData, NODE_NAVIGATION_CONTEXT};
use crate::provider::ContextProvider;

/// Message key reported to the notifier when authentication fails.
pub const CONNECTION_AUTH_ERROR_KEY: &str = "core_navigation_connection_auth_error";

/// Authenticates the owning connection before a database object is opened.
///
/// Closing a connection and navigating to non-database nodes skip
/// authentication.
pub struct ConnectionAuthHandler {
    authenticator: Arc<dyn ConnectionAuthenticator>,
    notifier: Arc<dyn Notifier>,
}

impl ConnectionAuthHandler {
    pub fn new(authenticator: Arc<dyn ConnectionAuthenticator>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            authenticator,
            notifier,
        }
    }
}

#[async_trait]
impl NavigationHandler<NodeNavigationData> for ConnectionAuthHandler {
    async fn handle(&self, contexts: &ContextProvider<NodeNavigationData>) -> NavResult<()> {
        let node = contexts.get_context(&*NODE_NAVIGATION_CONTEXT).await?;
        if node.navigation_type == NavigationType::CloseConnection {
            return Ok(());
        }
        let Some(connection_id) = node.node_id.connection_id() else {
            return Ok(());
        };

        let connection = match self.authenticator.authenticate(connection_id).await {
            Ok(connection) => connection,
            Err(error) => {
                let error = match error {
                    NavError::Navigation(NavigationError::AuthenticationFailed { .. }) => error,
                    other => NavError::Navigation(NavigationError::AuthenticationFailed {
                        connection_id: connection_id.to_string(),
                        reason: other.to_string(),
                    }),
                };
                self.notifier.log_exception(&error, CONNECTION_AUTH_ERROR_KEY);
                return Err(error);
            }
        };

        if !connection.connected {
            return Err(NavError::Navigation(
                NavigationError::ConnectionNotEstablished {
                    connection_id: connection.id,
                },
            ));
        }

        tracing::debug!(connection_id, "connection ready");
        Ok(())
    }

    fn name(&self) -> &str {
        "connection-auth"
    }
}
