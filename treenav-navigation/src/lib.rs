//! treenav Navigation - Navigation Pipeline
//!
//! Runs "navigate to node" requests through an ordered chain of handlers
//! and exposes the node caches through [`NodeManager`].
//!
//! Build everything with [`assemble`]:
//!
//! ```ignore
//! let manager = assemble(collaborators, NavConfig::from_env())?;
//! manager.nav_to_node(node_id, parent_id, None).await?;
//! ```

mod auth;
mod manager;
mod navigator;
mod node_context;
mod provider;
mod wiring;

pub use auth::{ConnectionAuthHandler, CONNECTION_AUTH_ERROR_KEY};
pub use manager::{NavNodeRequest, NodeManager};
pub use navigator::{NavigationHandler, Navigator};
pub use node_context::{
    NodeContextContributor, NodeNavigationContext, NodeNavigationData, NODE_NAVIGATION_CONTEXT,
};
pub use provider::{ContextContributor, ContextProvider, NavigationOutcome, NavigationState};
pub use wiring::{assemble, Collaborators};
