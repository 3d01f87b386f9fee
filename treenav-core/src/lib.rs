//! treenav Core - Node Types
//!
//! Node identity and metadata, the error taxonomy, configuration and the
//! collaborator traits shared by every other treenav crate.

mod collaborators;
mod config;
mod error;
mod identity;
mod node;

pub use collaborators::{
    Connection, ConnectionAuthenticator, NavNodeFetcher, Notifier, Permission, PermissionGate,
};
pub use config::NavConfig;
pub use error::{ConfigError, ContextError, FetchError, NavError, NavResult, NavigationError};
pub use identity::{NodeId, DATABASE_NODE_PREFIX, ROOT_NODE_PATH};
pub use node::{
    NavNode, NavNodeKey, NavNodeValue, NavigationType, NodeContainerInfo, ObjectFeature,
};
