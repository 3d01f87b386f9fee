//! Narrow interfaces to the services the node cache depends on.
//!
//! Transport, presentation and permission storage live behind these traits.
//! Implementations are supplied by the embedding application.

use crate::{NavError, NavNode, NavResult, NodeId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// NODE FETCHER
// ============================================================================

/// Remote source of tree structure and node metadata.
///
/// Any failure is opaque to the cache and is propagated as-is.
#[async_trait]
pub trait NavNodeFetcher: Send + Sync {
    /// Ordered child ids of `parent_id`.
    async fn fetch_children(&self, parent_id: &NodeId) -> NavResult<Vec<NodeId>>;

    /// Metadata for a batch of nodes. Order of the result is not significant.
    async fn fetch_node_info(&self, ids: &[NodeId]) -> NavResult<Vec<NavNode>>;

    /// Ask the server to re-sync a node with the database.
    async fn refresh_node(&self, path: &NodeId) -> NavResult<()>;
}

// ============================================================================
// CONNECTION AUTHENTICATION
// ============================================================================

/// Connection state reported after an authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub connected: bool,
}

/// Opens (authenticating if needed) the connection behind a node.
#[async_trait]
pub trait ConnectionAuthenticator: Send + Sync {
    async fn authenticate(&self, connection_id: &str) -> NavResult<Connection>;
}

// ============================================================================
// NOTIFICATION
// ============================================================================

/// Receives errors for presentation. How they are shown is not our concern.
pub trait Notifier: Send + Sync {
    fn log_exception(&self, error: &NavError, message_key: &str);
}

// ============================================================================
// PERMISSIONS
// ============================================================================

/// Permission flags understood by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Public,
    Admin,
}

impl Permission {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "public" => Some(Permission::Public),
            "admin" => Some(Permission::Admin),
            _ => None,
        }
    }
}

/// Boolean permission gate.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn has_permission(&self, permission: Permission) -> bool;
}
