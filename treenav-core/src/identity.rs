//! Identity types for navigation nodes

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Path of the synthetic root node. The root is its own parent.
pub const ROOT_NODE_PATH: &str = "";

/// Prefix shared by every node that lives under a database connection.
pub const DATABASE_NODE_PREFIX: &str = "database://";

/// Opaque path identifying a node in the navigation tree.
///
/// Compared by value. The empty path is the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The root node identity.
    pub fn root() -> Self {
        Self(ROOT_NODE_PATH.to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_NODE_PATH
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for nodes under a database connection (`database://...`).
    pub fn is_database_object(&self) -> bool {
        self.0.starts_with(DATABASE_NODE_PREFIX)
    }

    /// Connection id owning this node, i.e. the first path segment after
    /// the database prefix.
    ///
    /// `database://pg-main/public/users` -> `pg-main`
    pub fn connection_id(&self) -> Option<&str> {
        let rest = self.0.strip_prefix(DATABASE_NODE_PREFIX)?;
        let id = rest.split('/').next().unwrap_or(rest);
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
