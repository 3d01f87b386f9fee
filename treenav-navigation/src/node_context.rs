//! Node navigation request and its canonical context.

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use treenav_context::DataContextGetter;
use treenav_core::{FetchError, NavError, NavNode, NavNodeKey, NavResult, NavigationType, NodeId};
use treenav_resource::NodeInfoResource;

use crate::provider::{ContextContributor, ContextProvider};

/// Token under which every node navigation stores its [`NodeNavigationContext`].
pub static NODE_NAVIGATION_CONTEXT: Lazy<DataContextGetter<NodeNavigationContext>> =
    Lazy::new(|| DataContextGetter::new("node-navigation-context"));

/// A "navigate to node" request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeNavigationData {
    pub navigation_type: NavigationType,
    pub node_id: NodeId,
    pub parent_id: NodeId,
    /// Folder to reveal, overriding the one derived from the node.
    pub folder_id: Option<NodeId>,
}

impl NodeNavigationData {
    pub fn open(node_id: impl Into<NodeId>, parent_id: impl Into<NodeId>) -> Self {
        Self {
            navigation_type: NavigationType::Open,
            node_id: node_id.into(),
            parent_id: parent_id.into(),
            folder_id: None,
        }
    }

    pub fn close_connection(node_id: impl Into<NodeId>, parent_id: impl Into<NodeId>) -> Self {
        Self {
            navigation_type: NavigationType::CloseConnection,
            ..Self::open(node_id, parent_id)
        }
    }

    pub fn with_folder(mut self, folder_id: impl Into<NodeId>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }

    /// Coalescing key: navigations to the same node share one run.
    pub(crate) fn navigation_key(&self) -> String {
        self.node_id.as_str().to_string()
    }
}

/// The node a navigation actually targets, after folder redirection.
///
/// Equality compares the navigation fields only.
#[derive(Clone)]
pub struct NodeNavigationContext {
    pub navigation_type: NavigationType,
    pub node_id: NodeId,
    pub parent_id: NodeId,
    /// Folder the navigation came through, if any.
    pub folder_id: Option<NodeId>,
    pub name: Option<String>,
    pub icon: Option<String>,
    info: NodeInfoResource,
    max_walk_depth: usize,
}

impl PartialEq for NodeNavigationContext {
    fn eq(&self, other: &Self) -> bool {
        self.navigation_type == other.navigation_type
            && self.node_id == other.node_id
            && self.parent_id == other.parent_id
            && self.folder_id == other.folder_id
            && self.name == other.name
            && self.icon == other.icon
    }
}

impl fmt::Debug for NodeNavigationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeNavigationContext")
            .field("navigation_type", &self.navigation_type)
            .field("node_id", &self.node_id)
            .field("parent_id", &self.parent_id)
            .field("folder_id", &self.folder_id)
            .field("name", &self.name)
            .field("icon", &self.icon)
            .finish()
    }
}

impl NodeNavigationContext {
    /// Ancestor ids of the target node from the topmost non-root ancestor
    /// down to the direct parent. Only cached nodes are consulted.
    ///
    /// The walk ends at a child of the root, at a self-parented node or at
    /// the first ancestor that is not cached. Repeated ids and the depth cap
    /// also end it, with a warning.
    pub fn get_parents(&self) -> Vec<NodeId> {
        let mut parents = Vec::new();
        let mut visited: HashSet<NodeId> = HashSet::from([self.node_id.clone()]);
        let mut current = self.info.get(&self.node_id);

        while let Some(node) = current {
            if node.parent_id.is_root() || node.is_self_parent() {
                break;
            }
            if parents.len() >= self.max_walk_depth {
                tracing::warn!(node_id = %self.node_id, depth = parents.len(), "ancestor walk depth cap reached");
                break;
            }
            if !visited.insert(node.parent_id.clone()) {
                tracing::warn!(node_id = %node.parent_id, "cycle in node ancestry");
                break;
            }
            parents.push(node.parent_id.clone());
            current = self.info.get(&node.parent_id);
        }

        parents.reverse();
        parents
    }

    /// Load `parents` (root-first) and re-parent each one under the id that
    /// precedes it, the first under the root.
    pub async fn load_parents(&self, parents: &[NodeId]) -> NavResult<()> {
        let nodes = self.info.load_ids(parents).await?;
        let mut parent_id = NodeId::root();
        for node in nodes {
            self.info.set_parent(&node.id, parent_id);
            parent_id = node.id;
        }
        Ok(())
    }
}

/// Builds the [`NodeNavigationContext`] for a [`NodeNavigationData`].
///
/// For database objects (except when closing a connection) the node is
/// loaded, and a folder whose parent is not itself a folder is replaced by
/// that parent, remembering the folder in `folder_id`. A parent that is
/// neither cached nor loadable leaves the folder in place. An explicit
/// `folder_id` in the request always wins.
pub struct NodeContextContributor {
    info: NodeInfoResource,
    max_walk_depth: usize,
}

impl NodeContextContributor {
    pub fn new(info: NodeInfoResource, max_walk_depth: usize) -> Self {
        Self {
            info,
            max_walk_depth,
        }
    }

    /// Parent used for the folder redirect. A parent that cannot be loaded
    /// means no redirect, never a failed navigation.
    async fn parent_of(&self, node: &NavNode) -> Option<NavNode> {
        if let Some(parent) = self.info.get(&node.parent_id) {
            return Some(parent);
        }
        if !node.parent_id.is_database_object() {
            return None;
        }
        match self.info.load_ids(&[node.parent_id.clone()]).await {
            Ok(mut parents) => parents.pop(),
            Err(error) => {
                tracing::debug!(folder = %node.id, parent = %node.parent_id, error = %error, "folder parent unavailable, not redirecting");
                None
            }
        }
    }
}

#[async_trait]
impl ContextContributor<NodeNavigationData> for NodeContextContributor {
    type Context = NodeNavigationContext;

    async fn contribute(
        &self,
        contexts: &ContextProvider<NodeNavigationData>,
    ) -> NavResult<NodeNavigationContext> {
        let data = contexts.data();
        let mut context = NodeNavigationContext {
            navigation_type: data.navigation_type,
            node_id: data.node_id.clone(),
            parent_id: data.parent_id.clone(),
            folder_id: None,
            name: None,
            icon: None,
            info: self.info.clone(),
            max_walk_depth: self.max_walk_depth,
        };

        if !data.node_id.is_database_object()
            || data.navigation_type == NavigationType::CloseConnection
        {
            return Ok(context);
        }

        let node = self
            .info
            .load(&[NavNodeKey::new(data.node_id.clone(), data.parent_id.clone())])
            .await?
            .pop()
            .ok_or_else(|| {
                NavError::Fetch(FetchError::MissingEntry {
                    key: data.node_id.to_string(),
                })
            })?;
        context.name = Some(node.name.clone());
        context.icon = node.icon.clone();

        if node.folder {
            context.folder_id = Some(node.id.clone());
            if let Some(parent) = self.parent_of(&node).await.filter(|parent| !parent.folder) {
                tracing::debug!(folder = %node.id, target = %parent.id, "redirecting folder navigation");
                context.node_id = parent.id;
                context.parent_id = parent.parent_id;
                context.name = Some(parent.name);
                context.icon = parent.icon;
            }
        }

        if let Some(folder_id) = &data.folder_id {
            context.folder_id = Some(folder_id.clone());
        }

        Ok(context)
    }
}
