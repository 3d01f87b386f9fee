//! Node manager: the public face of the node caches and the navigator.

use std::collections::HashSet;
use std::sync::Arc;

use treenav_context::DataContextGetter;
use treenav_core::{
    FetchError, NavConfig, NavError, NavNode, NavNodeFetcher, NavNodeKey, NavNodeValue, NavResult,
    NodeContainerInfo, NodeId, ObjectFeature, PermissionGate,
};
use treenav_resource::{NodeInfoResource, NodeTreeResource};

use crate::navigator::{NavigationHandler, Navigator};
use crate::node_context::{NodeContextContributor, NodeNavigationData, NODE_NAVIGATION_CONTEXT};
use crate::provider::{ContextContributor, NavigationOutcome};

// ============================================================================
// REQUEST SHAPES
// ============================================================================

/// Bulk node operation. Exactly one shape applies per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavNodeRequest {
    /// Nodes addressed with their displayed parent.
    Path { nodes: Vec<NavNodeKey>, remove: bool },
    /// Node values pushed from outside.
    Data { values: Vec<NavNodeValue> },
    /// Nodes addressed by id only.
    Ids { ids: Vec<NodeId>, remove: bool },
}

// ============================================================================
// NODE MANAGER
// ============================================================================

/// Loads, refreshes and navigates nodes.
///
/// Cloning yields another handle over the same caches and navigator.
#[derive(Clone)]
pub struct NodeManager {
    fetcher: Arc<dyn NavNodeFetcher>,
    permissions: Arc<dyn PermissionGate>,
    tree: NodeTreeResource,
    info: NodeInfoResource,
    navigator: Navigator<NodeNavigationData>,
    config: NavConfig,
}

impl NodeManager {
    /// Wire the caches and the navigator. The node navigation context is
    /// registered as a required context; other handlers are added by the
    /// caller.
    pub(crate) fn new(
        fetcher: Arc<dyn NavNodeFetcher>,
        permissions: Arc<dyn PermissionGate>,
        config: NavConfig,
    ) -> Self {
        let tree = NodeTreeResource::new(Arc::clone(&fetcher), &config);
        let info = NodeInfoResource::new(Arc::clone(&fetcher), &config);
        info.sync_with_tree(&tree);

        let navigator = Navigator::new(NodeNavigationData::navigation_key);
        navigator.add_required_context(
            &*NODE_NAVIGATION_CONTEXT,
            NodeContextContributor::new(info.clone(), config.max_walk_depth),
        );

        Self {
            fetcher,
            permissions,
            tree,
            info,
            navigator,
            config,
        }
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn tree(&self) -> &NodeTreeResource {
        &self.tree
    }

    pub fn info(&self) -> &NodeInfoResource {
        &self.info
    }

    pub fn navigator(&self) -> &Navigator<NodeNavigationData> {
        &self.navigator
    }

    pub fn add_handler<H>(&self, handler: H)
    where
        H: NavigationHandler<NodeNavigationData> + 'static,
    {
        self.navigator.add_handler(handler);
    }

    pub fn add_context_contributor<C>(
        &self,
        token: &DataContextGetter<C::Context>,
        contributor: C,
    ) where
        C: ContextContributor<NodeNavigationData>,
    {
        self.navigator.add_context_contributor(token, contributor);
    }

    // ========================================================================
    // NODES
    // ========================================================================

    /// Load one node shown under `key.parent_id`.
    pub async fn load_node(&self, key: &NavNodeKey) -> NavResult<NavNode> {
        let mut nodes = self.info.load(std::slice::from_ref(key)).await?;
        nodes.pop().ok_or_else(|| {
            NavError::Fetch(FetchError::MissingEntry {
                key: key.node_id.to_string(),
            })
        })
    }

    /// Load nodes in input order, each shown under its key's parent.
    pub async fn load_nodes(&self, keys: &[NavNodeKey]) -> NavResult<Vec<NavNode>> {
        self.info.load(keys).await
    }

    pub fn get_node(&self, node_id: &NodeId) -> Option<NavNode> {
        self.info.get(node_id)
    }

    pub fn get_nodes(&self, keys: &[NavNodeKey]) -> Vec<Option<NavNode>> {
        keys.iter().map(|key| self.info.get(&key.node_id)).collect()
    }

    pub fn remove_node(&self, node_id: &NodeId) {
        self.info.delete(node_id);
    }

    /// Re-fetch one node's metadata.
    pub async fn refresh_node(&self, node_id: &NodeId) -> NavResult<NavNode> {
        self.info.refresh(node_id).await
    }

    pub fn get_parent(&self, node: &NavNode) -> Option<NavNode> {
        self.info.get(&node.parent_id)
    }

    /// Whether the node can back a data view. Unknown nodes cannot.
    pub fn is_node_has_data(&self, node_id: &NodeId) -> bool {
        self.info.get(node_id).is_some_and(|node| node.has_data())
    }

    /// Apply a bulk [`NavNodeRequest`].
    pub async fn apply(&self, request: NavNodeRequest) -> NavResult<()> {
        match request {
            NavNodeRequest::Path { nodes, remove: true } => {
                let ids: Vec<NodeId> = nodes.into_iter().map(|key| key.node_id).collect();
                self.info.delete_many(&ids);
            }
            NavNodeRequest::Path { nodes, remove: false } => {
                self.info.load(&nodes).await?;
            }
            NavNodeRequest::Data { values } => {
                for value in values {
                    self.info.set(value);
                }
            }
            NavNodeRequest::Ids { ids, remove: true } => self.info.delete_many(&ids),
            NavNodeRequest::Ids { ids, remove: false } => {
                self.info.load_ids(&ids).await?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // TREE
    // ========================================================================

    pub fn get_tree(&self, node_id: &NodeId) -> Option<Vec<NodeId>> {
        self.tree.get(node_id)
    }

    pub fn get_trees(&self, keys: &[NavNodeKey]) -> Vec<Option<Vec<NodeId>>> {
        keys.iter().map(|key| self.tree.get(&key.node_id)).collect()
    }

    pub async fn load_tree(&self, node_id: &NodeId) -> NavResult<Vec<NodeId>> {
        self.tree.load(node_id).await
    }

    /// Re-sync `node_id` on the server, mark its cached subtree outdated and
    /// reload its immediate children.
    pub async fn refresh_tree(&self, node_id: &NodeId) -> NavResult<Vec<NodeId>> {
        self.fetcher.refresh_node(node_id).await?;
        self.tree.mark_outdated(node_id);
        self.tree.refresh(node_id).await
    }

    pub fn remove_tree(&self, node_id: &NodeId) {
        self.tree.delete(node_id);
    }

    /// Reload the root's children, or drop them when the configured root
    /// permission is not granted.
    pub async fn update_root_children(&self) -> NavResult<()> {
        let root = NodeId::root();
        if !self
            .permissions
            .has_permission(self.config.root_permission)
            .await
        {
            tracing::debug!(permission = ?self.config.root_permission, "root permission missing, dropping root children");
            self.tree.delete(&root);
            return Ok(());
        }
        self.tree.refresh(&root).await?;
        Ok(())
    }

    // ========================================================================
    // NAVIGATION
    // ========================================================================

    pub async fn navigate_to(&self, data: NodeNavigationData) -> NavResult<NavigationOutcome> {
        self.navigator.navigate_to(data).await
    }

    /// Open `node_id` shown under `parent_id`.
    pub async fn nav_to_node(
        &self,
        node_id: NodeId,
        parent_id: NodeId,
        folder_id: Option<NodeId>,
    ) -> NavResult<NavigationOutcome> {
        let mut data = NodeNavigationData::open(node_id, parent_id);
        data.folder_id = folder_id;
        self.navigate_to(data).await
    }

    // ========================================================================
    // ANCESTRY
    // ========================================================================

    /// Connection, catalog and schema above `node_id`, from cached nodes.
    ///
    /// The nearest ancestor carrying each feature wins. The walk stops at the
    /// root, at an uncached node, at a repeated node or at the depth cap.
    pub fn get_node_container_info(&self, node_id: &NodeId) -> NodeContainerInfo {
        let mut info = NodeContainerInfo::default();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut current = node_id.clone();

        for depth in 0.. {
            if depth >= self.config.max_walk_depth {
                tracing::warn!(node_id = %node_id, depth, "container walk depth cap reached");
                break;
            }
            if !visited.insert(current.clone()) {
                tracing::warn!(node_id = %current, "cycle in node ancestry");
                break;
            }
            let Some(node) = self.info.get(&current) else {
                break;
            };

            if info.connection_id.is_none() && node.has_feature(ObjectFeature::DataSource) {
                info.connection_id = Some(node.id.clone());
            }
            if info.catalog_id.is_none() && node.has_feature(ObjectFeature::Catalog) {
                info.catalog_id = Some(node.name.clone());
            }
            if info.schema_id.is_none() && node.has_feature(ObjectFeature::Schema) {
                info.schema_id = Some(node.name.clone());
            }

            if node.is_self_parent() {
                break;
            }
            current = node.parent_id;
        }

        info
    }
}
