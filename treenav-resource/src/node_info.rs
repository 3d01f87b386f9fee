//! Node id -> flat node metadata.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use treenav_core::{NavConfig, NavNode, NavNodeFetcher, NavNodeKey, NavNodeValue, NavResult, NodeId};

use crate::cached::CachedResource;
use crate::node_tree::NodeTreeResource;
use crate::traits::{ResourceEvent, ResourceLoader};

struct NodeInfoLoader {
    fetcher: Arc<dyn NavNodeFetcher>,
}

#[async_trait]
impl ResourceLoader<NodeId, NavNode> for NodeInfoLoader {
    async fn load(&self, keys: &[NodeId]) -> NavResult<Vec<(NodeId, NavNode)>> {
        let nodes = self.fetcher.fetch_node_info(keys).await?;
        Ok(nodes.into_iter().map(|node| (node.id.clone(), node)).collect())
    }
}

/// Cached node metadata.
///
/// The parent a node is shown under is decided by the caller, not by the
/// fetch: [`NodeInfoResource::load`] overwrites the fetched `parent_id` with
/// the one in each key.
#[derive(Clone)]
pub struct NodeInfoResource {
    resource: CachedResource<NodeId, NavNode>,
}

impl NodeInfoResource {
    pub fn new(fetcher: Arc<dyn NavNodeFetcher>, config: &NavConfig) -> Self {
        Self {
            resource: CachedResource::new(
                "node-info",
                Arc::new(NodeInfoLoader { fetcher }),
                config.event_channel_capacity,
            ),
        }
    }

    pub fn resource(&self) -> &CachedResource<NodeId, NavNode> {
        &self.resource
    }

    pub fn get(&self, node_id: &NodeId) -> Option<NavNode> {
        self.resource.get(node_id)
    }

    pub fn get_many(&self, node_ids: &[NodeId]) -> Vec<Option<NavNode>> {
        node_ids.iter().map(|id| self.resource.get(id)).collect()
    }

    /// Load nodes with their displayed parent. Ids that are missing or
    /// outdated are fetched in one request; results follow input order.
    pub async fn load(&self, keys: &[NavNodeKey]) -> NavResult<Vec<NavNode>> {
        let ids: Vec<NodeId> = keys.iter().map(|key| key.node_id.clone()).collect();
        let nodes = self.resource.load_many(&ids).await?;

        Ok(keys
            .iter()
            .zip(nodes)
            .map(|(key, mut node)| {
                if node.parent_id != key.parent_id {
                    self.set_parent(&key.node_id, key.parent_id.clone());
                    node.parent_id = key.parent_id.clone();
                }
                node
            })
            .collect())
    }

    /// Load nodes keeping whatever parent the fetch reports.
    pub async fn load_ids(&self, node_ids: &[NodeId]) -> NavResult<Vec<NavNode>> {
        self.resource.load_many(node_ids).await
    }

    pub async fn refresh(&self, node_id: &NodeId) -> NavResult<NavNode> {
        self.resource.refresh(node_id).await
    }

    /// Store a node pushed from outside, honoring its parent override.
    pub fn set(&self, value: NavNodeValue) {
        let NavNodeValue { mut node, parent_id } = value;
        if let Some(parent_id) = parent_id {
            node.parent_id = parent_id;
        }
        self.resource.set(node.id.clone(), node);
    }

    /// Re-parent a cached node. Returns false when the node is not cached.
    pub fn set_parent(&self, node_id: &NodeId, parent_id: NodeId) -> bool {
        self.resource.update(node_id, |node| node.parent_id = parent_id)
    }

    pub fn delete(&self, node_id: &NodeId) {
        self.resource.delete(node_id);
    }

    pub fn delete_many(&self, node_ids: &[NodeId]) {
        self.resource.delete_many(node_ids);
    }

    pub fn mark_outdated(&self, node_id: &NodeId) {
        self.resource.mark_outdated(node_id);
    }

    pub fn mark_outdated_many(&self, node_ids: &[NodeId]) {
        self.resource.mark_outdated_many(node_ids);
    }

    pub fn is_outdated(&self, node_id: &NodeId) -> bool {
        self.resource.is_outdated(node_id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResourceEvent<NodeId>> {
        self.resource.subscribe()
    }

    /// Mark node infos outdated whenever the tree marks the same ids outdated.
    pub fn sync_with_tree(&self, tree: &NodeTreeResource) {
        self.resource.sync(
            tree.resource(),
            |_, _| {},
            |info, node_ids| info.mark_outdated_many(node_ids),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use treenav_test_utils::{sample_tree, MockNavNodeFetcher};

    fn info(fetcher: &Arc<MockNavNodeFetcher>) -> NodeInfoResource {
        NodeInfoResource::new(fetcher.clone(), &NavConfig::default())
    }

    #[tokio::test]
    async fn test_load_applies_parent_override() {
        let fetcher = Arc::new(sample_tree());
        fetcher.misreport_parent(NodeId::new("database://pg/app"), NodeId::new("elsewhere"));
        let info = info(&fetcher);

        let nodes = info
            .load(&[
                NavNodeKey::new("database://pg/app", "p1"),
                NavNodeKey::new("database://mysql", "p2"),
            ])
            .await
            .unwrap();

        assert_eq!(nodes[0].parent_id, NodeId::new("p1"));
        assert_eq!(nodes[1].parent_id, NodeId::new("p2"));
        assert_eq!(
            info.get(&NodeId::new("database://pg/app")).unwrap().parent_id,
            NodeId::new("p1")
        );
        assert_eq!(fetcher.info_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_load_batches_only_missing_ids() {
        let fetcher = Arc::new(sample_tree());
        let info = info(&fetcher);
        info.load_ids(&[NodeId::new("database://pg")]).await.unwrap();

        let nodes = info
            .load_ids(&[NodeId::new("database://mysql"), NodeId::new("database://pg")])
            .await
            .unwrap();

        assert_eq!(nodes[0].id, NodeId::new("database://mysql"));
        assert_eq!(nodes[1].id, NodeId::new("database://pg"));
        assert_eq!(
            fetcher.info_requests(),
            vec![
                vec![NodeId::new("database://pg")],
                vec![NodeId::new("database://mysql")],
            ]
        );
    }

    #[tokio::test]
    async fn test_set_honors_parent_override() {
        let fetcher = Arc::new(MockNavNodeFetcher::new());
        let info = info(&fetcher);
        info.set(NavNodeValue {
            node: NavNode::new("x", "wrong", "x"),
            parent_id: Some(NodeId::new("right")),
        });
        assert_eq!(info.get(&NodeId::new("x")).unwrap().parent_id, NodeId::new("right"));
        assert!(!info.set_parent(&NodeId::new("missing"), NodeId::root()));
    }

    #[tokio::test]
    async fn test_tree_invalidation_marks_info_outdated() {
        let fetcher = Arc::new(sample_tree());
        let config = NavConfig::default();
        let tree = NodeTreeResource::new(fetcher.clone(), &config);
        let info = NodeInfoResource::new(fetcher.clone(), &config);
        info.sync_with_tree(&tree);

        let pg = NodeId::new("database://pg");
        tree.load(&pg).await.unwrap();
        info.load_ids(&[pg.clone()]).await.unwrap();

        tree.refresh(&pg).await.unwrap();
        assert!(!info.is_outdated(&pg));

        tree.mark_outdated(&pg);
        assert!(info.is_outdated(&pg));
        assert!(info.get(&pg).is_some());
    }

    #[tokio::test]
    async fn test_delete_removes_entry() {
        let fetcher = Arc::new(sample_tree());
        let info = info(&fetcher);
        let pg = NodeId::new("database://pg");
        info.load_ids(&[pg.clone()]).await.unwrap();
        info.delete(&pg);
        assert!(info.get(&pg).is_none());
        assert_eq!(info.get_many(&[pg]), vec![None]);
    }
}
