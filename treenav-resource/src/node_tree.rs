//! Parent id -> ordered child ids.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::try_join_all;
use tokio::sync::broadcast;
use treenav_core::{NavConfig, NavError, NavNodeFetcher, NavResult, NodeId};

use crate::cached::CachedResource;
use crate::traits::{ResourceEvent, ResourceLoader};

/// Fetches the child list of every requested parent concurrently.
struct ChildrenLoader {
    fetcher: Arc<dyn NavNodeFetcher>,
}

#[async_trait]
impl ResourceLoader<NodeId, Vec<NodeId>> for ChildrenLoader {
    async fn load(&self, keys: &[NodeId]) -> NavResult<Vec<(NodeId, Vec<NodeId>)>> {
        try_join_all(keys.iter().map(|parent_id| async move {
            let children = self.fetcher.fetch_children(parent_id).await?;
            Ok::<_, NavError>((parent_id.clone(), children))
        }))
        .await
    }
}

/// Cached tree structure with cascading invalidation.
///
/// Only the structure lives here; node metadata is held by
/// [`crate::NodeInfoResource`].
#[derive(Clone)]
pub struct NodeTreeResource {
    resource: CachedResource<NodeId, Vec<NodeId>>,
    max_walk_depth: usize,
}

impl NodeTreeResource {
    pub fn new(fetcher: Arc<dyn NavNodeFetcher>, config: &NavConfig) -> Self {
        Self {
            resource: CachedResource::new(
                "node-tree",
                Arc::new(ChildrenLoader { fetcher }),
                config.event_channel_capacity,
            ),
            max_walk_depth: config.max_walk_depth,
        }
    }

    /// The underlying cache, for dependency wiring.
    pub fn resource(&self) -> &CachedResource<NodeId, Vec<NodeId>> {
        &self.resource
    }

    pub fn get(&self, node_id: &NodeId) -> Option<Vec<NodeId>> {
        self.resource.get(node_id)
    }

    pub async fn load(&self, node_id: &NodeId) -> NavResult<Vec<NodeId>> {
        self.resource.load(node_id).await
    }

    pub async fn load_many(&self, node_ids: &[NodeId]) -> NavResult<Vec<Vec<NodeId>>> {
        self.resource.load_many(node_ids).await
    }

    /// Re-fetch the immediate children of `node_id`. Descendants are left as
    /// they are.
    pub async fn refresh(&self, node_id: &NodeId) -> NavResult<Vec<NodeId>> {
        self.resource.refresh(node_id).await
    }

    pub fn is_outdated(&self, node_id: &NodeId) -> bool {
        self.resource.is_outdated(node_id)
    }

    pub fn is_loaded(&self, node_id: &NodeId) -> bool {
        self.resource.is_loaded(node_id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResourceEvent<NodeId>> {
        self.resource.subscribe()
    }

    /// `node_id` followed by every id reachable through cached child lists,
    /// breadth first. Nothing is fetched.
    ///
    /// A node reached twice means the cached data has a cycle; it is skipped
    /// with a warning. The walk also stops at the configured depth and returns
    /// what it collected so far.
    pub fn get_nested_children(&self, node_id: &NodeId) -> Vec<NodeId> {
        let mut collected = vec![node_id.clone()];
        let mut seen: HashSet<NodeId> = HashSet::from([node_id.clone()]);
        let mut queue: VecDeque<(NodeId, usize)> = VecDeque::from([(node_id.clone(), 0)]);

        while let Some((parent_id, depth)) = queue.pop_front() {
            let Some(children) = self.resource.get(&parent_id) else {
                continue;
            };
            if depth >= self.max_walk_depth {
                tracing::warn!(node_id = %parent_id, depth, "subtree walk depth cap reached");
                continue;
            }
            for child in children {
                if !seen.insert(child.clone()) {
                    tracing::warn!(node_id = %child, parent_id = %parent_id, "cycle in cached tree");
                    continue;
                }
                collected.push(child.clone());
                queue.push_back((child, depth + 1));
            }
        }

        collected
    }

    /// Mark `node_id` and its cached subtree outdated in one batch.
    pub fn mark_outdated(&self, node_id: &NodeId) {
        let subtree = self.get_nested_children(node_id);
        self.resource.mark_outdated_many(&subtree);
    }

    pub fn mark_outdated_many(&self, node_ids: &[NodeId]) {
        self.resource.mark_outdated_many(node_ids);
    }

    /// Remove `node_id` and its cached subtree.
    pub fn delete(&self, node_id: &NodeId) {
        let subtree = self.get_nested_children(node_id);
        self.resource.delete_many(&subtree);
    }
}
