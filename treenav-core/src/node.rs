//! Navigation node model

use crate::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// FEATURES
// ============================================================================

/// Feature flags a node may carry.
///
/// Serialized with the names the navigation service reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectFeature {
    /// Node is a connection (data source)
    DataSource,
    /// Connection node whose connection is currently open
    DataSourceConnected,
    Catalog,
    Schema,
    /// Node holds rows that can be shown in a data view
    DataContainer,
    /// Node groups child objects that can be queried
    Container,
    Entity,
    Script,
}

// ============================================================================
// NAV NODE
// ============================================================================

/// Flat node metadata as returned by the node-info fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavNode {
    pub id: NodeId,
    pub parent_id: NodeId,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Synthetic grouping node rather than a database object
    #[serde(default)]
    pub folder: bool,
    #[serde(default)]
    pub has_children: bool,
    #[serde(default)]
    pub object_features: BTreeSet<ObjectFeature>,
}

impl NavNode {
    pub fn new(id: impl Into<NodeId>, parent_id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.into(),
            name: name.into(),
            icon: None,
            node_type: None,
            description: None,
            folder: false,
            has_children: false,
            object_features: BTreeSet::new(),
        }
    }

    /// The root node, whose parent is itself.
    pub fn root() -> Self {
        let mut node = Self::new(NodeId::root(), NodeId::root(), "root");
        node.has_children = true;
        node
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_node_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }

    pub fn with_folder(mut self, folder: bool) -> Self {
        self.folder = folder;
        self
    }

    pub fn with_children(mut self, has_children: bool) -> Self {
        self.has_children = has_children;
        self
    }

    pub fn with_feature(mut self, feature: ObjectFeature) -> Self {
        self.object_features.insert(feature);
        self
    }

    pub fn has_feature(&self, feature: ObjectFeature) -> bool {
        self.object_features.contains(&feature)
    }

    /// True when the parent pointer loops back on the node itself
    /// (the root sentinel, or malformed data).
    pub fn is_self_parent(&self) -> bool {
        self.id == self.parent_id
    }

    /// Whether a data-bearing view makes sense for this node.
    pub fn has_data(&self) -> bool {
        self.has_feature(ObjectFeature::DataContainer) || self.has_feature(ObjectFeature::Container)
    }
}

// ============================================================================
// KEYS AND REQUEST SHAPES
// ============================================================================

/// Node id together with the parent it is displayed under.
///
/// The parent here is authoritative: the tree, not the flat node fetch,
/// decides parentage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavNodeKey {
    pub node_id: NodeId,
    pub parent_id: NodeId,
}

impl NavNodeKey {
    pub fn new(node_id: impl Into<NodeId>, parent_id: impl Into<NodeId>) -> Self {
        Self {
            node_id: node_id.into(),
            parent_id: parent_id.into(),
        }
    }
}

/// A node value pushed from outside together with an optional parent override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavNodeValue {
    pub node: NavNode,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
}

/// Nearest connection / catalog / schema above a node.
///
/// `connection_id` is the connection node id; catalog and schema are node
/// names, which is what database calls expect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeContainerInfo {
    pub connection_id: Option<NodeId>,
    pub catalog_id: Option<String>,
    pub schema_id: Option<String>,
}

impl NodeContainerInfo {
    pub fn is_complete(&self) -> bool {
        self.connection_id.is_some() && self.catalog_id.is_some() && self.schema_id.is_some()
    }
}

/// Kind of navigation being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NavigationType {
    #[default]
    Open,
    CloseConnection,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_is_self_parent() {
        let root = NavNode::root();
        assert!(root.is_self_parent());
        assert!(root.id.is_root());
    }

    #[test]
    fn test_has_data_features() {
        let table = NavNode::new("database://c/t", "database://c", "t")
            .with_feature(ObjectFeature::DataContainer);
        let schema = NavNode::new("database://c/s", "database://c", "s")
            .with_feature(ObjectFeature::Schema)
            .with_feature(ObjectFeature::Container);
        let folder = NavNode::new("database://c/f", "database://c", "Tables").with_folder(true);

        assert!(table.has_data());
        assert!(schema.has_data());
        assert!(!folder.has_data());
    }

    #[test]
    fn test_node_deserializes_from_service_shape() {
        let json = r#"{
            "id": "database://pg-main",
            "parentId": "",
            "name": "Main",
            "icon": "postgres",
            "folder": false,
            "objectFeatures": ["dataSource", "dataSourceConnected"]
        }"#;
        let node: NavNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.id, NodeId::from("database://pg-main"));
        assert!(node.parent_id.is_root());
        assert!(node.has_feature(ObjectFeature::DataSource));
        assert!(node.has_feature(ObjectFeature::DataSourceConnected));
        assert!(!node.has_children);
    }

    #[test]
    fn test_container_info_completeness() {
        let mut info = NodeContainerInfo::default();
        assert!(!info.is_complete());
        info.connection_id = Some(NodeId::from("database://c"));
        info.catalog_id = Some("app".to_string());
        info.schema_id = Some("public".to_string());
        assert!(info.is_complete());
    }
}
