//! Node manager operations over the sample tree.

mod support;

use std::sync::atomic::Ordering;

use support::{harness, harness_with, id};
use treenav_core::{NavConfig, NavError, NavNode, NavNodeKey, NavNodeValue, NodeContainerInfo, NodeId};
use treenav_navigation::{assemble, Collaborators, NavNodeRequest};
use treenav_test_utils::assertions::assert_fetch_failure;
use treenav_test_utils::fixtures::*;
use treenav_test_utils::{
    sample_tree, MockConnectionAuth, MockNavNodeFetcher, RecordingNotifier, StaticPermissions,
};

// ============================================================================
// NODES
// ============================================================================

#[tokio::test]
async fn test_load_nodes_uses_requested_parents() {
    let h = harness();
    h.fetcher.misreport_parent(id(PG_CATALOG), id("database://wrong"));
    h.fetcher.misreport_parent(id(MYSQL_SCHEMA), id("database://wrong"));

    let nodes = h
        .manager
        .load_nodes(&[
            NavNodeKey::new(PG_CATALOG, "database://p1"),
            NavNodeKey::new(MYSQL_SCHEMA, "database://p2"),
        ])
        .await
        .unwrap();

    assert_eq!(nodes[0].id, id(PG_CATALOG));
    assert_eq!(nodes[0].parent_id, id("database://p1"));
    assert_eq!(nodes[1].parent_id, id("database://p2"));
    assert_eq!(h.manager.get_node(&id(PG_CATALOG)).unwrap().parent_id, id("database://p1"));
    assert_eq!(h.fetcher.info_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_load_node_single() {
    let h = harness();
    let node = h.manager.load_node(&NavNodeKey::new(PG, NodeId::root())).await.unwrap();
    assert_eq!(node.name, "pg");
    assert_eq!(
        h.manager.get_nodes(&[NavNodeKey::new(PG, NodeId::root()), NavNodeKey::new(MYSQL, NodeId::root())]),
        vec![Some(node), None]
    );
}

#[tokio::test]
async fn test_load_failure_keeps_stale_node() {
    let h = harness();
    let key = NavNodeKey::new(PG, NodeId::root());
    h.manager.load_node(&key).await.unwrap();
    h.manager.info().mark_outdated(&id(PG));
    h.fetcher.fail_node_info(true);

    let result = h.manager.load_node(&key).await;

    assert_fetch_failure(&result);
    assert_eq!(h.manager.get_node(&id(PG)).unwrap().name, "pg");

    h.fetcher.fail_node_info(false);
    h.manager.load_node(&key).await.unwrap();
    assert!(!h.manager.info().is_outdated(&id(PG)));
}

#[tokio::test]
async fn test_remove_node_and_get_parent() {
    let h = harness();
    h.manager
        .load_nodes(&[NavNodeKey::new(PG, NodeId::root()), NavNodeKey::new(PG_CATALOG, PG)])
        .await
        .unwrap();

    let catalog = h.manager.get_node(&id(PG_CATALOG)).unwrap();
    assert_eq!(h.manager.get_parent(&catalog).unwrap().id, id(PG));

    h.manager.remove_node(&id(PG));
    assert!(h.manager.get_node(&id(PG)).is_none());
    assert!(h.manager.get_parent(&catalog).is_none());
}

#[tokio::test]
async fn test_refresh_node_refetches() {
    let h = harness();
    h.manager.load_node(&NavNodeKey::new(PG, NodeId::root())).await.unwrap();
    h.fetcher.set_node(NavNode::new(PG, NodeId::root(), "pg-renamed"));

    let node = h.manager.refresh_node(&id(PG)).await.unwrap();

    assert_eq!(node.name, "pg-renamed");
    assert_eq!(h.manager.get_node(&id(PG)).unwrap().name, "pg-renamed");
}

#[tokio::test]
async fn test_is_node_has_data() {
    let h = harness();
    h.manager
        .load_nodes(&[
            NavNodeKey::new(PG_USERS, PG_TABLES),
            NavNodeKey::new(PG_TABLES, PG_SCHEMA),
            NavNodeKey::new(PG_SCHEMA, PG_CATALOG),
        ])
        .await
        .unwrap();

    assert!(h.manager.is_node_has_data(&id(PG_USERS)));
    assert!(h.manager.is_node_has_data(&id(PG_SCHEMA)));
    assert!(!h.manager.is_node_has_data(&id(PG_TABLES)));
    assert!(!h.manager.is_node_has_data(&id("database://unknown")));
}

// ============================================================================
// REQUEST SHAPES
// ============================================================================

#[tokio::test]
async fn test_apply_request_shapes() {
    let h = harness();

    h.manager
        .apply(NavNodeRequest::Ids {
            ids: vec![id(PG), id(MYSQL)],
            remove: false,
        })
        .await
        .unwrap();
    assert!(h.manager.get_node(&id(MYSQL)).is_some());

    h.manager
        .apply(NavNodeRequest::Ids {
            ids: vec![id(MYSQL)],
            remove: true,
        })
        .await
        .unwrap();
    assert!(h.manager.get_node(&id(MYSQL)).is_none());

    h.manager
        .apply(NavNodeRequest::Path {
            nodes: vec![NavNodeKey::new(PG_CATALOG, "database://shown-under")],
            remove: false,
        })
        .await
        .unwrap();
    assert_eq!(
        h.manager.get_node(&id(PG_CATALOG)).unwrap().parent_id,
        id("database://shown-under")
    );

    h.manager
        .apply(NavNodeRequest::Data {
            values: vec![NavNodeValue {
                node: NavNode::new("database://pushed", "database://x", "pushed"),
                parent_id: Some(id(PG)),
            }],
        })
        .await
        .unwrap();
    assert_eq!(h.manager.get_node(&id("database://pushed")).unwrap().parent_id, id(PG));

    h.manager
        .apply(NavNodeRequest::Path {
            nodes: vec![NavNodeKey::new(PG_CATALOG, PG)],
            remove: true,
        })
        .await
        .unwrap();
    assert!(h.manager.get_node(&id(PG_CATALOG)).is_none());
}

// ============================================================================
// CONTAINER INFO
// ============================================================================

#[tokio::test]
async fn test_container_info_full_chain() {
    let h = harness();
    h.manager
        .load_nodes(&[
            NavNodeKey::new(PG, NodeId::root()),
            NavNodeKey::new(PG_CATALOG, PG),
            NavNodeKey::new(PG_SCHEMA, PG_CATALOG),
        ])
        .await
        .unwrap();

    let info = h.manager.get_node_container_info(&id(PG_SCHEMA));

    assert_eq!(
        info,
        NodeContainerInfo {
            connection_id: Some(id(PG)),
            catalog_id: Some("app".to_string()),
            schema_id: Some("public".to_string()),
        }
    );
    assert!(info.is_complete());
}

#[tokio::test]
async fn test_container_info_without_catalog() {
    let h = harness();
    h.manager
        .load_nodes(&[
            NavNodeKey::new(MYSQL, NodeId::root()),
            NavNodeKey::new(MYSQL_SCHEMA, MYSQL),
            NavNodeKey::new(MYSQL_ORDERS, MYSQL_SCHEMA),
        ])
        .await
        .unwrap();

    let info = h.manager.get_node_container_info(&id(MYSQL_ORDERS));

    assert_eq!(info.connection_id, Some(id(MYSQL)));
    assert_eq!(info.catalog_id, None);
    assert_eq!(info.schema_id, Some("shop".to_string()));
}

#[tokio::test]
async fn test_container_info_terminates_on_cycle() {
    let h = harness();
    h.manager.info().set(NavNodeValue {
        node: NavNode::new("database://a", "database://b", "a"),
        parent_id: None,
    });
    h.manager.info().set(NavNodeValue {
        node: NavNode::new("database://b", "database://a", "b"),
        parent_id: None,
    });

    assert_eq!(
        h.manager.get_node_container_info(&id("database://a")),
        NodeContainerInfo::default()
    );
}

// ============================================================================
// TREE
// ============================================================================

#[tokio::test]
async fn test_refresh_tree_resyncs_and_cascades() {
    let h = harness();
    let root = NodeId::root();
    h.manager.load_tree(&root).await.unwrap();
    h.manager.load_tree(&id(PG)).await.unwrap();
    h.manager.load_tree(&id(PG_CATALOG)).await.unwrap();
    h.fetcher.push_child(id(PG), id("database://pg/archive"));

    let children = h.manager.refresh_tree(&id(PG)).await.unwrap();

    assert_eq!(children, vec![id(PG_CATALOG), id("database://pg/archive")]);
    assert_eq!(h.fetcher.refreshed(), vec![id(PG)]);
    assert!(!h.manager.tree().is_outdated(&id(PG)));
    assert!(h.manager.tree().is_outdated(&id(PG_CATALOG)));
    assert!(!h.manager.tree().is_outdated(&root));
}

#[tokio::test]
async fn test_refresh_tree_marks_node_infos_outdated() {
    let h = harness();
    h.manager.load_tree(&id(PG)).await.unwrap();
    h.manager.load_tree(&id(PG_CATALOG)).await.unwrap();
    h.manager.load_node(&NavNodeKey::new(PG_CATALOG, PG)).await.unwrap();
    let calls = h.fetcher.info_calls.load(Ordering::SeqCst);

    h.manager.refresh_tree(&id(PG)).await.unwrap();
    assert!(h.manager.info().is_outdated(&id(PG_CATALOG)));

    h.manager.load_node(&NavNodeKey::new(PG_CATALOG, PG)).await.unwrap();
    assert_eq!(h.fetcher.info_calls.load(Ordering::SeqCst), calls + 1);
}

#[tokio::test]
async fn test_refresh_tree_failure_leaves_tree_untouched() {
    let h = harness();
    h.manager.load_tree(&id(PG)).await.unwrap();
    h.fetcher.fail_refresh(true);

    let result = h.manager.refresh_tree(&id(PG)).await;

    assert_fetch_failure(&result);
    assert!(!h.manager.tree().is_outdated(&id(PG)));
}

#[tokio::test]
async fn test_refresh_tree_children_failure_keeps_stale_children() {
    let h = harness();
    h.manager.load_tree(&id(PG)).await.unwrap();
    h.fetcher.fail_children(true);

    let result = h.manager.refresh_tree(&id(PG)).await;

    assert_fetch_failure(&result);
    assert_eq!(h.manager.get_tree(&id(PG)), Some(vec![id(PG_CATALOG)]));
    assert!(h.manager.tree().is_outdated(&id(PG)));

    h.fetcher.fail_children(false);
    assert_eq!(h.manager.load_tree(&id(PG)).await.unwrap(), vec![id(PG_CATALOG)]);
    assert!(!h.manager.tree().is_outdated(&id(PG)));
}

#[tokio::test]
async fn test_remove_tree_drops_subtree() {
    let h = harness();
    let root = NodeId::root();
    h.manager.load_tree(&root).await.unwrap();
    h.manager.load_tree(&id(PG)).await.unwrap();

    h.manager.remove_tree(&root);

    assert!(h.manager.get_tree(&root).is_none());
    assert!(h.manager.get_tree(&id(PG)).is_none());
    assert_eq!(
        h.manager.get_trees(&[NavNodeKey::new(PG, NodeId::root())]),
        vec![None]
    );
}

#[tokio::test]
async fn test_update_root_children_with_permission() {
    let h = harness();

    h.manager.update_root_children().await.unwrap();

    assert_eq!(
        h.manager.get_tree(&NodeId::root()),
        Some(vec![id(PG), id(MYSQL), id(SCRIPTS)])
    );
}

#[tokio::test]
async fn test_update_root_children_without_permission() {
    let h = harness_with(
        sample_tree(),
        MockConnectionAuth::new(),
        StaticPermissions::none(),
        NavConfig::default(),
    );
    h.manager.load_tree(&NodeId::root()).await.unwrap();
    h.manager.load_tree(&id(PG)).await.unwrap();

    h.manager.update_root_children().await.unwrap();

    assert!(h.manager.get_tree(&NodeId::root()).is_none());
    assert!(h.manager.get_tree(&id(PG)).is_none());
}

// ============================================================================
// COMPOSITION ROOT
// ============================================================================

#[test]
fn test_assemble_rejects_invalid_config() {
    let result = assemble(
        Collaborators {
            fetcher: std::sync::Arc::new(MockNavNodeFetcher::new()),
            authenticator: std::sync::Arc::new(MockConnectionAuth::new()),
            notifier: std::sync::Arc::new(RecordingNotifier::new()),
            permissions: std::sync::Arc::new(StaticPermissions::public()),
        },
        NavConfig::default().with_max_walk_depth(0),
    );

    assert!(matches!(result, Err(NavError::Config(_))));
}
