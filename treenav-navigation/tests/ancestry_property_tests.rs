//! Property tests for ancestor walks over arbitrary parent graphs.
//!
//! Parent pointers may form self loops or longer cycles. Every walk must
//! terminate, never repeat an id and stay within the nodes it was given.

mod support;

use std::collections::HashSet;

use proptest::prelude::*;
use support::{harness_with, id};
use treenav_core::{NavConfig, NavNodeValue, NodeContainerInfo, NodeId};
use treenav_navigation::{NavNodeRequest, NodeNavigationData, NODE_NAVIGATION_CONTEXT};
use treenav_test_utils::generators::{arb_node_id, arb_parent_graph};
use treenav_test_utils::{MockConnectionAuth, MockNavNodeFetcher, StaticPermissions};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("current-thread runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_container_info_walk_terminates(nodes in arb_parent_graph(12)) {
        let h = harness_with(
            MockNavNodeFetcher::new(),
            MockConnectionAuth::new(),
            StaticPermissions::public(),
            NavConfig::default(),
        );
        let ids: HashSet<NodeId> = nodes.iter().map(|node| node.id.clone()).collect();
        let values = nodes
            .into_iter()
            .map(|node| NavNodeValue { node, parent_id: None })
            .collect();
        runtime().block_on(h.manager.apply(NavNodeRequest::Data { values })).unwrap();

        let info = h.manager.get_node_container_info(&id("database://n0"));

        if let Some(connection_id) = info.connection_id {
            prop_assert!(ids.contains(&connection_id));
        }
    }

    #[test]
    fn prop_container_info_of_uncached_node_is_empty(node_id in arb_node_id()) {
        let h = harness_with(
            MockNavNodeFetcher::new(),
            MockConnectionAuth::new(),
            StaticPermissions::public(),
            NavConfig::default(),
        );

        prop_assert_eq!(h.manager.get_node_container_info(&node_id), NodeContainerInfo::default());
    }

    #[test]
    fn prop_get_parents_terminates_without_repeats(
        nodes in arb_parent_graph(12),
        depth in 1usize..8,
    ) {
        let h = harness_with(
            MockNavNodeFetcher::new(),
            MockConnectionAuth::new(),
            StaticPermissions::public(),
            NavConfig::default().with_max_walk_depth(depth),
        );
        let ids: HashSet<NodeId> = nodes.iter().map(|node| node.id.clone()).collect();
        let start = nodes[0].clone();
        let values = nodes
            .into_iter()
            .map(|node| NavNodeValue { node, parent_id: None })
            .collect();

        let parents = runtime().block_on(async {
            h.manager.apply(NavNodeRequest::Data { values }).await?;
            let outcome = h
                .manager
                .navigate_to(NodeNavigationData::open(start.id.clone(), start.parent_id.clone()))
                .await?;
            let context = outcome.contexts().get(&*NODE_NAVIGATION_CONTEXT)?;
            Ok::<_, treenav_core::NavError>(context.get_parents())
        }).unwrap();

        prop_assert!(parents.len() <= depth);
        let unique: HashSet<&NodeId> = parents.iter().collect();
        prop_assert_eq!(unique.len(), parents.len());
        prop_assert!(!parents.contains(&start.id));
        for parent in &parents {
            prop_assert!(ids.contains(parent));
        }
    }
}
