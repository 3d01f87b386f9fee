//! treenav Test Utilities
//!
//! Shared test infrastructure for the treenav workspace:
//! - In-memory mocks for every collaborator trait
//! - A sample database tree fixture
//! - Proptest generators for node graphs
//! - Tracing setup for tests

pub use treenav_core::{
    Connection, ConnectionAuthenticator, NavError, NavNode, NavNodeFetcher, NavResult,
    NavigationError, NodeId, Notifier, ObjectFeature, Permission, PermissionGate,
};

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// TRACING
// ============================================================================

/// Install a fmt subscriber honoring `RUST_LOG`. Safe to call from every test.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MOCK NODE FETCHER
// ============================================================================

/// In-memory navigation service.
///
/// Every call yields to the scheduler once before answering, so concurrent
/// callers genuinely overlap.
#[derive(Debug, Default)]
pub struct MockNavNodeFetcher {
    children: Mutex<HashMap<NodeId, Vec<NodeId>>>,
    nodes: Mutex<HashMap<NodeId, NavNode>>,
    misreported_parents: Mutex<HashMap<NodeId, NodeId>>,
    info_requests: Mutex<Vec<Vec<NodeId>>>,
    refreshed: Mutex<Vec<NodeId>>,
    fail_children: AtomicBool,
    fail_node_info: AtomicBool,
    fail_refresh: AtomicBool,
    pub children_calls: AtomicUsize,
    pub info_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
}

impl MockNavNodeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node and append it to its parent's child list.
    pub fn add_node(&self, node: NavNode) {
        if !node.is_self_parent() {
            self.push_child(node.parent_id.clone(), node.id.clone());
        }
        self.set_node(node);
    }

    /// Replace metadata without touching the tree structure.
    pub fn set_node(&self, node: NavNode) {
        lock(&self.nodes).insert(node.id.clone(), node);
    }

    pub fn set_children(&self, parent_id: NodeId, children: Vec<NodeId>) {
        lock(&self.children).insert(parent_id, children);
    }

    pub fn push_child(&self, parent_id: NodeId, child_id: NodeId) {
        lock(&self.children).entry(parent_id).or_default().push(child_id);
    }

    /// Make the info fetch report `parent_id` as the parent of `node_id`.
    pub fn misreport_parent(&self, node_id: NodeId, parent_id: NodeId) {
        lock(&self.misreported_parents).insert(node_id, parent_id);
    }

    pub fn fail_children(&self, fail: bool) {
        self.fail_children.store(fail, Ordering::SeqCst);
    }

    pub fn fail_node_info(&self, fail: bool) {
        self.fail_node_info.store(fail, Ordering::SeqCst);
    }

    pub fn fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    /// Id batches passed to `fetch_node_info`, in call order.
    pub fn info_requests(&self) -> Vec<Vec<NodeId>> {
        lock(&self.info_requests).clone()
    }

    /// Paths passed to `refresh_node`, in call order.
    pub fn refreshed(&self) -> Vec<NodeId> {
        lock(&self.refreshed).clone()
    }
}

#[async_trait]
impl NavNodeFetcher for MockNavNodeFetcher {
    async fn fetch_children(&self, parent_id: &NodeId) -> NavResult<Vec<NodeId>> {
        self.children_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_children.load(Ordering::SeqCst) {
            return Err(NavError::request_failed("navNodeChildren", "injected failure"));
        }
        Ok(lock(&self.children).get(parent_id).cloned().unwrap_or_default())
    }

    async fn fetch_node_info(&self, ids: &[NodeId]) -> NavResult<Vec<NavNode>> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.info_requests).push(ids.to_vec());
        tokio::task::yield_now().await;
        if self.fail_node_info.load(Ordering::SeqCst) {
            return Err(NavError::request_failed("navNodeInfo", "injected failure"));
        }
        let nodes = lock(&self.nodes);
        let misreported = lock(&self.misreported_parents);
        Ok(ids
            .iter()
            .filter_map(|id| nodes.get(id).cloned())
            .map(|mut node| {
                if let Some(parent_id) = misreported.get(&node.id) {
                    node.parent_id = parent_id.clone();
                }
                node
            })
            .collect())
    }

    async fn refresh_node(&self, path: &NodeId) -> NavResult<()> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.refreshed).push(path.clone());
        tokio::task::yield_now().await;
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(NavError::request_failed("navRefreshNode", "injected failure"));
        }
        Ok(())
    }
}

// ============================================================================
// MOCK COLLABORATORS
// ============================================================================

/// Connection authenticator with per-connection outcomes.
/// Unknown connections authenticate and report `connected = true`.
#[derive(Debug, Default)]
pub struct MockConnectionAuth {
    failing: Mutex<HashSet<String>>,
    disconnected: Mutex<HashSet<String>>,
    attempts: Mutex<Vec<String>>,
}

impl MockConnectionAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authentication for `connection_id` raises an error.
    pub fn with_failure(self, connection_id: impl Into<String>) -> Self {
        lock(&self.failing).insert(connection_id.into());
        self
    }

    /// Authentication for `connection_id` succeeds but the connection stays closed.
    pub fn with_disconnected(self, connection_id: impl Into<String>) -> Self {
        lock(&self.disconnected).insert(connection_id.into());
        self
    }

    pub fn attempts(&self) -> Vec<String> {
        lock(&self.attempts).clone()
    }
}

#[async_trait]
impl ConnectionAuthenticator for MockConnectionAuth {
    async fn authenticate(&self, connection_id: &str) -> NavResult<Connection> {
        lock(&self.attempts).push(connection_id.to_string());
        tokio::task::yield_now().await;
        if lock(&self.failing).contains(connection_id) {
            return Err(NavError::Navigation(NavigationError::AuthenticationFailed {
                connection_id: connection_id.to_string(),
                reason: "invalid credentials".to_string(),
            }));
        }
        Ok(Connection {
            id: connection_id.to_string(),
            connected: !lock(&self.disconnected).contains(connection_id),
        })
    }
}

/// Notifier that keeps every report.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    reports: Mutex<Vec<(NavError, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(NavError, String)> {
        lock(&self.reports).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn log_exception(&self, error: &NavError, message_key: &str) {
        lock(&self.reports).push((error.clone(), message_key.to_string()));
    }
}

/// Permission gate over a fixed set of granted flags.
#[derive(Debug, Clone, Default)]
pub struct StaticPermissions {
    granted: HashSet<Permission>,
}

impl StaticPermissions {
    pub fn new(granted: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            granted: granted.into_iter().collect(),
        }
    }

    pub fn public() -> Self {
        Self::new([Permission::Public])
    }

    pub fn none() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PermissionGate for StaticPermissions {
    async fn has_permission(&self, permission: Permission) -> bool {
        self.granted.contains(&permission)
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Node ids and the sample tree used across crates.

    use super::*;

    pub const PG: &str = "database://pg";
    pub const PG_CATALOG: &str = "database://pg/app";
    pub const PG_SCHEMA: &str = "database://pg/app/public";
    pub const PG_TABLES: &str = "database://pg/app/public/tables";
    pub const PG_USERS: &str = "database://pg/app/public/tables/users";
    pub const PG_VIEWS: &str = "database://pg/app/public/tables/views";
    pub const MYSQL: &str = "database://mysql";
    pub const MYSQL_SCHEMA: &str = "database://mysql/shop";
    pub const MYSQL_ORDERS: &str = "database://mysql/shop/orders";
    pub const SCRIPTS: &str = "resource://scripts";

    /// Two connections under the root:
    ///
    /// ```text
    /// <root>
    /// ├── database://pg                       connection
    /// │   └── app                             catalog
    /// │       └── public                      schema
    /// │           └── tables                  folder
    /// │               ├── users               table
    /// │               └── views               folder
    /// ├── database://mysql                    connection
    /// │   └── shop                            schema
    /// │       └── orders                      table
    /// └── resource://scripts                  folder, not a database object
    /// ```
    pub fn sample_tree() -> MockNavNodeFetcher {
        let fetcher = MockNavNodeFetcher::new();
        fetcher.set_node(NavNode::root());

        let root = NodeId::root();
        fetcher.add_node(
            NavNode::new(PG, root.clone(), "pg")
                .with_icon("postgres")
                .with_node_type("connection")
                .with_children(true)
                .with_feature(ObjectFeature::DataSource),
        );
        fetcher.add_node(
            NavNode::new(PG_CATALOG, PG, "app")
                .with_icon("catalog")
                .with_children(true)
                .with_feature(ObjectFeature::Catalog),
        );
        fetcher.add_node(
            NavNode::new(PG_SCHEMA, PG_CATALOG, "public")
                .with_icon("schema")
                .with_children(true)
                .with_feature(ObjectFeature::Schema)
                .with_feature(ObjectFeature::Container),
        );
        fetcher.add_node(
            NavNode::new(PG_TABLES, PG_SCHEMA, "Tables")
                .with_icon("folder")
                .with_folder(true)
                .with_children(true),
        );
        fetcher.add_node(
            NavNode::new(PG_USERS, PG_TABLES, "users")
                .with_icon("table")
                .with_feature(ObjectFeature::Entity)
                .with_feature(ObjectFeature::DataContainer),
        );
        fetcher.add_node(
            NavNode::new(PG_VIEWS, PG_TABLES, "Views")
                .with_icon("folder")
                .with_folder(true),
        );
        fetcher.add_node(
            NavNode::new(MYSQL, root.clone(), "mysql")
                .with_icon("mysql")
                .with_node_type("connection")
                .with_children(true)
                .with_feature(ObjectFeature::DataSource),
        );
        fetcher.add_node(
            NavNode::new(MYSQL_SCHEMA, MYSQL, "shop")
                .with_icon("schema")
                .with_children(true)
                .with_feature(ObjectFeature::Schema),
        );
        fetcher.add_node(
            NavNode::new(MYSQL_ORDERS, MYSQL_SCHEMA, "orders")
                .with_icon("table")
                .with_feature(ObjectFeature::Entity)
                .with_feature(ObjectFeature::DataContainer),
        );
        fetcher.add_node(
            NavNode::new(SCRIPTS, root, "Scripts")
                .with_icon("folder")
                .with_folder(true),
        );

        fetcher
    }
}

pub use fixtures::sample_tree;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for node identities and node graphs.

    use super::*;
    use proptest::prelude::*;

    /// Database object ids of up to four path segments.
    pub fn arb_node_id() -> impl Strategy<Value = NodeId> {
        proptest::collection::vec("[a-z][a-z0-9_]{0,7}", 1..=4)
            .prop_map(|segments| NodeId::new(format!("database://{}", segments.join("/"))))
    }

    pub fn arb_object_feature() -> impl Strategy<Value = ObjectFeature> {
        prop_oneof![
            Just(ObjectFeature::DataSource),
            Just(ObjectFeature::DataSourceConnected),
            Just(ObjectFeature::Catalog),
            Just(ObjectFeature::Schema),
            Just(ObjectFeature::DataContainer),
            Just(ObjectFeature::Container),
            Just(ObjectFeature::Entity),
            Just(ObjectFeature::Script),
        ]
    }

    /// `n0..nN` with arbitrary parent pointers, including self loops and
    /// longer cycles. `n0` may also point at the root.
    pub fn arb_parent_graph(max_nodes: usize) -> impl Strategy<Value = Vec<NavNode>> {
        (1..=max_nodes.max(1)).prop_flat_map(|count| {
            (
                proptest::collection::vec(0..=count, count),
                proptest::collection::vec(proptest::collection::btree_set(arb_object_feature(), 0..3), count),
            )
                .prop_map(move |(parents, features)| {
                    parents
                        .into_iter()
                        .zip(features)
                        .enumerate()
                        .map(|(index, (parent, features))| {
                            let parent_id = if parent == count {
                                NodeId::root()
                            } else {
                                NodeId::new(format!("database://n{parent}"))
                            };
                            let mut node = NavNode::new(
                                format!("database://n{index}"),
                                parent_id,
                                format!("n{index}"),
                            );
                            node.object_features = features;
                            node
                        })
                        .collect()
                })
        })
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over `NavResult` error variants.

    use super::*;

    #[track_caller]
    pub fn assert_fetch_failure<T: std::fmt::Debug>(result: &NavResult<T>) {
        match result {
            Err(NavError::Fetch(_)) => {}
            other => panic!("Expected Fetch error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_navigation_error<T: std::fmt::Debug>(result: &NavResult<T>) {
        match result {
            Err(NavError::Navigation(_)) => {}
            other => panic!("Expected Navigation error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_context_error<T: std::fmt::Debug>(result: &NavResult<T>) {
        match result {
            Err(NavError::Context(_)) => {}
            other => panic!("Expected Context error, got: {:?}", other),
        }
    }
}
