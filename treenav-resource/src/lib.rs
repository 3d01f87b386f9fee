//! treenav Resource - Invalidating Caches
//!
//! [`CachedResource`] is the generic lazy cache with per-key request
//! coalescing and explicit staleness. [`NodeTreeResource`] and
//! [`NodeInfoResource`] specialize it for the navigation tree.

mod cached;
mod node_info;
mod node_tree;
mod traits;

pub use cached::CachedResource;
pub use node_info::NodeInfoResource;
pub use node_tree::NodeTreeResource;
pub use traits::{ResourceEvent, ResourceKey, ResourceLoader};
