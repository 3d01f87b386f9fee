//! treenav Context - Data Context
//!
//! A typed, identity-keyed registry used to hand values (the node being
//! navigated, the active table model, ...) through the navigation pipeline
//! without a fixed parameter list.
//!
//! - [`DataContextGetter`]: the typed token naming one slot
//! - [`DataContext`]: a layer of versioned values with a fallback chain
//! - [`DynamicDataContext`]: an overlay whose sets can be undone in one step

mod data_context;
mod dynamic;
mod getter;

pub use data_context::{DataContext, DeleteCallback};
pub use dynamic::DynamicDataContext;
pub use getter::DataContextGetter;
