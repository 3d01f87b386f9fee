//! Configuration types

use crate::{ConfigError, NavError, NavResult, Permission};
use serde::{Deserialize, Serialize};

/// Master configuration for the node cache and navigation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavConfig {
    /// Maximum number of parent hops an ancestry or subtree walk may take
    /// before it is cut off as malformed.
    pub max_walk_depth: usize,
    /// Buffer size of each resource's change-notification channel.
    pub event_channel_capacity: usize,
    /// Permission required to see the children of the root node.
    pub root_permission: Permission,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            max_walk_depth: 256,
            event_channel_capacity: 64,
            root_permission: Permission::Public,
        }
    }
}

impl NavConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from `TREENAV_*` environment variables, falling back
    /// to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_walk_depth: std::env::var("TREENAV_MAX_WALK_DEPTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_walk_depth),
            event_channel_capacity: std::env::var("TREENAV_EVENT_CHANNEL_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.event_channel_capacity),
            root_permission: std::env::var("TREENAV_ROOT_PERMISSION")
                .ok()
                .and_then(|s| Permission::parse(&s))
                .unwrap_or(defaults.root_permission),
        }
    }

    pub fn with_max_walk_depth(mut self, depth: usize) -> Self {
        self.max_walk_depth = depth;
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    pub fn with_root_permission(mut self, permission: Permission) -> Self {
        self.root_permission = permission;
        self
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - max_walk_depth > 0
    /// - event_channel_capacity > 0
    pub fn validate(&self) -> NavResult<()> {
        if self.max_walk_depth == 0 {
            return Err(NavError::Config(ConfigError::InvalidValue {
                field: "max_walk_depth".to_string(),
                value: self.max_walk_depth.to_string(),
                reason: "max_walk_depth must be greater than 0".to_string(),
            }));
        }

        if self.event_channel_capacity == 0 {
            return Err(NavError::Config(ConfigError::InvalidValue {
                field: "event_channel_capacity".to_string(),
                value: self.event_channel_capacity.to_string(),
                reason: "event_channel_capacity must be greater than 0".to_string(),
            }));
        }

        Ok(())
    }
}
