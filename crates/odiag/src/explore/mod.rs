//! The two traversal engines.
//!
//! [`sync::SyncExplorer`] walks the whole reachable graph with blocking reads
//! and is cycle-checked. [`async_explorer::AsyncExplorer`] drives the host's
//! asynchronous child resolution and is bounded by depth only.

pub mod async_explorer;
pub mod sync;

use odiag_config::{NestedContainers, OdiagConfig, SharedReferences, DEFAULT_LOADING_DEPTH};

pub use async_explorer::{AsyncExplorer, AsyncSnapshot};
pub use sync::SyncExplorer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExploreOptions {
    pub shared_references: SharedReferences,
    pub nested_containers: NestedContainers,
    /// Hops from a root after which the asynchronous explorer stops expanding.
    pub loading_depth: u32,
}

impl Default for ExploreOptions {
    fn default() -> Self {
        Self {
            shared_references: SharedReferences::default(),
            nested_containers: NestedContainers::default(),
            loading_depth: DEFAULT_LOADING_DEPTH,
        }
    }
}

impl From<&OdiagConfig> for ExploreOptions {
    fn from(config: &OdiagConfig) -> Self {
        Self {
            shared_references: config.shared_references,
            nested_containers: config.nested_containers,
            loading_depth: config.loading_depth,
        }
    }
}
