//! Configuration for odiag.
//!
//! Settings are read from TOML. Every key is optional; missing keys fall back
//! to the defaults documented on each field.

mod logging;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use logging::{init_tracing, LoggingConfig};

/// Default depth budget for the asynchronous explorer.
pub const DEFAULT_LOADING_DEPTH: u32 = 5;

/// Which traversal engine builds the diagram on a suspend event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExplorerMode {
    /// Blocking field reads and method invocation, cycle-checked.
    #[default]
    Sync,
    /// Host-driven asynchronous child resolution, bounded by `loading_depth`.
    Async,
}

/// What to do when a plain object is reached again through a different path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SharedReferences {
    /// Render a tree: the second path adds nothing.
    #[default]
    DropLink,
    /// Render a graph: the second path adds a link to the already emitted node.
    LinkExisting,
}

/// Where the elements of an array/collection/map reached through a field hang.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NestedContainers {
    /// The container gets its own node, linked from the owner by field name;
    /// elements link from the container by index.
    #[default]
    Separate,
    /// The owner node stands in for the container; elements link from the
    /// owner with the field name as role.
    Inline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OdiagConfig {
    /// Whether suspend events produce snapshots at all.
    #[serde(default = "OdiagConfig::default_active")]
    pub active: bool,

    #[serde(default)]
    pub explorer: ExplorerMode,

    /// Depth budget for [`ExplorerMode::Async`]; objects this many hops from a
    /// root are rendered as leaves.
    #[serde(default = "OdiagConfig::default_loading_depth")]
    pub loading_depth: u32,

    #[serde(default)]
    pub shared_references: SharedReferences,

    #[serde(default)]
    pub nested_containers: NestedContainers,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl OdiagConfig {
    fn default_active() -> bool {
        true
    }

    fn default_loading_depth() -> u32 {
        DEFAULT_LOADING_DEPTH
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::load_from_str(&text)?;
        tracing::debug!(target: "odiag.config", path = %path.display(), "loaded config");
        Ok(config)
    }
}

impl Default for OdiagConfig {
    fn default() -> Self {
        Self {
            active: Self::default_active(),
            explorer: ExplorerMode::default(),
            loading_depth: Self::default_loading_depth(),
            shared_references: SharedReferences::default(),
            nested_containers: NestedContainers::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // Keep the message only; the default `Display` echoes a source snippet.
        let message = err.message().trim_end();
        match err.span() {
            Some(span) => Self::Toml(format!("{message} (at byte {})", span.start)),
            None => Self::Toml(message.to_string()),
        }
    }
}
