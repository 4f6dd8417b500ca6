//! Error types for the blueprint crate

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating recipe data
#[derive(Error, Debug)]
pub enum Error {
    /// An install mechanism has no matching privilege entry
    #[error("recipe '{tool}' has no needs_sudo entry for install mechanism '{mechanism}'")]
    MissingPrivilege { tool: String, mechanism: String },

    /// Recipe is structurally invalid
    #[error("recipe '{tool}': {message}")]
    InvalidRecipe { tool: String, message: String },

    /// The same id appears twice in one catalog source
    #[error("duplicate recipe id '{0}'")]
    DuplicateRecipe(String),

    /// Step graph references an unknown or duplicate step id
    #[error("invalid step graph: {reason}")]
    InvalidGraph { reason: String },

    /// Step graph contains a dependency cycle
    #[error("dependency cycle detected involving: {}", .nodes.join(", "))]
    CycleDetected { nodes: Vec<String> },

    /// Catalog file could not be parsed
    #[error("failed to parse catalog {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for blueprint operations
pub type Result<T> = std::result::Result<T, Error>;
