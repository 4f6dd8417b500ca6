//! Error types for plan execution.
//!
//! A failing step is not an error: it is recorded in the execution result.
//! These variants cover plans that must not start and broken state.

use crate::store::PlanStatus;
use std::path::PathBuf;

/// Result type alias for execution operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that stop a plan from running at all.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Step graph references unknown or duplicate ids.
    #[error("invalid step graph: {reason}")]
    InvalidGraph { reason: String },

    /// Step graph has a cycle; nothing was executed.
    #[error("dependency cycle detected involving: {}", .nodes.join(", "))]
    CycleDetected { nodes: Vec<String> },

    /// Plan carries a resolution error or an invalid risk summary.
    #[error("plan cannot be executed: {reason}")]
    InvalidPlan { reason: String },

    /// No record with this id.
    #[error("no plan with id '{0}'")]
    UnknownPlan(String),

    /// Record is in a state that cannot continue.
    #[error("plan '{id}' is {status} and cannot be resumed")]
    NotResumable { id: String, status: PlanStatus },

    /// The confirmation gate was not acknowledged.
    #[error("confirmation declined")]
    GateDeclined,

    /// Reading or writing the state store failed.
    #[error("state store error at {}: {source}", .path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record could not be encoded or decoded.
    #[error("invalid plan record: {0}")]
    Record(#[from] serde_json::Error),

    /// Worker pool could not be created.
    #[error("failed to create worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    /// Other data model error.
    #[error(transparent)]
    Model(blueprint::Error),
}

impl From<blueprint::Error> for Error {
    fn from(err: blueprint::Error) -> Self {
        match err {
            blueprint::Error::InvalidGraph { reason } => Self::InvalidGraph { reason },
            blueprint::Error::CycleDetected { nodes } => Self::CycleDetected { nodes },
            blueprint::Error::Json(source) => Self::Record(source),
            other => Self::Model(other),
        }
    }
}

impl Error {
    pub(crate) fn store(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Store {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_errors_map_to_own_variants() {
        let err = Error::from(blueprint::Error::CycleDetected {
            nodes: vec!["a".into(), "b".into()],
        });
        assert!(matches!(err, Error::CycleDetected { ref nodes } if nodes.len() == 2));
        assert_eq!(err.to_string(), "dependency cycle detected involving: a, b");
    }

    #[test]
    fn test_not_resumable_message() {
        let err = Error::NotResumable {
            id: "abc".into(),
            status: PlanStatus::Done,
        };
        assert_eq!(err.to_string(), "plan 'abc' is done and cannot be resumed");
    }
}
