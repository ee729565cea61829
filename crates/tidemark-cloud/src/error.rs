//! Convergence engine error types

use thiserror::Error;

/// Errors raised while discovering, diffing, or rendering cloud resources
#[derive(Error, Debug)]
pub enum CloudError {
    /// A listing or tag lookup against the backend failed. The whole pass may be retried.
    #[error("Backend query failed ({operation}): {message}")]
    BackendQuery { operation: String, message: String },

    /// More than one live object matched a declared resource.
    #[error("Found {count} live {kind} objects matching {name}; refusing to pick one")]
    AmbiguousMatch {
        kind: String,
        name: String,
        count: usize,
    },

    /// The delta tried to mutate a field that cannot change in place.
    #[error("Field {field} of {kind} {name} cannot be changed in place")]
    DisallowedChange {
        kind: String,
        name: String,
        field: String,
    },

    /// A referenced task has no resolved identifier at render time.
    #[error("{task} depends on {dependency}, which has no identifier yet")]
    DependencyNotReady { task: String, dependency: String },

    /// A reference points at a task that was never declared or resolved.
    #[error("{task} requires {dependency}, which is not available")]
    MissingDependency { task: String, dependency: String },

    /// The declared references do not form a DAG.
    #[error("Cyclic dependency between tasks: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    /// The backend answered with data the engine never asked for.
    #[error("Internal consistency violation: {0}")]
    InternalConsistency(String),

    /// The task's lifecycle marker forbids the computed change.
    #[error("Lifecycle of {kind} {name} forbids this change: {message}")]
    LifecycleViolation {
        kind: String,
        name: String,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Convergence pass cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Wrap an opaque backend failure with the name of the operation that produced it
    pub fn backend(operation: impl Into<String>, err: anyhow::Error) -> Self {
        CloudError::BackendQuery {
            operation: operation.into(),
            message: format!("{:#}", err),
        }
    }

    /// Whether this error must stop the remainder of the convergence pass
    pub fn is_pass_fatal(&self) -> bool {
        matches!(
            self,
            CloudError::InternalConsistency(_) | CloudError::CyclicDependency(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
