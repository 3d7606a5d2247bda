//! Error types for the task engine, its store and the CLI.

use std::io;
use std::path::PathBuf;

use crate::fields::Entity;
use crate::task::TaskId;

/// Failures raised by engine operations.
///
/// Every rule violation is detected before anything is written, so an `Err` never leaves
/// a partial mutation behind.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: String },

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("invalid weight {weight}: must be between 1 and 100")]
    InvalidWeight { weight: i64 },

    #[error("inconsistent hierarchy: {0}")]
    InconsistentHierarchy(String),

    #[error("circular hierarchy: task {task} cannot be placed under task {parent}")]
    CircularHierarchy { task: TaskId, parent: TaskId },

    #[error("member '{member}' holds no active assignment on project {project}")]
    NotAMember { member: String, project: u64 },

    #[error("cannot {action} {entity} {id}: status is {current}, requires {required}")]
    InvalidStateTransition {
        entity: Entity,
        id: u64,
        action: &'static str,
        current: String,
        required: &'static str,
    },

    #[error("member '{actor}' is not the assignee of task {task}")]
    NotAssigned { task: TaskId, actor: String },

    #[error("task {task} has subtasks; {action} applies to leaf tasks only")]
    NotALeaf { task: TaskId, action: &'static str },

    #[error("weight budget exceeded under task {parent}: {committed} committed + {requested} requested > 100")]
    BudgetExceeded {
        parent: TaskId,
        committed: u32,
        requested: u32,
    },

    #[error("not authorized to {action}")]
    NotAuthorized { action: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn not_found(entity: Entity, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        EngineError::Validation {
            field,
            reason: reason.into(),
        }
    }
}

/// Failures raised by a [`crate::store::TaskStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed database {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("write conflict on {entity} {id}: expected version {expected}, found {found}")]
    Conflict {
        entity: Entity,
        id: u64,
        expected: u64,
        found: u64,
    },

    #[error("{entity} {id} vanished before commit")]
    Missing { entity: Entity, id: u64 },

    #[error("{0}")]
    Roster(String),
}

/// Failures loading [`crate::config::EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level error for the `pm` binary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Usage(String),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
