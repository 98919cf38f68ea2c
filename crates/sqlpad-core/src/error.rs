//! Error types for sqlpad-core.
//!
//! Learner-facing failures (blocked statements, SQL errors, failed
//! validations) are data, carried by `ExecutionOutcome` and
//! `ValidationOutcome`. `CoreError` is reserved for failures the caller cannot
//! fix by editing SQL.

use sqlpad_state::StateError;

use crate::curriculum::CurriculumError;

/// Errors produced by the core services.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("sandbox error: {0}")]
    State(#[from] StateError),

    /// Pool exhaustion, lost connections and other non-SQL driver failures.
    #[error("database backend failure: {0}")]
    Backend(String),

    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("curriculum error: {0}")]
    Curriculum(#[from] CurriculumError),

    #[error("invalid policy rule '{name}': {reason}")]
    InvalidPolicy { name: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Backend(err.to_string())
    }
}

/// Result type for core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
