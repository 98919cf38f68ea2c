//! Error types for sqlpad-state

use thiserror::Error;

/// Errors that can occur while provisioning or managing sandboxes
#[derive(Error, Debug)]
pub enum StateError {
    /// The learner id cannot be mapped to a sandbox
    #[error("Invalid learner id '{id}': {reason}")]
    InvalidLearnerId { id: String, reason: String },

    /// Configuration could not be loaded or is inconsistent
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The sandbox database could not be reached
    #[error("Connection to '{database}' failed: {reason}")]
    Connection { database: String, reason: String },

    /// The sandbox database could not be created
    #[error("Provisioning '{database}' failed: {reason}")]
    Provisioning { database: String, reason: String },

    /// A statement issued by the registry itself failed
    #[error("Sandbox query failed: {0}")]
    Query(String),
}

impl StateError {
    /// Whether calling the same operation again may succeed.
    ///
    /// Provisioning and connectivity failures leave no registry state behind,
    /// so the next `acquire` re-probes from scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StateError::Connection { .. } | StateError::Provisioning { .. }
        )
    }
}

impl From<sqlx::Error> for StateError {
    fn from(err: sqlx::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

/// SQLSTATE code of a database error, if the driver error carries one.
pub fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
        _ => None,
    }
}
