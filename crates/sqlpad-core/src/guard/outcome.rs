//! Result of running one learner statement.

use serde::{Deserialize, Serialize};

use super::policy::BLOCKED_MESSAGE;

/// One result row: column name -> JSON value, in column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Why an execution did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Matched a block rule; the database was never contacted.
    PolicyViolation,
    /// The database rejected the statement.
    Driver,
    /// The statement was cancelled by the statement timeout.
    Timeout,
}

/// Outcome of one `GuardedExecutor::run` call.
///
/// `row_count` always equals `rows.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub success: bool,
    /// Rows of the last statement that produced any.
    pub rows: Vec<Row>,
    pub row_count: usize,
    /// Sum of the server's command-tag counts over all statements.
    pub rows_affected: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(rename = "elapsedMillis")]
    pub elapsed_ms: u64,
}

impl ExecutionOutcome {
    pub fn succeeded(rows: Vec<Row>, rows_affected: u64, elapsed_ms: u64) -> Self {
        Self {
            success: true,
            row_count: rows.len(),
            rows,
            rows_affected,
            error: None,
            failure: None,
            elapsed_ms,
        }
    }

    pub fn blocked(reason: &str, elapsed_ms: u64) -> Self {
        Self::failed(
            FailureKind::PolicyViolation,
            format!("{BLOCKED_MESSAGE} ({reason})"),
            elapsed_ms,
        )
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            success: false,
            rows: Vec::new(),
            row_count: 0,
            rows_affected: 0,
            error: Some(message.into()),
            failure: Some(kind),
            elapsed_ms,
        }
    }

    pub fn is_policy_violation(&self) -> bool {
        self.failure == Some(FailureKind::PolicyViolation)
    }
}
