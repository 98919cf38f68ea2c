//! Structured lifecycle events for sandboxes, statements and validations.
//!
//! Every event carries an `event` field so log pipelines can filter on it,
//! e.g. `event=sql.blocked`. Learner SQL itself is never logged.

use tracing::{info, warn};

/// A sandbox handle was opened (created or found) for a learner.
pub fn emit_sandbox_opened(learner: &str, database: &str, created: bool) {
    info!(event = "sandbox.opened", learner = %learner, database = %database, created = created);
}

pub fn emit_sandbox_reset(learner: &str) {
    info!(event = "sandbox.reset", learner = %learner);
}

/// A statement ran to completion or failed inside the database.
pub fn emit_sql_executed(learner: &str, success: bool, row_count: usize, elapsed_ms: u64) {
    info!(
        event = "sql.executed",
        learner = %learner,
        success = success,
        row_count = row_count,
        elapsed_ms = elapsed_ms,
    );
}

/// A statement matched a block rule and never reached the database.
pub fn emit_sql_blocked(learner: &str, rule: &str) {
    warn!(event = "sql.blocked", learner = %learner, rule = %rule);
}

pub fn emit_validation_evaluated(learner: &str, task_id: &str, kind: &str, correct: bool) {
    info!(
        event = "validation.evaluated",
        learner = %learner,
        task_id = %task_id,
        kind = %kind,
        correct = correct,
    );
}
