//! Guarded execution of learner SQL against one sandbox.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use sqlpad_state::SandboxHandle;
use sqlx::pool::PoolConnection;
use sqlx::{Either, PgConnection, Postgres, Row as _};
use tracing::{debug, instrument, warn};

use super::classify::{describe_database_error, is_timeout, QUERY_CANCELED};
use super::outcome::{ExecutionOutcome, FailureKind, Row};
use super::policy::{PolicyVerdict, SqlPolicy};
use super::rows::row_to_json;
use crate::error::{CoreError, CoreResult};
use crate::obs;

/// Time a run may outlive its server-side timeout before the client gives up
/// on it and terminates the backend.
const BACKSTOP_GRACE_MS: u64 = 500;

/// True inside an explicit transaction block. Outside one, every statement
/// is the first of its own transaction and the two timestamps coincide.
const IN_TRANSACTION: &str = "SELECT transaction_timestamp() <> statement_timestamp()";

/// in_failed_sql_transaction
const IN_FAILED_TRANSACTION: &str = "25P02";

/// Settings applied to every guarded execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Server-side `statement_timeout` for each run (milliseconds).
    pub statement_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            statement_timeout_ms: 3_000,
        }
    }
}

impl ExecutorConfig {
    /// Reads `SQL_TIMEOUT_MS` (optional, default 3000).
    pub fn from_env() -> CoreResult<Self> {
        match std::env::var("SQL_TIMEOUT_MS") {
            Ok(raw) => {
                let statement_timeout_ms = raw.trim().parse::<u64>().map_err(|_| {
                    CoreError::Config(format!("SQL_TIMEOUT_MS='{raw}' is not a number"))
                })?;
                if statement_timeout_ms == 0 {
                    // 0 disables the timeout in Postgres
                    return Err(CoreError::Config(
                        "SQL_TIMEOUT_MS must be greater than zero".to_string(),
                    ));
                }
                Ok(Self {
                    statement_timeout_ms,
                })
            }
            Err(_) => Ok(Self::default()),
        }
    }
}

/// Something that can run a SQL text and report an `ExecutionOutcome`.
///
/// Validation re-runs curriculum verification queries through this seam.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    async fn run(&self, sql: &str) -> CoreResult<ExecutionOutcome>;
}

/// Runs learner SQL in one sandbox under the blocklist and a timeout.
#[derive(Debug, Clone)]
pub struct GuardedExecutor {
    handle: Arc<SandboxHandle>,
    policy: Arc<SqlPolicy>,
    config: ExecutorConfig,
}

/// Result of the final statement in a batch, plus the total affected rows.
#[derive(Debug, Default)]
struct Batch {
    rows: Vec<Row>,
    rows_affected: u64,
    pending: Vec<Row>,
}

impl Batch {
    fn push_row(&mut self, row: Row) {
        self.pending.push(row);
    }

    /// A statement finished; its rows replace those of any earlier statement.
    fn complete_statement(&mut self, rows_affected: u64) {
        self.rows_affected += rows_affected;
        self.rows = std::mem::take(&mut self.pending);
    }

    fn finish(mut self) -> Self {
        if !self.pending.is_empty() {
            self.rows = std::mem::take(&mut self.pending);
        }
        self
    }
}

impl GuardedExecutor {
    pub fn new(handle: Arc<SandboxHandle>, policy: Arc<SqlPolicy>, config: ExecutorConfig) -> Self {
        Self {
            handle,
            policy,
            config,
        }
    }

    pub fn handle(&self) -> &Arc<SandboxHandle> {
        &self.handle
    }

    /// Run `sql` verbatim.
    ///
    /// Blocked statements and database errors come back as unsuccessful
    /// outcomes. Only failures outside the statement itself (pool
    /// exhaustion, lost connection) are returned as `Err`.
    #[instrument(skip(self, sql), fields(learner = %self.handle.learner()))]
    pub async fn run(&self, sql: &str) -> CoreResult<ExecutionOutcome> {
        let started = Instant::now();
        let learner = self.handle.learner().as_str();

        if let PolicyVerdict::Blocked { rule, reason } = self.policy.check(sql) {
            obs::emit_sql_blocked(learner, &rule);
            return Ok(ExecutionOutcome::blocked(&reason, elapsed_ms(started)));
        }

        // Released back to the pool on drop, whichever way this returns.
        let mut conn = self.handle.pool().acquire().await?;
        let backend_pid = self.arm(&mut conn).await?;

        let budget = Duration::from_millis(
            self.config
                .statement_timeout_ms
                .saturating_add(BACKSTOP_GRACE_MS),
        );
        let result = match tokio::time::timeout(budget, run_batch(&mut conn, sql)).await {
            Ok(result) => {
                settle(&mut conn, &result).await;
                drop(conn);
                Some(result)
            }
            Err(_) => {
                self.abandon(conn, backend_pid).await;
                None
            }
        };

        let outcome = match result {
            None => ExecutionOutcome::failed(
                FailureKind::Timeout,
                describe_database_error(
                    Some(QUERY_CANCELED),
                    "statement abandoned after exceeding its time limit",
                    self.config.statement_timeout_ms,
                ),
                elapsed_ms(started),
            ),
            Some(Ok(batch)) => {
                ExecutionOutcome::succeeded(batch.rows, batch.rows_affected, elapsed_ms(started))
            }
            Some(Err(sqlx::Error::Database(db))) => {
                let code = db.code();
                let code = code.as_deref();
                let kind = if is_timeout(code) {
                    FailureKind::Timeout
                } else {
                    FailureKind::Driver
                };
                let message =
                    describe_database_error(code, db.message(), self.config.statement_timeout_ms);
                ExecutionOutcome::failed(kind, message, elapsed_ms(started))
            }
            Some(Err(other)) => return Err(other.into()),
        };

        obs::emit_sql_executed(
            learner,
            outcome.success,
            outcome.row_count,
            outcome.elapsed_ms,
        );
        Ok(outcome)
    }

    /// Apply the statement timeout and return the session's backend pid.
    async fn arm(&self, conn: &mut PgConnection) -> CoreResult<i32> {
        let arm = format!(
            "SET statement_timeout = {}; SELECT pg_backend_pid()",
            self.config.statement_timeout_ms
        );
        let row = sqlx::Executor::fetch_one(conn, arm.as_str()).await?;
        Ok(row.try_get::<i32, _>(0)?)
    }

    /// Give up on a run that outlived its timeout.
    ///
    /// The connection is discarded rather than returned, and its backend is
    /// terminated so the statement stops using server resources.
    async fn abandon(&self, mut conn: PoolConnection<Postgres>, backend_pid: i32) {
        warn!(backend_pid, "run outlived its statement timeout; terminating backend");
        conn.close_on_drop();
        drop(conn);

        let terminated = sqlx::query_scalar::<_, bool>("SELECT pg_terminate_backend($1)")
            .bind(backend_pid)
            .fetch_one(self.handle.pool())
            .await;
        if let Err(err) = terminated {
            warn!(backend_pid, error = %err, "failed to terminate abandoned backend");
        }
    }
}

#[async_trait]
impl QueryRunner for GuardedExecutor {
    async fn run(&self, sql: &str) -> CoreResult<ExecutionOutcome> {
        GuardedExecutor::run(self, sql).await
    }
}

/// Run a possibly multi-statement text over the simple query protocol.
async fn run_batch(conn: &mut PgConnection, sql: &str) -> Result<Batch, sqlx::Error> {
    let mut batch = Batch::default();

    let mut results = sqlx::Executor::fetch_many(conn, sqlx::raw_sql(sql));
    while let Some(step) = results.try_next().await? {
        match step {
            Either::Left(done) => batch.complete_statement(done.rows_affected()),
            Either::Right(row) => batch.push_row(row_to_json(&row)?),
        }
    }
    Ok(batch.finish())
}

/// Leave the connection idle before it goes back to the pool.
///
/// A transaction the learner opened and never closed is rolled back. A
/// connection whose state cannot be established is discarded instead.
async fn settle(conn: &mut PoolConnection<Postgres>, result: &Result<Batch, sqlx::Error>) {
    if matches!(result, Err(err) if !matches!(err, sqlx::Error::Database(_))) {
        conn.close_on_drop();
        return;
    }
    match open_transaction(conn).await {
        Ok(false) => {}
        Ok(true) => match sqlx::Executor::execute(&mut **conn, "ROLLBACK").await {
            Ok(_) => debug!("rolled back transaction left open by learner SQL"),
            Err(err) => {
                warn!(error = %err, "rollback failed; discarding connection");
                conn.close_on_drop();
            }
        },
        Err(err) => {
            warn!(error = %err, "transaction state unknown; discarding connection");
            conn.close_on_drop();
        }
    }
}

async fn open_transaction(conn: &mut PgConnection) -> Result<bool, sqlx::Error> {
    match sqlx::Executor::fetch_one(conn, IN_TRANSACTION).await {
        Ok(row) => row.try_get::<bool, _>(0),
        Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(IN_FAILED_TRANSACTION) => {
            Ok(true)
        }
        Err(err) => Err(err),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
