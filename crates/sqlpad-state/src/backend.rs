//! Backend seam between the registry and the Postgres server.
//!
//! The registry only needs three things from a server: find out whether a
//! sandbox database exists, create it, and open a pool onto it. `PgBackend`
//! does this over real connections; `fakes::MemoryBackend` does it in memory.

use async_trait::async_trait;
use sqlx::{Connection, PgConnection, PgPool};
use tracing::{debug, instrument, warn};

use crate::config::PgConfig;
use crate::error::{sqlstate, StateError};
use crate::learner::quote_ident;
use crate::StateResult;

/// invalid_catalog_name: the database in the connection string does not exist
pub const INVALID_CATALOG_NAME: &str = "3D000";
/// duplicate_database
pub const DUPLICATE_DATABASE: &str = "42P04";
/// unique_violation on pg_database, raised when two CREATE DATABASE race
const UNIQUE_VIOLATION: &str = "23505";

/// Result of probing a sandbox database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// The database accepted a connection and answered `SELECT 1`
    Ready,
    /// The server reported that the database does not exist
    Missing,
}

/// Result of a `CREATE DATABASE` attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Created {
    New,
    /// Someone else created it first; treated as success
    AlreadyExisted,
}

/// Server operations the sandbox registry depends on.
#[async_trait]
pub trait SandboxBackend: Send + Sync + 'static {
    /// Issue a trivial query against `database`.
    async fn probe(&self, database: &str) -> StateResult<Probe>;

    /// Create `database`, tolerating a concurrent creator.
    async fn create_database(&self, database: &str) -> StateResult<Created>;

    /// Open a pool onto `database`. Connections are established lazily.
    fn open_pool(&self, database: &str) -> PgPool;
}

/// `SandboxBackend` over a live Postgres server
#[derive(Debug, Clone)]
pub struct PgBackend {
    config: PgConfig,
}

impl PgBackend {
    pub fn new(config: PgConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PgConfig {
        &self.config
    }

    fn create_statement(&self, database: &str) -> String {
        let mut statement = format!("CREATE DATABASE {}", quote_ident(database));
        if self.config.sandbox_user != self.config.admin_user {
            statement.push_str(" OWNER ");
            statement.push_str(&quote_ident(&self.config.sandbox_user));
        }
        statement
    }
}

#[async_trait]
impl SandboxBackend for PgBackend {
    #[instrument(skip(self))]
    async fn probe(&self, database: &str) -> StateResult<Probe> {
        let options = self.config.sandbox_options(database);
        let mut conn = match PgConnection::connect_with(&options).await {
            Ok(conn) => conn,
            Err(err) if sqlstate(&err).as_deref() == Some(INVALID_CATALOG_NAME) => {
                debug!("sandbox database does not exist yet");
                return Ok(Probe::Missing);
            }
            Err(err) => {
                return Err(StateError::Connection {
                    database: database.to_string(),
                    reason: err.to_string(),
                })
            }
        };

        let answered = sqlx::query("SELECT 1").execute(&mut conn).await;
        if let Err(err) = conn.close().await {
            warn!(error = %err, "failed to close probe connection");
        }
        answered.map_err(|err| StateError::Connection {
            database: database.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Probe::Ready)
    }

    #[instrument(skip(self))]
    async fn create_database(&self, database: &str) -> StateResult<Created> {
        let mut admin = PgConnection::connect_with(&self.config.admin_options())
            .await
            .map_err(|err| StateError::Provisioning {
                database: database.to_string(),
                reason: format!("admin connection failed: {err}"),
            })?;

        let statement = self.create_statement(database);
        let result = sqlx::Executor::execute(&mut admin, statement.as_str()).await;

        // The admin connection is closed on every path, including the tolerated race.
        if let Err(err) = admin.close().await {
            warn!(error = %err, "failed to close admin connection");
        }

        match result {
            Ok(_) => Ok(Created::New),
            Err(err)
                if matches!(
                    sqlstate(&err).as_deref(),
                    Some(DUPLICATE_DATABASE) | Some(UNIQUE_VIOLATION)
                ) =>
            {
                debug!("database created concurrently");
                Ok(Created::AlreadyExisted)
            }
            Err(err) => Err(StateError::Provisioning {
                database: database.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    fn open_pool(&self, database: &str) -> PgPool {
        self.config.sandbox_pool(database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_statement_quotes_name() {
        let backend = PgBackend::new(PgConfig::default());
        assert_eq!(
            backend.create_statement("golden_whisk_sandbox_a"),
            "CREATE DATABASE \"golden_whisk_sandbox_a\""
        );
    }

    #[test]
    fn test_create_statement_assigns_sandbox_owner() {
        let backend = PgBackend::new(PgConfig::default().with_sandbox_role("learner", "pw"));
        assert_eq!(
            backend.create_statement("pad_a"),
            "CREATE DATABASE \"pad_a\" OWNER \"learner\""
        );
    }
}
