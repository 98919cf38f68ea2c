//! Sandbox handle - one learner's database and connection pool.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, instrument};

use crate::error::StateError;
use crate::learner::LearnerId;
use crate::StateResult;

/// Drops every table, then every standalone user type, in `public`.
///
/// Runs as one server-side block so a crash cannot leave the loop half done
/// from the client's point of view. Array, multirange and table row types are
/// skipped; they are owned by another object and fall with it. Tables and
/// types that belong to an installed extension (`citext`, `hstore`, ...)
/// stay, since Postgres refuses to drop them and the whole block would fail.
const RESET_SCRIPT: &str = r#"
DO $$ DECLARE
    r RECORD;
BEGIN
    FOR r IN (
        SELECT c.relname
        FROM pg_class c
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = 'public'
          AND c.relkind IN ('r', 'p')
          AND NOT EXISTS (
              SELECT 1 FROM pg_depend d
              WHERE d.classid = 'pg_class'::regclass
                AND d.objid = c.oid
                AND d.deptype = 'e'
          )
    ) LOOP
        EXECUTE 'DROP TABLE IF EXISTS public.' || quote_ident(r.relname) || ' CASCADE';
    END LOOP;

    FOR r IN (
        SELECT t.typname
        FROM pg_type t
        JOIN pg_namespace n ON n.oid = t.typnamespace
        LEFT JOIN pg_class c ON c.oid = t.typrelid
        WHERE n.nspname = 'public'
          AND t.typcategory <> 'A'
          AND t.typtype <> 'm'
          AND (t.typrelid = 0 OR c.relkind = 'c')
          AND NOT EXISTS (
              SELECT 1 FROM pg_depend d
              WHERE d.classid = 'pg_type'::regclass
                AND d.objid = t.oid
                AND d.deptype = 'e'
          )
    ) LOOP
        EXECUTE 'DROP TYPE IF EXISTS public.' || quote_ident(r.typname) || ' CASCADE';
    END LOOP;
END $$;
"#;

/// How the backing database came to exist for this handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provisioning {
    /// The database was already there when first probed
    Existing,
    /// This process created the database
    Created,
}

/// A learner's sandbox: database name, pool, and provisioning state.
///
/// Handles are only built by `SandboxRegistry`; callers borrow connections
/// from `pool()` and never close it themselves.
#[derive(Debug)]
pub struct SandboxHandle {
    learner: LearnerId,
    database: String,
    pool: PgPool,
    provisioning: Provisioning,
    opened_at: DateTime<Utc>,
}

impl SandboxHandle {
    pub(crate) fn new(
        learner: LearnerId,
        database: String,
        pool: PgPool,
        provisioning: Provisioning,
    ) -> Self {
        Self {
            learner,
            database,
            pool,
            provisioning,
            opened_at: Utc::now(),
        }
    }

    pub fn learner(&self) -> &LearnerId {
        &self.learner
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn provisioning(&self) -> Provisioning {
        self.provisioning
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Whether `close` has been called on the pool
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Drop all tables and user types in the sandbox's `public` schema.
    ///
    /// Extensions stay installed. Must not overlap an in-flight statement
    /// for the same learner; callers serialize the two.
    #[instrument(skip(self), fields(learner = %self.learner, database = %self.database))]
    pub async fn reset(&self) -> StateResult<()> {
        sqlx::raw_sql(RESET_SCRIPT)
            .execute(&self.pool)
            .await
            .map_err(|err| StateError::Query(format!("reset of {} failed: {err}", self.database)))?;
        info!("sandbox reset");
        Ok(())
    }

    /// Close all pooled connections.
    pub(crate) async fn close(&self) {
        self.pool.close().await;
    }
}
