//! Read-only catalog lookups scoped to one sandbox.
//!
//! Names passed here come from curriculum data (table, type and extension
//! names authored in lessons), never from learner input. They are bound as
//! query parameters regardless.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlpad_state::SandboxHandle;
use sqlx::PgPool;

use crate::error::CoreResult;

const TABLE_EXISTS: &str = "SELECT EXISTS (
    SELECT 1 FROM information_schema.tables
    WHERE table_schema = 'public' AND table_name = $1
)";

const COLUMNS_OF: &str = "SELECT column_name::text
    FROM information_schema.columns
    WHERE table_schema = 'public' AND table_name = $1
    ORDER BY ordinal_position";

const EXTENSION_ENABLED: &str = "SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = $1)";

const TYPE_EXISTS: &str = "SELECT EXISTS (
    SELECT 1 FROM pg_type t
    JOIN pg_namespace n ON n.oid = t.typnamespace
    WHERE n.nspname = 'public' AND t.typname = $1
)";

/// Base tables the learner owns; tables installed by an extension are left out.
const LIST_TABLES: &str = "SELECT c.relname::text
    FROM pg_class c
    JOIN pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = 'public'
      AND c.relkind IN ('r', 'p')
      AND NOT EXISTS (
          SELECT 1 FROM pg_depend d
          WHERE d.classid = 'pg_class'::regclass AND d.objid = c.oid AND d.deptype = 'e'
      )
    ORDER BY c.relname";

/// Standalone user types only: no arrays, multiranges, table row types or
/// types that belong to an extension.
const LIST_TYPES: &str = "SELECT t.typname::text
    FROM pg_type t
    JOIN pg_namespace n ON n.oid = t.typnamespace
    LEFT JOIN pg_class c ON c.oid = t.typrelid
    WHERE n.nspname = 'public'
      AND t.typcategory <> 'A'
      AND t.typtype <> 'm'
      AND (t.typrelid = 0 OR c.relkind = 'c')
      AND NOT EXISTS (
          SELECT 1 FROM pg_depend d
          WHERE d.classid = 'pg_type'::regclass AND d.objid = t.oid AND d.deptype = 'e'
      )
    ORDER BY t.typname";

const LIST_EXTENSIONS: &str = "SELECT extname::text
    FROM pg_extension
    WHERE extname <> 'plpgsql'
    ORDER BY extname";

/// Snapshot of what a learner has built so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxStatus {
    pub tables: Vec<String>,
    pub types: Vec<String>,
    pub extensions: Vec<String>,
}

/// Catalog queries against one sandbox's `public` schema.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn table_exists(&self, table: &str) -> CoreResult<bool>;

    /// Column names in ordinal order; empty when the table is absent.
    async fn columns_of(&self, table: &str) -> CoreResult<Vec<String>>;

    async fn extension_enabled(&self, extension: &str) -> CoreResult<bool>;

    async fn type_exists(&self, type_name: &str) -> CoreResult<bool>;

    async fn list_tables(&self) -> CoreResult<Vec<String>>;

    async fn list_types(&self) -> CoreResult<Vec<String>>;

    /// Installed extensions other than the always-present `plpgsql`.
    async fn list_extensions(&self) -> CoreResult<Vec<String>>;

    async fn status(&self) -> CoreResult<SandboxStatus> {
        Ok(SandboxStatus {
            tables: self.list_tables().await?,
            types: self.list_types().await?,
            extensions: self.list_extensions().await?,
        })
    }
}

/// `Catalog` over a sandbox's connection pool.
#[derive(Debug, Clone)]
pub struct PgCatalog {
    handle: Arc<SandboxHandle>,
}

impl PgCatalog {
    pub fn new(handle: Arc<SandboxHandle>) -> Self {
        Self { handle }
    }

    fn pool(&self) -> &PgPool {
        self.handle.pool()
    }

    async fn exists(&self, query: &str, name: &str) -> CoreResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(query)
            .bind(name)
            .fetch_one(self.pool())
            .await?)
    }

    async fn names(&self, query: &str) -> CoreResult<Vec<String>> {
        Ok(sqlx::query_scalar::<_, String>(query)
            .fetch_all(self.pool())
            .await?)
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn table_exists(&self, table: &str) -> CoreResult<bool> {
        self.exists(TABLE_EXISTS, table).await
    }

    async fn columns_of(&self, table: &str) -> CoreResult<Vec<String>> {
        Ok(sqlx::query_scalar::<_, String>(COLUMNS_OF)
            .bind(table)
            .fetch_all(self.pool())
            .await?)
    }

    async fn extension_enabled(&self, extension: &str) -> CoreResult<bool> {
        self.exists(EXTENSION_ENABLED, extension).await
    }

    async fn type_exists(&self, type_name: &str) -> CoreResult<bool> {
        self.exists(TYPE_EXISTS, type_name).await
    }

    async fn list_tables(&self) -> CoreResult<Vec<String>> {
        self.names(LIST_TABLES).await
    }

    async fn list_types(&self) -> CoreResult<Vec<String>> {
        self.names(LIST_TYPES).await
    }

    async fn list_extensions(&self) -> CoreResult<Vec<String>> {
        self.names(LIST_EXTENSIONS).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listings_skip_extension_members() {
        for query in [LIST_TABLES, LIST_TYPES] {
            assert!(query.contains("d.deptype = 'e'"), "{query}");
            assert!(query.contains("n.nspname = 'public'"), "{query}");
        }
        assert!(LIST_EXTENSIONS.contains("<> 'plpgsql'"));
    }

    #[test]
    fn test_name_lookups_are_bound() {
        for query in [TABLE_EXISTS, COLUMNS_OF, EXTENSION_ENABLED, TYPE_EXISTS] {
            assert!(query.contains("$1"), "{query}");
        }
    }
}
