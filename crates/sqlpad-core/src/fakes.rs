//! In-memory fakes for the catalog and query runner (testing only)
//!
//! `MemoryCatalog` models one sandbox's public schema; `ScriptedRunner`
//! answers verification queries from a fixed script. Together they let
//! validation rules be exercised without a Postgres server.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::error::CoreResult;
use crate::guard::{ExecutionOutcome, FailureKind, QueryRunner, Row};
use crate::introspect::Catalog;

/// In-memory public schema: tables with ordered columns, types, extensions.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    tables: Mutex<BTreeMap<String, Vec<String>>>,
    types: Mutex<BTreeSet<String>>,
    extensions: Mutex<BTreeSet<String>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a table with the given columns.
    pub fn create_table(&self, table: &str, columns: &[&str]) {
        self.tables.lock().unwrap().insert(
            table.to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
        );
    }

    /// Append a column; no-op when the table is absent.
    pub fn add_column(&self, table: &str, column: &str) {
        if let Some(columns) = self.tables.lock().unwrap().get_mut(table) {
            columns.push(column.to_string());
        }
    }

    pub fn create_type(&self, type_name: &str) {
        self.types.lock().unwrap().insert(type_name.to_string());
    }

    pub fn enable_extension(&self, extension: &str) {
        self.extensions.lock().unwrap().insert(extension.to_string());
    }

    /// Drop tables and types, keeping extensions.
    pub fn reset(&self) {
        self.tables.lock().unwrap().clear();
        self.types.lock().unwrap().clear();
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn table_exists(&self, table: &str) -> CoreResult<bool> {
        Ok(self.tables.lock().unwrap().contains_key(table))
    }

    async fn columns_of(&self, table: &str) -> CoreResult<Vec<String>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default())
    }

    async fn extension_enabled(&self, extension: &str) -> CoreResult<bool> {
        Ok(self.extensions.lock().unwrap().contains(extension))
    }

    async fn type_exists(&self, type_name: &str) -> CoreResult<bool> {
        Ok(self.types.lock().unwrap().contains(type_name))
    }

    async fn list_tables(&self) -> CoreResult<Vec<String>> {
        Ok(self.tables.lock().unwrap().keys().cloned().collect())
    }

    async fn list_types(&self) -> CoreResult<Vec<String>> {
        Ok(self.types.lock().unwrap().iter().cloned().collect())
    }

    async fn list_extensions(&self) -> CoreResult<Vec<String>> {
        Ok(self.extensions.lock().unwrap().iter().cloned().collect())
    }
}

/// Runner that answers known queries with scripted outcomes.
///
/// Unscripted queries fail like a missing relation would.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: Mutex<HashMap<String, ExecutionOutcome>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `sql` with `n` single-column rows.
    pub fn returns_rows(&self, sql: &str, n: usize) {
        let rows: Vec<Row> = (0..n)
            .map(|i| {
                let mut row = Row::new();
                row.insert("n".to_string(), json!(i));
                row
            })
            .collect();
        self.respond(sql, ExecutionOutcome::succeeded(rows, 0, 1));
    }

    /// Answer `sql` with a driver failure carrying `message`.
    pub fn fails(&self, sql: &str, message: &str) {
        self.respond(
            sql,
            ExecutionOutcome::failed(FailureKind::Driver, message, 1),
        );
    }

    pub fn respond(&self, sql: &str, outcome: ExecutionOutcome) {
        self.responses
            .lock()
            .unwrap()
            .insert(sql.to_string(), outcome);
    }

    /// Every SQL text passed to `run`, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryRunner for ScriptedRunner {
    async fn run(&self, sql: &str) -> CoreResult<ExecutionOutcome> {
        self.calls.lock().unwrap().push(sql.to_string());
        let scripted = self.responses.lock().unwrap().get(sql).cloned();
        Ok(scripted.unwrap_or_else(|| {
            ExecutionOutcome::failed(
                FailureKind::Driver,
                format!("no scripted response for: {sql}"),
                0,
            )
        }))
    }
}
