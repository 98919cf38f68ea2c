//! In-memory fakes for the sandbox backend (testing only)
//!
//! `MemoryBackend` keeps a set of "existing" database names and counts every
//! probe and creation, so registry behaviour can be checked without a
//! Postgres server. Pools it hands out are lazy and never connect.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use crate::backend::{Created, Probe, SandboxBackend};
use crate::error::StateError;
use crate::StateResult;

/// In-memory backend recording which databases exist.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    databases: Mutex<HashSet<String>>,
    probes: AtomicUsize,
    creates: AtomicUsize,
    failing_creates: AtomicUsize,
    latency: Option<Duration>,
    hide_existing: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside probe and create, to widen race windows.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Probe always reports `Missing`, as if another process were racing
    /// this one between probe and create.
    pub fn with_hidden_databases(mut self) -> Self {
        self.hide_existing = true;
        self
    }

    /// Mark a database as already present on the server.
    pub fn seed(&self, database: impl Into<String>) {
        self.databases.lock().unwrap().insert(database.into());
    }

    /// Make the next `n` create calls fail with a provisioning error.
    pub fn fail_next_creates(&self, n: usize) {
        self.failing_creates.store(n, Ordering::SeqCst);
    }

    pub fn contains(&self, database: &str) -> bool {
        self.databases.lock().unwrap().contains(database)
    }

    pub fn database_count(&self) -> usize {
        self.databases.lock().unwrap().len()
    }

    pub fn probe_calls(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl SandboxBackend for MemoryBackend {
    async fn probe(&self, database: &str) -> StateResult<Probe> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if !self.hide_existing && self.contains(database) {
            Ok(Probe::Ready)
        } else {
            Ok(Probe::Missing)
        }
    }

    async fn create_database(&self, database: &str) -> StateResult<Created> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        let failing = self
            .failing_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StateError::Provisioning {
                database: database.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        if self.databases.lock().unwrap().insert(database.to_string()) {
            Ok(Created::New)
        } else {
            Ok(Created::AlreadyExisted)
        }
    }

    fn open_pool(&self, database: &str) -> PgPool {
        PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy_with(PgConnectOptions::new().database(database))
    }
}
