//! Sandbox registry - get-or-create of per-learner sandboxes.
//!
//! Each learner maps to a `OnceCell` stored in a sharded `DashMap`. The map
//! shard lock is held only long enough to fetch or insert the cell; the
//! provisioning itself runs under the cell, so concurrent `acquire` calls for
//! one learner share a single provisioning attempt while other learners are
//! never blocked.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use crate::backend::{Created, PgBackend, Probe, SandboxBackend};
use crate::config::PgConfig;
use crate::handle::{Provisioning, SandboxHandle};
use crate::learner::{database_name, LearnerId};
use crate::StateResult;

type SandboxCell = Arc<OnceCell<Arc<SandboxHandle>>>;

/// Owner of every learner's sandbox handle
pub struct SandboxRegistry<B: SandboxBackend = PgBackend> {
    backend: B,
    prefix: String,
    sandboxes: DashMap<LearnerId, SandboxCell>,
}

impl SandboxRegistry<PgBackend> {
    /// Registry over a live Postgres server
    pub fn connect(config: PgConfig) -> StateResult<Self> {
        config.validate()?;
        let prefix = config.database_prefix.clone();
        Ok(Self::with_backend(PgBackend::new(config), prefix))
    }
}

impl<B: SandboxBackend> SandboxRegistry<B> {
    pub fn with_backend(backend: B, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            sandboxes: DashMap::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Name of the database backing `learner`'s sandbox
    pub fn database_name(&self, learner: &LearnerId) -> String {
        database_name(&self.prefix, learner)
    }

    /// Return the learner's sandbox, provisioning it on first use.
    ///
    /// Failed provisioning leaves nothing registered, so a later call probes
    /// again. If `close` removes the learner while provisioning is in flight,
    /// the orphaned pool is closed and provisioning starts over, so the
    /// returned handle is always the registered one.
    #[instrument(skip(self), fields(learner = %learner))]
    pub async fn acquire(&self, learner: &LearnerId) -> StateResult<Arc<SandboxHandle>> {
        loop {
            let cell = Arc::clone(self.sandboxes.entry(learner.clone()).or_default().value());
            let handle = match cell.get_or_try_init(|| self.open(learner)).await {
                Ok(handle) => Arc::clone(handle),
                Err(err) => {
                    self.sandboxes
                        .remove_if(learner, |_, c| Arc::ptr_eq(c, &cell) && !c.initialized());
                    return Err(err);
                }
            };
            if self.is_registered(learner, &cell) {
                return Ok(handle);
            }
            handle.close().await;
            debug!("sandbox closed while provisioning; retrying");
        }
    }

    fn is_registered(&self, learner: &LearnerId, cell: &SandboxCell) -> bool {
        self.sandboxes
            .get(learner)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), cell))
    }

    async fn open(&self, learner: &LearnerId) -> StateResult<Arc<SandboxHandle>> {
        let database = self.database_name(learner);

        let provisioning = match self.backend.probe(&database).await? {
            Probe::Ready => Provisioning::Existing,
            Probe::Missing => match self.backend.create_database(&database).await? {
                Created::New => {
                    info!(database = %database, "created sandbox database");
                    Provisioning::Created
                }
                Created::AlreadyExisted => {
                    debug!(database = %database, "sandbox database appeared concurrently");
                    Provisioning::Existing
                }
            },
        };

        let pool = self.backend.open_pool(&database);
        Ok(Arc::new(SandboxHandle::new(
            learner.clone(),
            database,
            pool,
            provisioning,
        )))
    }

    /// The learner's handle if it has already been provisioned
    pub fn get(&self, learner: &LearnerId) -> Option<Arc<SandboxHandle>> {
        self.sandboxes
            .get(learner)
            .and_then(|cell| cell.get().cloned())
    }

    /// Drop every table and user type in the learner's sandbox.
    pub async fn reset(&self, learner: &LearnerId) -> StateResult<()> {
        self.acquire(learner).await?.reset().await
    }

    /// Close the learner's pool and forget the handle.
    ///
    /// Returns `false` when no sandbox was open for the learner.
    #[instrument(skip(self), fields(learner = %learner))]
    pub async fn close(&self, learner: &LearnerId) -> bool {
        let Some((_, cell)) = self.sandboxes.remove(learner) else {
            return false;
        };
        match cell.get() {
            Some(handle) => {
                handle.close().await;
                debug!("sandbox closed");
                true
            }
            None => false,
        }
    }

    /// Close every pool; used at shutdown.
    ///
    /// An `acquire` still in flight re-registers its learner afterwards, so
    /// callers stop issuing requests first.
    #[instrument(skip(self))]
    pub async fn close_all(&self) {
        let cells: Vec<SandboxCell> = self
            .sandboxes
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.sandboxes.clear();

        for cell in cells {
            if let Some(handle) = cell.get() {
                handle.close().await;
            }
        }
        info!("all sandboxes closed");
    }

    /// Learners with a provisioned sandbox, sorted
    pub fn learners(&self) -> Vec<LearnerId> {
        let mut learners: Vec<LearnerId> = self
            .sandboxes
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().clone())
            .collect();
        learners.sort();
        learners
    }

    /// Number of provisioned sandboxes
    pub fn len(&self) -> usize {
        self.sandboxes
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::fakes::MemoryBackend;

    #[tokio::test]
    async fn test_failed_provisioning_leaves_no_entry() {
        let backend = MemoryBackend::new();
        backend.fail_next_creates(3);
        let registry = SandboxRegistry::with_backend(backend, "sandbox_");

        for id in ["a", "b", "c"] {
            let learner = LearnerId::new(id).unwrap();
            assert!(registry.acquire(&learner).await.is_err());
        }
        assert_eq!(registry.sandboxes.len(), 0);

        registry.acquire(&LearnerId::new("a").unwrap()).await.unwrap();
        assert_eq!(registry.sandboxes.len(), 1);
    }

    #[tokio::test]
    async fn test_close_during_provisioning_keeps_one_live_pool() {
        let registry = Arc::new(SandboxRegistry::with_backend(
            MemoryBackend::new().with_latency(Duration::from_millis(50)),
            "sandbox_",
        ));
        let learner = LearnerId::new("ada").unwrap();

        let pending = {
            let registry = Arc::clone(&registry);
            let learner = learner.clone();
            tokio::spawn(async move { registry.acquire(&learner).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!registry.close(&learner).await);

        let handle = pending.await.unwrap().unwrap();
        let registered = registry.get(&learner).expect("handle registered");
        assert!(Arc::ptr_eq(&handle, &registered));
        assert!(!handle.is_closed());
        assert_eq!(registry.backend().database_count(), 1);
    }
}
