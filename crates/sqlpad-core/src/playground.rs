//! The operations the request boundary calls: execute, submit, reset, status.
//!
//! `Playground` ties the sandbox registry to the curriculum. It holds no
//! per-learner state of its own; everything per learner lives in the
//! registry's handles.
//!
//! `reset` and `execute` for the same learner must not be interleaved by the
//! caller. Nothing here serialises them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlpad_state::{
    LearnerId, PgBackend, PgConfig, Provisioning, SandboxBackend, SandboxHandle, SandboxRegistry,
};
use tracing::instrument;

use crate::curriculum::{Curriculum, Hint, Task};
use crate::error::{CoreError, CoreResult};
use crate::guard::{ExecutionOutcome, ExecutorConfig, GuardedExecutor, SqlPolicy};
use crate::introspect::{Catalog, PgCatalog, SandboxStatus};
use crate::obs;
use crate::validation::{ValidationContext, ValidationEngine, ValidationOutcome, ValidationRule};

/// Result of submitting SQL for a task.
///
/// Validation only runs when the learner's SQL executed successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    PolicyBlocked(ExecutionOutcome),
    ExecutionFailed(ExecutionOutcome),
    #[serde(rename_all = "camelCase")]
    Validated {
        validation: ValidationOutcome,
        #[serde(rename = "elapsedMillis")]
        elapsed_ms: u64,
    },
}

impl SubmitOutcome {
    pub fn is_correct(&self) -> bool {
        matches!(self, SubmitOutcome::Validated { validation, .. } if validation.is_correct)
    }

    /// The learner-facing message, whichever stage ended the submission.
    pub fn message(&self) -> &str {
        match self {
            SubmitOutcome::PolicyBlocked(outcome) | SubmitOutcome::ExecutionFailed(outcome) => {
                outcome.error.as_deref().unwrap_or_default()
            }
            SubmitOutcome::Validated { validation, .. } => &validation.message,
        }
    }
}

/// Facade over the registry, curriculum, policy and validation engine.
pub struct Playground<B: SandboxBackend = PgBackend> {
    registry: SandboxRegistry<B>,
    curriculum: Arc<Curriculum>,
    policy: Arc<SqlPolicy>,
    engine: ValidationEngine,
    config: ExecutorConfig,
}

impl Playground<PgBackend> {
    /// Playground over a live Postgres server.
    pub fn connect(
        pg: PgConfig,
        config: ExecutorConfig,
        curriculum: Curriculum,
    ) -> CoreResult<Self> {
        let registry = SandboxRegistry::connect(pg)?;
        Ok(Self::new(registry, curriculum).with_executor_config(config))
    }
}

impl<B: SandboxBackend> Playground<B> {
    /// Standard policy, built-in rule kinds and default timeout.
    pub fn new(registry: SandboxRegistry<B>, curriculum: Curriculum) -> Self {
        Self {
            registry,
            curriculum: Arc::new(curriculum),
            policy: Arc::new(SqlPolicy::standard()),
            engine: ValidationEngine::standard(),
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_policy(mut self, policy: SqlPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn with_engine(mut self, engine: ValidationEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_executor_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &SandboxRegistry<B> {
        &self.registry
    }

    pub fn curriculum(&self) -> &Curriculum {
        &self.curriculum
    }

    pub fn policy(&self) -> &SqlPolicy {
        &self.policy
    }

    pub fn task(&self, task_id: &str) -> CoreResult<&Task> {
        self.curriculum
            .task(task_id)
            .ok_or_else(|| CoreError::TaskNotFound {
                task_id: task_id.to_string(),
            })
    }

    /// Hint `level` for a task; `None` when the task has no such hint.
    pub fn hint(&self, task_id: &str, level: u8) -> CoreResult<Option<&Hint>> {
        let task = self.task(task_id)?;
        Ok(task.hints.iter().find(|h| h.level == level))
    }

    async fn sandbox(&self, learner: &LearnerId) -> CoreResult<Arc<SandboxHandle>> {
        let fresh = self.registry.get(learner).is_none();
        let handle = self.registry.acquire(learner).await?;
        if fresh {
            obs::emit_sandbox_opened(
                learner.as_str(),
                handle.database(),
                handle.provisioning() == Provisioning::Created,
            );
        }
        Ok(handle)
    }

    /// Guarded executor bound to the learner's sandbox.
    pub async fn executor(&self, learner: &LearnerId) -> CoreResult<GuardedExecutor> {
        let handle = self.sandbox(learner).await?;
        Ok(GuardedExecutor::new(
            handle,
            Arc::clone(&self.policy),
            self.config,
        ))
    }

    /// Catalog lookups against the learner's sandbox.
    pub async fn catalog(&self, learner: &LearnerId) -> CoreResult<PgCatalog> {
        Ok(PgCatalog::new(self.sandbox(learner).await?))
    }

    /// Run learner SQL in their sandbox.
    pub async fn execute(&self, learner: &LearnerId, sql: &str) -> CoreResult<ExecutionOutcome> {
        self.executor(learner).await?.run(sql).await
    }

    /// Run learner SQL for a task, then check the task's rule.
    #[instrument(skip(self, sql), fields(learner = %learner))]
    pub async fn submit(
        &self,
        learner: &LearnerId,
        task_id: &str,
        sql: &str,
    ) -> CoreResult<SubmitOutcome> {
        let task = self.task(task_id)?;
        let executor = self.executor(learner).await?;

        let execution = executor.run(sql).await?;
        if execution.is_policy_violation() {
            return Ok(SubmitOutcome::PolicyBlocked(execution));
        }
        if !execution.success {
            return Ok(SubmitOutcome::ExecutionFailed(execution));
        }

        let catalog = PgCatalog::new(Arc::clone(executor.handle()));
        let ctx = ValidationContext {
            catalog: &catalog,
            runner: &executor,
            learner_sql: sql,
        };
        let validation = self.engine.evaluate(&task.validation, &ctx).await?;
        obs::emit_validation_evaluated(
            learner.as_str(),
            task_id,
            task.validation.kind.as_str(),
            validation.is_correct,
        );

        Ok(SubmitOutcome::Validated {
            validation,
            elapsed_ms: execution.elapsed_ms,
        })
    }

    /// Evaluate a rule against the learner's sandbox without running any
    /// learner SQL first.
    pub async fn check(
        &self,
        learner: &LearnerId,
        rule: &ValidationRule,
    ) -> CoreResult<ValidationOutcome> {
        let executor = self.executor(learner).await?;
        let catalog = PgCatalog::new(Arc::clone(executor.handle()));
        let ctx = ValidationContext {
            catalog: &catalog,
            runner: &executor,
            learner_sql: "",
        };
        self.engine.evaluate(rule, &ctx).await
    }

    /// Drop the learner's tables and types. Extensions stay installed.
    pub async fn reset(&self, learner: &LearnerId) -> CoreResult<()> {
        self.sandbox(learner).await?.reset().await?;
        obs::emit_sandbox_reset(learner.as_str());
        Ok(())
    }

    pub async fn status(&self, learner: &LearnerId) -> CoreResult<SandboxStatus> {
        self.catalog(learner).await?.status().await
    }

    /// Close every sandbox pool.
    pub async fn shutdown(&self) {
        self.registry.close_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::FailureKind;
    use serde_json::json;

    #[test]
    fn test_submit_outcome_wire_shape() {
        let outcome = SubmitOutcome::Validated {
            validation: ValidationOutcome::correct("done"),
            elapsed_ms: 9,
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], json!("validated"));
        assert_eq!(value["validation"]["isCorrect"], json!(true));
        assert_eq!(value["elapsedMillis"], json!(9));
        assert!(outcome.is_correct());
    }

    #[test]
    fn test_blocked_submission_is_not_correct() {
        let outcome = SubmitOutcome::PolicyBlocked(ExecutionOutcome::blocked("no", 0));
        assert!(!outcome.is_correct());
        assert!(outcome.message().contains("not allowed"));
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], json!("policy_blocked"));
        assert_eq!(value["failure"], json!("policy_violation"));
    }

    #[test]
    fn test_failed_submission_message() {
        let outcome = SubmitOutcome::ExecutionFailed(ExecutionOutcome::failed(
            FailureKind::Driver,
            "Syntax error.",
            3,
        ));
        assert_eq!(outcome.message(), "Syntax error.");
    }
}
