//! Rule dispatch through a registry of evaluators.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use super::evaluators::{
    CustomEvaluator, ExtensionEnabledEvaluator, QueryResultEvaluator, TableExistsEvaluator,
};
use super::outcome::ValidationOutcome;
use super::rule::ValidationRule;
use crate::error::CoreResult;
use crate::guard::QueryRunner;
use crate::introspect::Catalog;

/// What an evaluator may look at while judging a submission.
///
/// `runner` should be the learner's guarded executor so verification queries
/// get the same blocklist and timeout as learner SQL.
#[derive(Clone, Copy)]
pub struct ValidationContext<'a> {
    pub catalog: &'a dyn Catalog,
    pub runner: &'a dyn QueryRunner,
    pub learner_sql: &'a str,
}

/// Judges one rule kind.
///
/// Implementations must only read sandbox state: catalog lookups and the
/// curriculum's own verification queries.
#[async_trait]
pub trait RuleEvaluator: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn evaluate(
        &self,
        params: &Value,
        ctx: &ValidationContext<'_>,
    ) -> CoreResult<ValidationOutcome>;
}

/// Decode rule params into an evaluator's parameter struct.
///
/// The `Err` side is the outcome to report, not a failure.
pub fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T, ValidationOutcome> {
    T::deserialize(params).map_err(ValidationOutcome::invalid_params)
}

/// Kind -> evaluator registry.
#[derive(Clone, Default)]
pub struct ValidationEngine {
    evaluators: HashMap<String, Arc<dyn RuleEvaluator>>,
}

impl ValidationEngine {
    /// Engine with no evaluators; every rule is unknown.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Engine with the four built-in rule kinds.
    pub fn standard() -> Self {
        let mut engine = Self::empty();
        engine.register(ExtensionEnabledEvaluator);
        engine.register(TableExistsEvaluator);
        engine.register(QueryResultEvaluator);
        engine.register(CustomEvaluator);
        engine
    }

    /// Add an evaluator, replacing any existing one for the same kind.
    pub fn register<E: RuleEvaluator + 'static>(&mut self, evaluator: E) -> &mut Self {
        self.evaluators
            .insert(evaluator.kind().to_string(), Arc::new(evaluator));
        self
    }

    pub fn supports(&self, kind: &str) -> bool {
        self.evaluators.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.evaluators.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    #[instrument(skip(self, rule, ctx), fields(kind = %rule.kind))]
    pub async fn evaluate(
        &self,
        rule: &ValidationRule,
        ctx: &ValidationContext<'_>,
    ) -> CoreResult<ValidationOutcome> {
        let Some(evaluator) = self.evaluators.get(rule.kind.as_str()) else {
            debug!("no evaluator registered");
            return Ok(ValidationOutcome::unknown_rule());
        };
        let outcome = evaluator.evaluate(&rule.params, ctx).await?;
        debug!(correct = outcome.is_correct, "rule evaluated");
        Ok(outcome)
    }
}

impl std::fmt::Debug for ValidationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationEngine")
            .field("kinds", &self.kinds())
            .finish()
    }
}
