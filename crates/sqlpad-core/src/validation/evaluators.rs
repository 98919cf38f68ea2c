//! Built-in rule kinds.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::engine::{parse_params, RuleEvaluator, ValidationContext};
use super::outcome::ValidationOutcome;
use super::rule::RuleKind;
use crate::error::CoreResult;

/// Passes when the named extension is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionEnabledEvaluator;

#[derive(Debug, Deserialize)]
struct ExtensionParams {
    extension: String,
}

#[async_trait]
impl RuleEvaluator for ExtensionEnabledEvaluator {
    fn kind(&self) -> &'static str {
        RuleKind::EXTENSION_ENABLED
    }

    async fn evaluate(
        &self,
        params: &Value,
        ctx: &ValidationContext<'_>,
    ) -> CoreResult<ValidationOutcome> {
        let params: ExtensionParams = match parse_params(params) {
            Ok(params) => params,
            Err(outcome) => return Ok(outcome),
        };
        let name = params.extension;
        Ok(if ctx.catalog.extension_enabled(&name).await? {
            ValidationOutcome::correct(format!("The {name} extension is enabled."))
        } else {
            ValidationOutcome::incorrect(format!(
                "The {name} extension is not enabled yet. Run CREATE EXTENSION \"{name}\";"
            ))
        })
    }
}

/// Passes when the table exists with at least the listed columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableExistsEvaluator;

#[derive(Debug, Deserialize)]
struct TableParams {
    table: String,
    #[serde(default)]
    columns: Vec<String>,
}

#[async_trait]
impl RuleEvaluator for TableExistsEvaluator {
    fn kind(&self) -> &'static str {
        RuleKind::TABLE_EXISTS
    }

    async fn evaluate(
        &self,
        params: &Value,
        ctx: &ValidationContext<'_>,
    ) -> CoreResult<ValidationOutcome> {
        let params: TableParams = match parse_params(params) {
            Ok(params) => params,
            Err(outcome) => return Ok(outcome),
        };
        let table = &params.table;

        if !ctx.catalog.table_exists(table).await? {
            return Ok(ValidationOutcome::incorrect(format!(
                "The table '{table}' does not exist yet. Use CREATE TABLE to create it."
            )));
        }

        if !params.columns.is_empty() {
            let actual = ctx.catalog.columns_of(table).await?;
            let missing: Vec<&str> = params
                .columns
                .iter()
                .filter(|col| !actual.contains(*col))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                return Ok(ValidationOutcome::incorrect(format!(
                    "The table '{table}' exists but is missing these columns: {}",
                    missing.join(", ")
                ))
                .with_comparison(json!(params.columns), json!(actual)));
            }
        }

        Ok(ValidationOutcome::correct(format!(
            "The '{table}' table has been created with all required columns."
        )))
    }
}

/// Runs a verification query and compares its row count.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryResultEvaluator;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryParams {
    query: String,
    expected_count: Option<usize>,
}

#[async_trait]
impl RuleEvaluator for QueryResultEvaluator {
    fn kind(&self) -> &'static str {
        RuleKind::QUERY_RESULT
    }

    async fn evaluate(
        &self,
        params: &Value,
        ctx: &ValidationContext<'_>,
    ) -> CoreResult<ValidationOutcome> {
        let params: QueryParams = match parse_params(params) {
            Ok(params) => params,
            Err(outcome) => return Ok(outcome),
        };

        let result = ctx.runner.run(&params.query).await?;
        if !result.success {
            let error = result.error.unwrap_or_default();
            return Ok(ValidationOutcome::incorrect(format!(
                "Validation query failed: {error}"
            )));
        }

        if let Some(expected) = params.expected_count {
            let actual = result.row_count;
            if actual != expected {
                return Ok(ValidationOutcome::incorrect(format!(
                    "Expected {expected} rows but found {actual}."
                ))
                .with_comparison(json!(expected), json!(actual)));
            }
        }

        Ok(ValidationOutcome::correct(
            "Your data matches what the lesson expects.",
        ))
    }
}

/// Ad hoc checks keyed by params shape. Today only `{checkType}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomEvaluator;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomParams {
    check_type: Option<String>,
}

pub const UNKNOWN_CUSTOM_MESSAGE: &str = "Unknown custom validation";

#[async_trait]
impl RuleEvaluator for CustomEvaluator {
    fn kind(&self) -> &'static str {
        RuleKind::CUSTOM
    }

    async fn evaluate(
        &self,
        params: &Value,
        ctx: &ValidationContext<'_>,
    ) -> CoreResult<ValidationOutcome> {
        if params.is_null() {
            return Ok(ValidationOutcome::incorrect(UNKNOWN_CUSTOM_MESSAGE));
        }
        let params: CustomParams = match parse_params(params) {
            Ok(params) => params,
            Err(outcome) => return Ok(outcome),
        };
        let Some(type_name) = params.check_type else {
            return Ok(ValidationOutcome::incorrect(UNKNOWN_CUSTOM_MESSAGE));
        };

        Ok(if ctx.catalog.type_exists(&type_name).await? {
            ValidationOutcome::correct(format!(
                "The custom type '{type_name}' has been created."
            ))
        } else {
            ValidationOutcome::incorrect(format!(
                "The custom type '{type_name}' does not exist yet."
            ))
        })
    }
}
