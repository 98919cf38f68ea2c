//! Declarative validation rules as authored in the curriculum.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of a rule kind. Open-ended: any registered evaluator's kind is valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleKind(String);

impl RuleKind {
    pub const EXTENSION_ENABLED: &'static str = "extension_enabled";
    pub const TABLE_EXISTS: &'static str = "table_exists";
    pub const QUERY_RESULT: &'static str = "query_result";
    pub const CUSTOM: &'static str = "custom";

    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RuleKind {
    fn from(kind: &str) -> Self {
        Self::new(kind)
    }
}

/// A rule kind plus its kind-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(rename = "type", alias = "kind")]
    pub kind: RuleKind,
    #[serde(default)]
    pub params: Value,
}

impl ValidationRule {
    pub fn new(kind: impl Into<RuleKind>, params: Value) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }

    pub fn extension_enabled(extension: &str) -> Self {
        Self::new(
            RuleKind::EXTENSION_ENABLED,
            serde_json::json!({ "extension": extension }),
        )
    }

    pub fn table_exists(table: &str, columns: &[&str]) -> Self {
        let params = if columns.is_empty() {
            serde_json::json!({ "table": table })
        } else {
            serde_json::json!({ "table": table, "columns": columns })
        };
        Self::new(RuleKind::TABLE_EXISTS, params)
    }

    pub fn query_result(query: &str, expected_count: Option<usize>) -> Self {
        let params = match expected_count {
            Some(count) => serde_json::json!({ "query": query, "expectedCount": count }),
            None => serde_json::json!({ "query": query }),
        };
        Self::new(RuleKind::QUERY_RESULT, params)
    }

    pub fn custom_type(type_name: &str) -> Self {
        Self::new(
            RuleKind::CUSTOM,
            serde_json::json!({ "checkType": type_name }),
        )
    }
}
