use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const UNKNOWN_RULE_MESSAGE: &str = "Unknown validation type";
pub const INVALID_PARAMS_MESSAGE: &str = "Invalid validation rule parameters";

/// Verdict for one rule. Failed validations are data, never errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub is_correct: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
}

impl ValidationOutcome {
    pub fn correct(message: impl Into<String>) -> Self {
        Self {
            is_correct: true,
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    pub fn incorrect(message: impl Into<String>) -> Self {
        Self {
            is_correct: false,
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    pub fn unknown_rule() -> Self {
        Self::incorrect(UNKNOWN_RULE_MESSAGE)
    }

    pub fn invalid_params(detail: impl fmt::Display) -> Self {
        Self::incorrect(format!("{INVALID_PARAMS_MESSAGE}: {detail}"))
    }

    /// Attach the expected and observed values of a failed comparison.
    pub fn with_comparison(mut self, expected: Value, actual: Value) -> Self {
        self.expected = Some(expected);
        self.actual = Some(actual);
        self
    }
}
