//! Declarative checks of a learner's sandbox against a lesson's expectations.
//!
//! Rules are dispatched by kind through [`ValidationEngine`]. New kinds are
//! added by registering a [`RuleEvaluator`]; the built-in ones are untouched.

pub mod engine;
pub mod evaluators;
pub mod outcome;
pub mod rule;

pub use engine::{parse_params, RuleEvaluator, ValidationContext, ValidationEngine};
pub use evaluators::{
    CustomEvaluator, ExtensionEnabledEvaluator, QueryResultEvaluator, TableExistsEvaluator,
    UNKNOWN_CUSTOM_MESSAGE,
};
pub use outcome::{ValidationOutcome, INVALID_PARAMS_MESSAGE, UNKNOWN_RULE_MESSAGE};
pub use rule::{RuleKind, ValidationRule};
