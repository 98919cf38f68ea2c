//! Guarded execution: learner SQL under a blocklist and a statement timeout.
//!
//! # Modules
//!
//! - [`policy`]  : `SqlBlockRule`, `SqlPolicy::standard()`, `PolicyVerdict`
//! - [`classify`]: SQLSTATE -> learner-friendly message table
//! - [`outcome`] : `ExecutionOutcome`, `FailureKind`
//! - [`executor`]: `GuardedExecutor`, `ExecutorConfig`, `QueryRunner`

pub mod classify;
pub mod executor;
pub mod outcome;
pub mod policy;
mod rows;

pub use classify::describe_database_error;
pub use executor::{ExecutorConfig, GuardedExecutor, QueryRunner};
pub use outcome::{ExecutionOutcome, FailureKind, Row};
pub use policy::{PolicyVerdict, SqlBlockRule, SqlPolicy, BLOCKED_MESSAGE};
