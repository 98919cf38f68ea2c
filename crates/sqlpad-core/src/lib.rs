//! SQLPad Core
//!
//! Runs learner SQL inside their sandbox under a blocklist and a statement
//! timeout, inspects what they built, and checks it against the lesson's
//! validation rule.
//!
//! - [`guard`]: `GuardedExecutor` and its policy, error classification and outcomes
//! - [`introspect`]: `Catalog` lookups and `SandboxStatus`
//! - [`validation`]: `ValidationEngine` with pluggable `RuleEvaluator`s
//! - [`curriculum`]: modules, tasks, hints
//! - [`playground`]: the execute / submit / reset / status facade

pub mod curriculum;
pub mod error;
pub mod fakes;
pub mod guard;
pub mod introspect;
pub mod obs;
pub mod playground;
pub mod telemetry;
pub mod validation;

pub use curriculum::{Curriculum, CurriculumError, Hint, Module, Task};
pub use error::{CoreError, CoreResult};
pub use guard::{
    ExecutionOutcome, ExecutorConfig, FailureKind, GuardedExecutor, PolicyVerdict, QueryRunner,
    SqlBlockRule, SqlPolicy,
};
pub use introspect::{Catalog, PgCatalog, SandboxStatus};
pub use playground::{Playground, SubmitOutcome};
pub use validation::{
    RuleEvaluator, RuleKind, ValidationContext, ValidationEngine, ValidationOutcome,
    ValidationRule,
};

pub use sqlpad_state::{LearnerId, PgConfig, SandboxRegistry};
