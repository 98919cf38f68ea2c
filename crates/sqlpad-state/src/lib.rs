//! SQLPad State: Postgres Sandboxes for Learners
//!
//! This crate owns the physical side of the playground: one scratch
//! database plus one connection pool per learner, created lazily on first
//! use and reset or torn down on demand.
//!
//! ## Layer 0 - Provisioning
//!
//! Focus: idempotent provisioning, per-learner isolation, and scoped
//! administrative connections.
//!
//! ## Key Components
//!
//! - `SandboxRegistry`: get-or-create registry of learner sandboxes
//! - `SandboxHandle`: the learner's database name, pool and provisioning state
//! - `SandboxBackend`: probe/create/open seam, implemented by `PgBackend`
//! - `PgConfig`: connection settings for the admin and sandbox roles

mod backend;
mod config;
mod error;
pub mod fakes;
mod handle;
mod learner;
mod registry;

pub use backend::{Created, PgBackend, Probe, SandboxBackend};
pub use config::PgConfig;
pub use error::{sqlstate, StateError};
pub use handle::{Provisioning, SandboxHandle};
pub use learner::{database_name, quote_ident, LearnerId};
pub use registry::SandboxRegistry;

/// Result type for sqlpad-state operations
pub type StateResult<T> = std::result::Result<T, StateError>;
