//! Connection settings for the administrative role and the sandbox role.

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use crate::error::StateError;
use crate::StateResult;

/// Longest accepted database name prefix; leaves room for the learner slug.
const MAX_PREFIX_LEN: usize = 40;

/// Configuration for the Postgres server hosting learner sandboxes
#[derive(Debug, Clone, PartialEq)]
pub struct PgConfig {
    /// Server host (default: "localhost")
    pub host: String,
    /// Server port (default: 5432)
    pub port: u16,
    /// Role used to create sandbox databases
    pub admin_user: String,
    pub admin_password: String,
    /// Database the admin role connects to for `CREATE DATABASE` (default: "postgres")
    pub admin_database: String,
    /// Role that learner statements run as
    pub sandbox_user: String,
    pub sandbox_password: String,
    /// Prefix of every sandbox database name (default: "golden_whisk_sandbox_")
    pub database_prefix: String,
    /// Upper bound on pooled connections per learner (default: 5)
    pub max_connections: u32,
    /// How long a statement may wait for a pooled connection (default: 5000ms)
    pub acquire_timeout_ms: u64,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            admin_user: "postgres".to_string(),
            admin_password: "postgres".to_string(),
            admin_database: "postgres".to_string(),
            sandbox_user: "postgres".to_string(),
            sandbox_password: "postgres".to_string(),
            database_prefix: "golden_whisk_sandbox_".to_string(),
            max_connections: 5,
            acquire_timeout_ms: 5_000,
        }
    }
}

impl PgConfig {
    /// Create a configuration for the given server with default roles
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Set the administrative role
    pub fn with_admin(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.admin_user = user.into();
        self.admin_password = password.into();
        self
    }

    /// Set the role learner statements run as
    pub fn with_sandbox_role(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.sandbox_user = user.into();
        self.sandbox_password = password.into();
        self
    }

    /// Set custom database name prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.database_prefix = prefix.into();
        self
    }

    /// Set the per-learner pool size
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Create from environment variables
    ///
    /// Reads (all optional):
    /// - DB_HOST, DB_PORT
    /// - DB_USER, DB_PASSWORD, DB_ADMIN_DATABASE
    /// - SANDBOX_DB_USER, SANDBOX_DB_PASSWORD, SANDBOX_DB_PREFIX
    /// - SANDBOX_POOL_MAX_CONNECTIONS, SANDBOX_POOL_ACQUIRE_TIMEOUT_MS
    pub fn from_env() -> StateResult<Self> {
        let defaults = Self::default();
        let var = |name: &str, default: &str| {
            std::env::var(name).unwrap_or_else(|_| default.to_string())
        };

        let config = Self {
            host: var("DB_HOST", &defaults.host),
            port: parse_env("DB_PORT", defaults.port)?,
            admin_user: var("DB_USER", &defaults.admin_user),
            admin_password: var("DB_PASSWORD", &defaults.admin_password),
            admin_database: var("DB_ADMIN_DATABASE", &defaults.admin_database),
            sandbox_user: var("SANDBOX_DB_USER", &defaults.sandbox_user),
            sandbox_password: var("SANDBOX_DB_PASSWORD", &defaults.sandbox_password),
            database_prefix: var("SANDBOX_DB_PREFIX", &defaults.database_prefix),
            max_connections: parse_env("SANDBOX_POOL_MAX_CONNECTIONS", defaults.max_connections)?,
            acquire_timeout_ms: parse_env(
                "SANDBOX_POOL_ACQUIRE_TIMEOUT_MS",
                defaults.acquire_timeout_ms,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the settings that end up inside generated SQL or pool sizing.
    pub fn validate(&self) -> StateResult<()> {
        let prefix = &self.database_prefix;
        let well_formed = prefix
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
            && prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !well_formed || prefix.len() > MAX_PREFIX_LEN {
            return Err(StateError::Config(format!(
                "database prefix '{prefix}' must match [a-z_][a-z0-9_]* and be at most {MAX_PREFIX_LEN} bytes"
            )));
        }
        if self.max_connections == 0 {
            return Err(StateError::Config(
                "SANDBOX_POOL_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Options for the administrative connection used to create databases
    pub fn admin_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.admin_user)
            .password(&self.admin_password)
            .database(&self.admin_database)
    }

    /// Options for connecting to one sandbox database as the sandbox role
    pub fn sandbox_options(&self, database: &str) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.sandbox_user)
            .password(&self.sandbox_password)
            .database(database)
    }

    /// Build a lazily-connecting pool for one sandbox database
    pub fn sandbox_pool(&self, database: &str) -> PgPool {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_millis(self.acquire_timeout_ms))
            .connect_lazy_with(self.sandbox_options(database))
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> StateResult<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| StateError::Config(format!("{name}='{raw}' is not a valid value"))),
        Err(_) => Ok(default),
    }
}
