//! Blocklist policy for learner SQL.
//!
//! Learners get full DDL/DML inside their own database; the blocklist only
//! stops statements that reach outside it (other databases, the server's
//! configuration, roles, the server filesystem or shell) and statements that
//! lift the per-run statement timeout.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Message shown to the learner for every blocked statement.
pub const BLOCKED_MESSAGE: &str = "This SQL command is not allowed for security reasons.";

/// A named pattern that blocks matching statements.
///
/// Patterns are matched case-insensitively, with `.` spanning newlines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlBlockRule {
    pub name: String,
    pub pattern: String,
    pub reason: String,
}

impl SqlBlockRule {
    pub fn new(
        name: impl Into<String>,
        pattern: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }
}

/// Outcome of checking a statement against the policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyVerdict {
    Allowed,
    Blocked { rule: String, reason: String },
}

impl PolicyVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyVerdict::Allowed)
    }
}

const STANDARD_RULES: &[(&str, &str, &str)] = &[
    (
        "drop_database",
        r"\bDROP\s+DATABASE\b",
        "dropping databases is not permitted",
    ),
    (
        "drop_schema",
        r"\bDROP\s+SCHEMA\b",
        "dropping schemas is not permitted",
    ),
    (
        "alter_system",
        r"\bALTER\s+SYSTEM\b",
        "changing server configuration is not permitted",
    ),
    (
        "role_management",
        r"\b(CREATE|ALTER|DROP)\s+(ROLE|USER)\b",
        "managing roles is not permitted",
    ),
    (
        "copy_program",
        r"\bCOPY\b.*?\b(FROM|TO)\s+PROGRAM\b",
        "running server programs is not permitted",
    ),
    (
        "copy_server_file",
        r"\bCOPY\b.*?\b(FROM|TO)\s+E?'",
        "reading or writing server files is not permitted",
    ),
    (
        "server_file_functions",
        r"\b(pg_read_file|pg_read_binary_file|pg_ls_dir|pg_stat_file|lo_import|lo_export)\s*\(",
        "reading or writing server files is not permitted",
    ),
    (
        "timeout_override",
        r"\bstatement_timeout\b|\bRESET\s+ALL\b|\bDISCARD\s+ALL\b",
        "changing the statement timeout is not permitted",
    ),
];

/// Ordered blocklist evaluated first-match-wins.
#[derive(Debug, Clone)]
pub struct SqlPolicy {
    rules: Vec<(SqlBlockRule, Regex)>,
}

impl SqlPolicy {
    /// A policy that allows everything.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Compile a policy from rules, failing on the first invalid pattern.
    pub fn new(rules: impl IntoIterator<Item = SqlBlockRule>) -> CoreResult<Self> {
        rules
            .into_iter()
            .try_fold(Self::empty(), |policy, rule| policy.with_rule(rule))
    }

    /// Append a rule (builder pattern).
    pub fn with_rule(mut self, rule: SqlBlockRule) -> CoreResult<Self> {
        let regex = RegexBuilder::new(&rule.pattern)
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
            .map_err(|err| CoreError::InvalidPolicy {
                name: rule.name.clone(),
                reason: err.to_string(),
            })?;
        self.rules.push((rule, regex));
        Ok(self)
    }

    /// Cross-database drops, server configuration, role management, server
    /// file/program access, and statement timeout overrides.
    pub fn standard() -> Self {
        Self::new(
            STANDARD_RULES
                .iter()
                .map(|(name, pattern, reason)| SqlBlockRule::new(*name, *pattern, *reason)),
        )
        .expect("built-in block patterns are valid regexes")
    }

    pub fn rules(&self) -> impl Iterator<Item = &SqlBlockRule> {
        self.rules.iter().map(|(rule, _)| rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Check `sql` against every rule in order.
    pub fn check(&self, sql: &str) -> PolicyVerdict {
        self.rules
            .iter()
            .find(|(_, regex)| regex.is_match(sql))
            .map(|(rule, _)| PolicyVerdict::Blocked {
                rule: rule.name.clone(),
                reason: rule.reason.clone(),
            })
            .unwrap_or(PolicyVerdict::Allowed)
    }
}

impl Default for SqlPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocked_by(sql: &str) -> Option<String> {
        match SqlPolicy::standard().check(sql) {
            PolicyVerdict::Blocked { rule, .. } => Some(rule),
            PolicyVerdict::Allowed => None,
        }
    }

    #[test]
    fn test_standard_rule_count() {
        assert_eq!(SqlPolicy::standard().len(), STANDARD_RULES.len());
    }

    #[test]
    fn test_blocks_each_class() {
        let cases = [
            ("DROP DATABASE foo", "drop_database"),
            ("drop   database\n foo;", "drop_database"),
            ("DROP SCHEMA public CASCADE", "drop_schema"),
            ("alter system set work_mem = '1GB'", "alter_system"),
            ("CREATE ROLE intruder SUPERUSER", "role_management"),
            ("alter user postgres with password 'x'", "role_management"),
            ("COPY chefs FROM PROGRAM 'cat /etc/passwd'", "copy_program"),
            ("copy (select 1)\n to program 'sh'", "copy_program"),
            ("COPY chefs FROM '/etc/passwd'", "copy_server_file"),
            ("COPY chefs TO E'/tmp/out'", "copy_server_file"),
            ("SELECT pg_read_file('/etc/passwd')", "server_file_functions"),
            ("select lo_import ('/etc/hosts')", "server_file_functions"),
            ("SET statement_timeout = 0; SELECT pg_sleep(60)", "timeout_override"),
            ("set local statement_timeout to default", "timeout_override"),
            ("RESET statement_timeout", "timeout_override"),
            ("SELECT set_config('statement_timeout', '0', false)", "timeout_override"),
            ("reset   all", "timeout_override"),
            ("DISCARD ALL", "timeout_override"),
        ];
        for (sql, rule) in cases {
            assert_eq!(blocked_by(sql).as_deref(), Some(rule), "sql: {sql}");
        }
    }

    #[test]
    fn test_allows_lesson_sql() {
        let allowed = [
            "CREATE EXTENSION \"uuid-ossp\"",
            "CREATE TABLE chefs (id UUID PRIMARY KEY, name VARCHAR(100) NOT NULL)",
            "ALTER TABLE chefs ADD COLUMN bio TEXT",
            "ALTER TABLE chefs DROP COLUMN bio",
            "DROP TABLE chefs",
            "CREATE TYPE course_type AS ENUM ('appetizer', 'main', 'dessert')",
            "INSERT INTO chefs (name) VALUES ('Julia Child')",
            "SELECT * FROM user_roles",
            "COPY chefs FROM STDIN",
            "SET search_path TO public",
            "SELECT * FROM timeouts",
        ];
        for sql in allowed {
            assert!(SqlPolicy::standard().check(sql).is_allowed(), "sql: {sql}");
        }
    }

    #[test]
    fn test_first_match_wins() {
        let policy = SqlPolicy::empty()
            .with_rule(SqlBlockRule::new("first", r"\bDROP\b", "first"))
            .unwrap()
            .with_rule(SqlBlockRule::new("second", r"\bDROP\s+TABLE\b", "second"))
            .unwrap();
        match policy.check("DROP TABLE chefs") {
            PolicyVerdict::Blocked { rule, .. } => assert_eq!(rule, "first"),
            other => panic!("expected Blocked, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = SqlPolicy::new([SqlBlockRule::new("broken", "(unclosed", "x")]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidPolicy { name, .. } if name == "broken"));
    }

    #[test]
    fn test_empty_policy_allows_everything() {
        assert!(SqlPolicy::empty().check("DROP DATABASE foo").is_allowed());
    }
}
