//! Learner identifiers and the learner -> database name mapping.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StateError;

/// Postgres truncates identifiers longer than this many bytes.
pub(crate) const MAX_IDENT_LEN: usize = 63;

const MAX_LEARNER_ID_LEN: usize = 128;

/// Hex chars of the learner id digest appended to non-trivial slugs.
const HASH_SUFFIX_LEN: usize = 10;

/// Identifier of a learner as received from the request boundary.
///
/// Construction validates the id; the raw text is never interpolated into
/// SQL, only the derived database name is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LearnerId(String);

impl LearnerId {
    pub fn new(id: impl Into<String>) -> Result<Self, StateError> {
        let id = id.into();
        let invalid = |reason: &str| StateError::InvalidLearnerId {
            id: id.clone(),
            reason: reason.to_string(),
        };

        if id.is_empty() {
            return Err(invalid("must not be empty"));
        }
        if id.len() > MAX_LEARNER_ID_LEN {
            return Err(invalid("must be at most 128 bytes"));
        }
        if id.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(invalid("must not contain whitespace or control characters"));
        }
        Ok(LearnerId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for LearnerId {
    type Error = StateError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        LearnerId::new(s)
    }
}

impl From<LearnerId> for String {
    fn from(id: LearnerId) -> Self {
        id.0
    }
}

impl std::str::FromStr for LearnerId {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LearnerId::new(s)
    }
}

impl std::fmt::Display for LearnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic sandbox database name for a learner.
///
/// Ids made only of `[a-z0-9_]` map to `prefix + id`. Anything else is
/// slugged and suffixed with a digest of the raw id, so `Alice` and `alice`
/// never share a database and the result always fits in 63 bytes.
pub fn database_name(prefix: &str, learner: &LearnerId) -> String {
    let raw = learner.as_str();
    let slug: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else if c.is_ascii_uppercase() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    if slug == raw && prefix.len() + slug.len() <= MAX_IDENT_LEN {
        return format!("{prefix}{slug}");
    }

    let digest = hex::encode(Sha256::digest(raw.as_bytes()));
    let budget = MAX_IDENT_LEN.saturating_sub(prefix.len() + 1 + HASH_SUFFIX_LEN);
    // slug is pure ASCII here, so byte slicing is char-safe
    let head = &slug[..budget.min(slug.len())];
    format!("{prefix}{head}_{}", &digest[..HASH_SUFFIX_LEN])
}

/// Quote an identifier for use in DDL (`"name"`, inner quotes doubled).
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "golden_whisk_sandbox_";

    fn learner(id: &str) -> LearnerId {
        LearnerId::new(id).unwrap()
    }

    #[test]
    fn test_rejects_empty_and_whitespace() {
        assert!(LearnerId::new("").is_err());
        assert!(LearnerId::new("bad id").is_err());
        assert!(LearnerId::new("tab\tid").is_err());
        assert!(LearnerId::new("x".repeat(129)).is_err());
        assert!(LearnerId::new("user_42").is_ok());
    }

    #[test]
    fn test_simple_ids_map_verbatim() {
        assert_eq!(
            database_name(PREFIX, &learner("user_42")),
            "golden_whisk_sandbox_user_42"
        );
    }

    #[test]
    fn test_name_is_deterministic() {
        let id = learner("3f2a-BEEF");
        assert_eq!(database_name(PREFIX, &id), database_name(PREFIX, &id));
    }

    #[test]
    fn test_case_variants_do_not_collide() {
        let upper = database_name(PREFIX, &learner("Alice"));
        let lower = database_name(PREFIX, &learner("alice"));
        assert_ne!(upper, lower);
        assert!(upper.starts_with("golden_whisk_sandbox_alice_"));
    }

    #[test]
    fn test_uuid_ids_are_slugged() {
        let name = database_name(PREFIX, &learner("5b0c8f4e-0d3a-4c1e-9f7a-2a1b3c4d5e6f"));
        assert!(name.len() <= MAX_IDENT_LEN);
        assert!(name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
    }

    #[test]
    fn test_long_ids_fit_identifier_limit() {
        let name = database_name(PREFIX, &learner(&"a".repeat(120)));
        assert_eq!(name.len(), MAX_IDENT_LEN);
    }

    #[test]
    fn test_quote_ident_doubles_quotes() {
        assert_eq!(quote_ident("chefs"), "\"chefs\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_serde_validates() {
        let ok: LearnerId = serde_json::from_str("\"learner_1\"").unwrap();
        assert_eq!(ok.as_str(), "learner_1");
        assert!(serde_json::from_str::<LearnerId>("\"\"").is_err());
    }
}
