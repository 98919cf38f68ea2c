//! Translation of Postgres error codes into learner-friendly messages.

/// query_canceled, raised when `statement_timeout` fires
pub const QUERY_CANCELED: &str = "57014";

/// SQLSTATE -> explanation for the error classes learners hit most.
const FRIENDLY_CAUSES: &[(&str, &str)] = &[
    (
        "42P07",
        "Table already exists. Did you mean to use a different name?",
    ),
    (
        "42710",
        "Object already exists. Did you mean to use a different name?",
    ),
    (
        "42P01",
        "Table does not exist. Check your spelling and make sure the table was created.",
    ),
    ("42703", "Column does not exist. Check the column name spelling."),
    ("23505", "This value already exists. UNIQUE constraint violation."),
    (
        "23503",
        "Foreign key constraint violation. The referenced record does not exist.",
    ),
    (
        "23502",
        "NOT NULL constraint violation. This column requires a value.",
    ),
    (
        "23514",
        "CHECK constraint violation. The value does not meet the required condition.",
    ),
    ("42601", "Syntax error. Check your SQL syntax."),
    (
        "42804",
        "Data type mismatch. The value type does not match the column type.",
    ),
];

/// Friendly explanation for a SQLSTATE, if it is one of the mapped classes.
pub fn friendly_cause(code: &str) -> Option<&'static str> {
    FRIENDLY_CAUSES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, cause)| *cause)
}

/// Whether the code means the statement was cancelled by its timeout.
pub fn is_timeout(code: Option<&str>) -> bool {
    code == Some(QUERY_CANCELED)
}

/// Learner-facing message for a database error.
///
/// Mapped codes get the explanation followed by the driver's own message;
/// anything else is the driver message unchanged.
pub fn describe_database_error(code: Option<&str>, message: &str, timeout_ms: u64) -> String {
    let cause = match code {
        Some(QUERY_CANCELED) => format!(
            "The statement took too long and was cancelled (timeout of {timeout_ms} ms)."
        ),
        Some(code) => match friendly_cause(code) {
            Some(cause) => cause.to_string(),
            None => return message.to_string(),
        },
        None => return message.to_string(),
    };
    format!("{cause}\n\nDetails: {message}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapped_code_prefixes_details() {
        let msg = describe_database_error(
            Some("42P01"),
            "relation \"chefs\" does not exist",
            3000,
        );
        assert!(msg.starts_with("Table does not exist."));
        assert!(msg.ends_with("Details: relation \"chefs\" does not exist"));
    }

    #[test]
    fn test_every_mapped_code_has_a_cause() {
        for code in [
            "42P07", "42P01", "42703", "23505", "23503", "23502", "23514", "42601", "42804",
        ] {
            assert!(friendly_cause(code).is_some(), "code {code}");
        }
    }

    #[test]
    fn test_unmapped_code_passes_raw_message() {
        let raw = "division by zero";
        assert_eq!(describe_database_error(Some("22012"), raw, 3000), raw);
        assert_eq!(describe_database_error(None, raw, 3000), raw);
    }

    #[test]
    fn test_timeout_names_the_limit() {
        let msg = describe_database_error(
            Some(QUERY_CANCELED),
            "canceling statement due to statement timeout",
            1500,
        );
        assert!(msg.contains("1500 ms"));
        assert!(is_timeout(Some("57014")));
        assert!(!is_timeout(Some("42601")));
        assert!(!is_timeout(None));
    }
}
