//! Validation of labels and index names spliced into SQL.
//!
//! Graph labels end up in partial-index predicates and index names, which
//! cannot be bound as query parameters.

use tessera_core::{Error, Result};

/// PostgreSQL identifier length limit.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Validate a label or index name before it is interpolated into SQL.
///
/// Identifiers must:
/// - Not be empty
/// - Not exceed 63 characters
/// - Contain only ASCII alphanumeric characters and underscores
/// - Not start with a digit
///
/// # Examples
///
/// ```
/// use tessera_db::validate_identifier;
///
/// assert!(validate_identifier("Person").is_ok());
/// assert!(validate_identifier("person_embeddings").is_ok());
/// assert!(validate_identifier("1st").is_err());
/// assert!(validate_identifier("Person'; DROP TABLE graph_node; --").is_err());
/// ```
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput("Identifier cannot be empty".to_string()));
    }

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::InvalidInput(format!(
            "Identifier exceeds {} character limit: {} characters",
            MAX_IDENTIFIER_LEN,
            name.len()
        )));
    }

    if let Some(first) = name.chars().next() {
        if first.is_ascii_digit() {
            return Err(Error::InvalidInput(format!(
                "Identifier must not start with a digit: '{}'",
                name
            )));
        }
    }

    if let Some(ch) = name.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '_') {
        return Err(Error::InvalidInput(format!(
            "Identifier '{}' contains invalid character '{}'",
            name, ch
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(validate_identifier("Person").is_ok());
        assert!(validate_identifier("EmailAddress").is_ok());
        assert!(validate_identifier("_internal").is_ok());
        assert!(validate_identifier("organization_embeddings").is_ok());
    }

    #[test]
    fn test_empty_identifier() {
        match validate_identifier("") {
            Err(Error::InvalidInput(msg)) => assert!(msg.contains("empty")),
            _ => panic!("Expected InvalidInput error for empty identifier"),
        }
    }

    #[test]
    fn test_identifier_too_long() {
        let long = "a".repeat(64);
        match validate_identifier(&long) {
            Err(Error::InvalidInput(msg)) => assert!(msg.contains("63 character limit")),
            _ => panic!("Expected InvalidInput error for long identifier"),
        }
        assert!(validate_identifier(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_identifier_rejects_quotes_and_spaces() {
        assert!(validate_identifier("Job Title").is_err());
        assert!(validate_identifier("it's").is_err());
        assert!(validate_identifier("a-b").is_err());
    }

    #[test]
    fn test_identifier_rejects_leading_digit() {
        assert!(validate_identifier("9lives").is_err());
    }
}
