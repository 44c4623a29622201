//! SQL identifier validation, ported from the relational query builder this
//! adapter is grounded on. Collection and field names come from
//! user-authored descriptors, so every identifier interpolated into SQL
//! text is checked against this allowlist first.

/// A bare SQL identifier: starts with a letter or underscore, followed by
/// letters, digits, or underscores. Rejects quotes, dots, and whitespace —
/// anything that could break out of an identifier position.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Double-quote an identifier already known to be valid.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{name}\"")
}

#[derive(Debug)]
pub struct InvalidIdentifier(pub String);

impl std::fmt::Display for InvalidIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid identifier: `{}`", self.0)
    }
}

impl std::error::Error for InvalidIdentifier {}

pub fn validate(name: &str) -> Result<&str, InvalidIdentifier> {
    if is_valid_identifier(name) {
        Ok(name)
    } else {
        Err(InvalidIdentifier(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        assert!(is_valid_identifier("todo"));
        assert!(is_valid_identifier("_private"));
        assert!(is_valid_identifier("user_id"));
    }

    #[test]
    fn rejects_identifiers_that_could_escape_quoting() {
        assert!(!is_valid_identifier("todo; DROP TABLE users"));
        assert!(!is_valid_identifier("todo\""));
        assert!(!is_valid_identifier("todo.other"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1todo"));
    }
}
