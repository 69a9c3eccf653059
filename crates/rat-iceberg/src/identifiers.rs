//! SQL identifier validation shared by every hand-built fallback query in
//! this crate. Column and table names come from table metadata and pipeline
//! config, not directly from user SQL, but they still flow into
//! string-built SQL so they're validated the same way a literal would be.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::IcebergError;

fn safe_identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap())
}

/// Validate and double-quote an identifier for interpolation into SQL.
pub fn quote_identifier(name: &str) -> Result<String, IcebergError> {
    if !safe_identifier_re().is_match(name) {
        return Err(IcebergError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}

/// Validate every identifier in `names`, short-circuiting on the first bad
/// one.
pub fn validate_identifiers<'a, I: IntoIterator<Item = &'a str>>(names: I) -> Result<(), IcebergError> {
    for name in names {
        if !safe_identifier_re().is_match(name) {
            return Err(IcebergError::InvalidIdentifier(name.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_valid_identifier() {
        assert_eq!(quote_identifier("order_id").unwrap(), "\"order_id\"");
    }

    #[test]
    fn rejects_identifier_with_quote() {
        assert!(quote_identifier("id\"; drop table x --").is_err());
    }

    #[test]
    fn validate_identifiers_rejects_any_bad_name() {
        assert!(validate_identifiers(["ok", "also_ok", "bad name"]).is_err());
        assert!(validate_identifiers(["ok", "also_ok"]).is_ok());
    }
}
