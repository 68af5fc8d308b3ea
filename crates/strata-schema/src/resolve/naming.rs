use crate::{MAX_CLASS_NAME_LEN, SchemaError};

/// Ensure class/relation names are non-empty ASCII identifiers within the
/// maximum length.
pub(crate) fn validate_class_name(name: &str) -> Result<(), SchemaError> {
    let invalid = |reason: String| SchemaError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name is empty".to_string()));
    }
    if name.len() > MAX_CLASS_NAME_LEN {
        return Err(invalid(format!(
            "exceeds max length {MAX_CLASS_NAME_LEN}"
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("must be ASCII alphanumeric or '_'".to_string()));
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(invalid("must not start with a digit".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_non_identifier_names() {
        assert!(validate_class_name("").is_err(), "empty names should fail");
        assert!(validate_class_name("Order Line").is_err());
        assert!(validate_class_name("1Order").is_err());
        assert!(validate_class_name(&"A".repeat(MAX_CLASS_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn accepts_plain_identifier() {
        assert!(validate_class_name("Order_Line2").is_ok());
    }
}
