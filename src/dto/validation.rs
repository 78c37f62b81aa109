//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates a player display name: 2-30 characters, alphanumeric plus
/// hyphen and underscore.
///
/// # Examples
///
/// ```ignore
/// validate_display_name("alice")      // Ok
/// validate_display_name("a")          // Err - too short
/// validate_display_name("al ice")     // Err - space
/// ```
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    let length = name.chars().count();
    if !(2..=30).contains(&length) {
        let mut err = ValidationError::new("display_name_length");
        err.message =
            Some(format!("Display name must be 2-30 characters (got {length})").into());
        return Err(err);
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        let mut err = ValidationError::new("display_name_format");
        err.message = Some(
            "Display name may contain only letters, digits, hyphens, and underscores".into(),
        );
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_display_name_valid() {
        assert!(validate_display_name("al").is_ok());
        assert!(validate_display_name("alice").is_ok());
        assert!(validate_display_name("player_1-EU").is_ok());
        assert!(validate_display_name("a".repeat(30).as_str()).is_ok());
    }

    #[test]
    fn test_validate_display_name_invalid_length() {
        assert!(validate_display_name("a").is_err()); // too short
        assert!(validate_display_name("").is_err()); // empty
        assert!(validate_display_name("a".repeat(31).as_str()).is_err()); // too long
    }

    #[test]
    fn test_validate_display_name_invalid_format() {
        assert!(validate_display_name("al ice").is_err()); // space
        assert!(validate_display_name("alice!").is_err()); // punctuation
        assert!(validate_display_name("ælice").is_err()); // non-ascii
    }
}
