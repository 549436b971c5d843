use thiserror::Error;

/// Shortest registrable name.
pub const NAME_MIN_LEN: usize = 3;
/// Longest registrable name.
pub const NAME_MAX_LEN: usize = 36;

/// Reasons a name is rejected at registration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("name must be between {NAME_MIN_LEN} and {NAME_MAX_LEN} characters")]
    InvalidLength,
    #[error("name may only contain alphanumeric characters, dots, underscores and hyphens")]
    InvalidCharacters,
    #[error("name is not available for registration")]
    Disallowed,
}

/// Validate a name against the registration rules: 3-36 characters drawn from
/// `[A-Za-z0-9._-]` and not on the disallowed list. The disallowed match is
/// case-insensitive.
pub fn validate_name(name: &str, disallowed: &[String]) -> Result<(), NameError> {
    if name.len() < NAME_MIN_LEN || name.len() > NAME_MAX_LEN {
        return Err(NameError::InvalidLength);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(NameError::InvalidCharacters);
    }
    let lowered = name.to_lowercase();
    if disallowed.iter().any(|d| d.to_lowercase() == lowered) {
        return Err(NameError::Disallowed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_names_within_the_rules() {
        assert_eq!(validate_name("alice", &[]), Ok(()));
        assert_eq!(validate_name("a.b_c-9", &[]), Ok(()));
        assert_eq!(validate_name(&"x".repeat(NAME_MAX_LEN), &[]), Ok(()));
    }

    #[test]
    fn rejects_bad_lengths() {
        assert_eq!(validate_name("ab", &[]), Err(NameError::InvalidLength));
        assert_eq!(
            validate_name(&"x".repeat(NAME_MAX_LEN + 1), &[]),
            Err(NameError::InvalidLength)
        );
    }

    #[test]
    fn rejects_bad_characters() {
        assert_eq!(
            validate_name("has space", &[]),
            Err(NameError::InvalidCharacters)
        );
        assert_eq!(
            validate_name("emoji💥", &[]),
            Err(NameError::InvalidCharacters)
        );
    }

    #[test]
    fn disallowed_list_is_case_insensitive() {
        let disallowed = vec!["Admin".to_string()];
        assert_eq!(validate_name("admin", &disallowed), Err(NameError::Disallowed));
        assert_eq!(validate_name("ADMIN", &disallowed), Err(NameError::Disallowed));
        assert_eq!(validate_name("admin2", &disallowed), Ok(()));
    }
}
