//! Input validation shared by the content services.
//!
//! Every check here runs before a write reaches storage, so a rejected input
//! never leaves a partial row behind.

use std::collections::HashSet;

use crate::cms::errors::CmsError;

/// Account name validation errors with helpful messages
#[derive(Debug, thiserror::Error)]
pub enum UsernameError {
    #[error("Username is too short (minimum {min} characters)")]
    TooShort { min: usize },

    #[error("Username is too long (maximum {max} characters)")]
    TooLong { max: usize },

    #[error("Username cannot start or end with whitespace")]
    InvalidWhitespace,

    #[error("Username contains invalid characters: {chars}")]
    InvalidCharacters { chars: String },

    #[error("Username is a reserved system name")]
    Reserved,
}

impl From<UsernameError> for CmsError {
    fn from(err: UsernameError) -> Self {
        CmsError::Validation(err.to_string())
    }
}

const USERNAME_MIN: usize = 2;
const USERNAME_MAX: usize = 20;

/// Longest free-text field accepted (descriptions, Lua bodies are exempt).
pub const MAX_TEXT_LEN: usize = 4096;

fn reserved_names() -> HashSet<&'static str> {
    [
        "admin", "administrator", "root", "system", "operator", "guest", "anonymous",
        "self", "someone", "something", "all", "none", "null", "undefined",
    ]
    .iter()
    .copied()
    .collect()
}

/// Validate a builder/staff account name. Returns the canonical lowercase form.
///
/// `allow_reserved` is set when seeding the bootstrap administrator from config.
pub fn validate_username(username: &str, allow_reserved: bool) -> Result<String, UsernameError> {
    let trimmed = username.trim();
    if trimmed != username {
        return Err(UsernameError::InvalidWhitespace);
    }
    if trimmed.chars().count() < USERNAME_MIN {
        return Err(UsernameError::TooShort { min: USERNAME_MIN });
    }
    if trimmed.chars().count() > USERNAME_MAX {
        return Err(UsernameError::TooLong { max: USERNAME_MAX });
    }

    let invalid: HashSet<char> = trimmed
        .chars()
        .filter(|ch| !(ch.is_ascii_alphanumeric() || *ch == '_' || *ch == '-'))
        .collect();
    if !invalid.is_empty() {
        let mut chars: Vec<char> = invalid.into_iter().collect();
        chars.sort_unstable();
        return Err(UsernameError::InvalidCharacters {
            chars: chars.into_iter().collect(),
        });
    }

    let lower = trimmed.to_ascii_lowercase();
    if !allow_reserved && reserved_names().contains(lower.as_str()) {
        return Err(UsernameError::Reserved);
    }
    Ok(lower)
}

/// Probabilities are fractions in `[0.0, 1.0]`; NaN is rejected.
pub fn validate_probability(field: &str, value: f64) -> Result<f64, CmsError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(CmsError::Validation(format!(
            "{} must be between 0.0 and 1.0 (got {})",
            field, value
        )));
    }
    Ok(value)
}

/// Instance caps and counts must be at least one.
pub fn validate_at_least_one(field: &str, value: u32) -> Result<u32, CmsError> {
    if value < 1 {
        return Err(CmsError::Validation(format!("{} must be at least 1", field)));
    }
    Ok(value)
}

pub fn validate_level_range(min_level: u32, max_level: u32) -> Result<(), CmsError> {
    if min_level > max_level {
        return Err(CmsError::Validation(format!(
            "minLevel ({}) cannot exceed maxLevel ({})",
            min_level, max_level
        )));
    }
    Ok(())
}

/// Required single-line text: trimmed, non-empty, bounded.
pub fn require_text(field: &str, value: &str) -> Result<String, CmsError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CmsError::Validation(format!("{} cannot be empty", field)));
    }
    if trimmed.len() > MAX_TEXT_LEN {
        return Err(CmsError::Validation(format!(
            "{} is too long (max {} bytes)",
            field, MAX_TEXT_LEN
        )));
    }
    Ok(trimmed.to_string())
}

/// Social command names are typed by players, so only lowercase letters.
pub fn validate_social_name(name: &str) -> Result<String, CmsError> {
    let lower = name.trim().to_ascii_lowercase();
    if lower.is_empty() || lower.len() > 20 || !lower.chars().all(|c| c.is_ascii_lowercase()) {
        return Err(CmsError::Validation(format!(
            "social name '{}' must be 1-20 letters",
            name
        )));
    }
    Ok(lower)
}

/// Spawn condition parameters must be a JSON object so the game can look up
/// named fields.
pub fn validate_condition_parameters(value: &serde_json::Value) -> Result<(), CmsError> {
    if !value.is_object() {
        return Err(CmsError::Validation(
            "spawn condition parameters must be a JSON object".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probability_bounds() {
        assert!(validate_probability("probability", 0.0).is_ok());
        assert!(validate_probability("probability", 1.0).is_ok());
        assert!(validate_probability("probability", 0.75).is_ok());
        assert!(validate_probability("probability", -0.01).is_err());
        assert!(validate_probability("probability", 1.01).is_err());
        assert!(validate_probability("probability", f64::NAN).is_err());
    }

    #[test]
    fn at_least_one() {
        assert!(validate_at_least_one("maxInstances", 0).is_err());
        assert_eq!(validate_at_least_one("maxInstances", 3).unwrap(), 3);
    }

    #[test]
    fn usernames() {
        assert_eq!(validate_username("Zuriel", false).unwrap(), "zuriel");
        assert!(matches!(validate_username("a", false), Err(UsernameError::TooShort { .. })));
        assert!(matches!(validate_username(" bob", false), Err(UsernameError::InvalidWhitespace)));
        assert!(matches!(validate_username("root", false), Err(UsernameError::Reserved)));
        assert_eq!(validate_username("root", true).unwrap(), "root");
        match validate_username("bad/name!", false) {
            Err(UsernameError::InvalidCharacters { chars }) => assert_eq!(chars, "!/"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn social_names() {
        assert_eq!(validate_social_name("Bow").unwrap(), "bow");
        assert!(validate_social_name("bow2").is_err());
        assert!(validate_social_name("").is_err());
    }

    #[test]
    fn condition_parameters_must_be_objects() {
        assert!(validate_condition_parameters(&serde_json::json!({"hour": 6})).is_ok());
        assert!(validate_condition_parameters(&serde_json::json!([1, 2])).is_err());
    }
}
