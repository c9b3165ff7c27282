//! Configuration validation

use crate::schema::RawConfig;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("guest.limit must be greater than zero")]
    ZeroLimit,

    #[error("guest.home_size_mib must be greater than zero")]
    ZeroHomeSize,

    #[error("Invalid {field} '{value}': {message}")]
    InvalidName {
        field: &'static str,
        value: String,
        message: String,
    },
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.guest.limit == Some(0) {
        errors.push(ValidationError::ZeroLimit);
    }

    if config.guest.home_size_mib == Some(0) {
        errors.push(ValidationError::ZeroHomeSize);
    }

    if let Some(name) = &config.guest.name {
        if let Err(message) = validate_account_name(name) {
            errors.push(ValidationError::InvalidName {
                field: "guest.name",
                value: name.clone(),
                message,
            });
        } else if name.ends_with(|c: char| c.is_ascii_digit()) {
            // Slot names are base + index; a base ending in a digit would
            // make them unparseable.
            errors.push(ValidationError::InvalidName {
                field: "guest.name",
                value: name.clone(),
                message: "must not end with a digit".into(),
            });
        }
    }

    if let Some(group) = &config.guest.group {
        if let Err(message) = validate_account_name(group) {
            errors.push(ValidationError::InvalidName {
                field: "guest.group",
                value: group.clone(),
                message,
            });
        }
    }

    errors
}

/// Check a user or group name against the portable POSIX subset
pub fn validate_account_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("cannot be empty".into());
    }
    if name.len() > 32 {
        return Err("longer than 32 characters".into());
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err("must not start with a digit".into());
    }
    for c in name.chars() {
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-') {
            return Err(format!("invalid character '{}'", c));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_name_rules() {
        assert!(validate_account_name("guest").is_ok());
        assert!(validate_account_name("kiosk-user_a").is_ok());

        assert!(validate_account_name("").is_err());
        assert!(validate_account_name("1guest").is_err());
        assert!(validate_account_name("Guest").is_err());
        assert!(validate_account_name("gu est").is_err());
        assert!(validate_account_name("guest/../../etc").is_err());
    }

    #[test]
    fn zero_limit_rejected() {
        let raw: RawConfig = toml::from_str("[guest]\nlimit = 0\n").unwrap();
        let errors = validate_config(&raw);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::ZeroLimit)));
    }

    #[test]
    fn zero_home_size_rejected() {
        let raw: RawConfig = toml::from_str("[guest]\nhome_size_mib = 0\n").unwrap();
        let errors = validate_config(&raw);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::ZeroHomeSize)));
    }

    #[test]
    fn digit_suffixed_base_name_rejected() {
        let raw: RawConfig = toml::from_str("[guest]\nname = \"guest2\"\n").unwrap();
        let errors = validate_config(&raw);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidName { field: "guest.name", .. })));
    }

    #[test]
    fn defaults_are_valid() {
        let errors = validate_config(&RawConfig::default());
        assert!(errors.is_empty());
    }
}
