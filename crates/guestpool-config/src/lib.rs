//! Configuration parsing and validation for guestpool
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Per-field defaults (every key is optional)
//! - Validation with clear error messages
//! - A "never fail the login over config" loading mode that falls back to
//!   the default policy when the file is missing or unreadable

mod policy;
mod schema;
mod validation;

pub use policy::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/security/guestpool.toml";

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<PoolPolicy> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<PoolPolicy> {
    let raw: RawConfig = toml::from_str(content)?;

    let version = raw.config_version.unwrap_or(CURRENT_CONFIG_VERSION);
    if version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(PoolPolicy::from_raw(raw))
}

/// Load configuration, falling back to the default policy when the file is
/// missing or unreadable. A denied login should never hinge on a typo in the
/// config file, so callers at the framework boundary use this instead of
/// [`load_config`].
pub fn load_or_default(path: impl AsRef<Path>) -> PoolPolicy {
    let path = path.as_ref();
    match load_config(path) {
        Ok(policy) => policy,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unable to load config, using defaults");
            PoolPolicy::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_minimal_config() {
        let policy = parse_config("").unwrap();
        assert_eq!(policy, PoolPolicy::default());
    }

    #[test]
    fn parse_overrides() {
        let config = r#"
            config_version = 1

            [guest]
            enabled = false
            limit = 2
        "#;

        let policy = parse_config(config).unwrap();
        assert!(!policy.enabled);
        assert_eq!(policy.capacity, 2);
        assert_eq!(policy.guest_name, "guest");
    }

    #[test]
    fn reject_wrong_version() {
        let result = parse_config("config_version = 99\n");
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_values() {
        let result = parse_config("[guest]\nlimit = 0\n");
        assert!(matches!(result, Err(ConfigError::ValidationFailed { .. })));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let policy = load_or_default("/nonexistent/guestpool.toml");
        assert_eq!(policy, PoolPolicy::default());
    }

    #[test]
    fn unreadable_content_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"this is { not toml").unwrap();

        let policy = load_or_default(file.path());
        assert_eq!(policy, PoolPolicy::default());
    }

    #[test]
    fn readable_file_loads() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[guest]\nname = \"kiosk\"\n").unwrap();

        let policy = load_or_default(file.path());
        assert_eq!(policy.guest_name, "kiosk");
    }
}
