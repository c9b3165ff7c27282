//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version (defaults to the current version)
    pub config_version: Option<u32>,

    /// Guest pool settings
    #[serde(default)]
    pub guest: RawGuestConfig,
}

/// Guest pool settings; every field has a default
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawGuestConfig {
    /// Whether guest login is enabled at all (default: true)
    pub enabled: Option<bool>,

    /// Requested login name that triggers guest provisioning, and the
    /// prefix of allocated slot names (default: "guest")
    pub name: Option<String>,

    /// Group all guest accounts belong to (default: "guests")
    pub group: Option<String>,

    /// Maximum number of concurrent guest slots (default: 5)
    pub limit: Option<u32>,

    /// Size cap of each ephemeral home, in megabytes (default: 300)
    pub home_size_mib: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
            config_version = 1

            [guest]
            enabled = true
            name = "kiosk"
            group = "kiosks"
            limit = 3
            home_size_mib = 512
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.guest.name.as_deref(), Some("kiosk"));
        assert_eq!(config.guest.limit, Some(3));
    }

    #[test]
    fn parse_empty_config() {
        let config: RawConfig = toml::from_str("").unwrap();
        assert!(config.config_version.is_none());
        assert!(config.guest.enabled.is_none());
        assert!(config.guest.name.is_none());
    }

    #[test]
    fn parse_partial_guest_table() {
        let config: RawConfig = toml::from_str("[guest]\nlimit = 2\n").unwrap();
        assert_eq!(config.guest.limit, Some(2));
        assert!(config.guest.group.is_none());
    }
}
