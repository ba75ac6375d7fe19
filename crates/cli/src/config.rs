//! `acted.toml`: engine, rule store and VAT settings in one file.

use std::path::Path;

use acted_eval::EngineConfig;
use acted_storage::StoreConfig;
use acted_vat::VatConfig;
use serde::Deserialize;

/// Read when `--config` is not given.
pub(crate) const DEFAULT_CONFIG_FILE: &str = "acted.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ActedConfig {
    pub engine: EngineConfig,
    pub store: StoreConfig,
    pub vat: VatConfig,
}

impl ActedConfig {
    /// Load settings. An explicit path must exist; the default file is
    /// optional and its absence means defaults.
    pub(crate) fn load(explicit: Option<&Path>) -> Result<Self, String> {
        let path = match explicit {
            Some(p) => p,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("error reading config '{}': {}", path.display(), e))?;
        let config = Self::parse(&text)
            .map_err(|e| format!("error parsing config '{}': {}", path.display(), e))?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(config)
    }

    pub(crate) fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let c = ActedConfig::parse("").unwrap();
        assert_eq!(c.engine, EngineConfig::default());
        assert_eq!(c.store, StoreConfig::default());
        assert_eq!(c.vat, VatConfig::default());
    }

    #[test]
    fn sections_override_their_fields_only() {
        let c = ActedConfig::parse(
            r#"
            [engine]
            strict = true

            [store]
            ttl_secs = 5

            [vat]
            default_country = "IE"
            "#,
        )
        .unwrap();
        assert!(c.engine.strict);
        assert_eq!(c.engine.max_call_depth, 8);
        assert_eq!(c.store.ttl_secs, 5);
        assert_eq!(c.vat.default_country, "IE");
        assert_eq!(c.vat.entry_point, "cart_calculate_vat");
    }

    #[test]
    fn wrong_types_are_rejected() {
        assert!(ActedConfig::parse("[engine]\nstrict = \"yes\"").is_err());
    }
}
