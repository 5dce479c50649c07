use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use movie_harvest_catalog::{DEFAULT_BASE_URL, DEFAULT_REQUEST_DELAY_MS, DEFAULT_TIMEOUT_MS};
use movie_harvest_core::{CleanerConfig, TrendConfig};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGES: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct CatalogSettings {
    pub base_url: String,
    pub timeout_ms: u64,
    pub request_delay_ms: u64,
    pub pages: u32,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            pages: DEFAULT_PAGES,
        }
    }
}

impl CatalogSettings {
    #[must_use]
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// Settings for one pipeline run, loaded from an optional YAML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct HarvestConfig {
    pub catalog: CatalogSettings,
    pub cleaning: CleanerConfig,
    pub trends: TrendConfig,
}

impl HarvestConfig {
    /// Loads `path` when given, otherwise the defaults. Either way the result
    /// is validated.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read, is not valid YAML for
    /// this shape, or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                Self::from_yaml(&raw)
                    .with_context(|| format!("invalid config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns an error when `raw` is not valid YAML for this shape.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|err| anyhow!("failed to parse config YAML: {err}"))
    }

    /// # Errors
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.cleaning.validate()?;
        self.trends.validate()?;

        if self.catalog.base_url.trim().is_empty() {
            return Err(anyhow!("catalog.base_url MUST be non-empty"));
        }
        if self.catalog.timeout_ms == 0 {
            return Err(anyhow!("catalog.timeout_ms MUST be >= 1"));
        }
        if self.catalog.pages == 0 {
            return Err(anyhow!("catalog.pages MUST be >= 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]

    use super::*;

    fn must_ok<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err:#}"),
        }
    }

    #[test]
    fn partial_yaml_keeps_defaults_elsewhere() {
        let config = must_ok(HarvestConfig::from_yaml(
            "cleaning:\n  min_votes: 250\ntrends:\n  top_genre_count: 3\n",
        ));

        assert_eq!(config.cleaning.min_votes, 250.0);
        assert_eq!(config.trends.top_genre_count, 3);
        assert_eq!(config.trends.rolling_window, 3);
        assert_eq!(config.catalog, CatalogSettings::default());
        must_ok(config.validate());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(HarvestConfig::from_yaml("cleaning:\n  min_vote: 10\n").is_err());
        assert!(HarvestConfig::from_yaml("extra: true\n").is_err());
    }

    #[test]
    fn validation_rejects_degenerate_settings() {
        let mut config = HarvestConfig::default();
        config.catalog.pages = 0;
        assert!(config.validate().is_err());

        let mut config = HarvestConfig::default();
        config.trends.rolling_window = 0;
        assert!(config.validate().is_err());

        let mut config = HarvestConfig::default();
        config.cleaning.min_votes = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_path_yields_defaults() {
        let config = must_ok(HarvestConfig::load(None));
        assert_eq!(config, HarvestConfig::default());
        assert_eq!(config.catalog.request_delay(), Duration::from_millis(250));
    }
}
