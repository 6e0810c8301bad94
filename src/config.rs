//! Shipping configuration: box catalog, sizing tables, origins and API
//! settings. Loaded once, validated eagerly, then handed by value to the
//! components that need it. Reloading means building new components.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeError;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::sizing::default_box_catalog;
use crate::domain::{Address, ShippingBox, SizingModel, SortPreference};
use crate::infra::carrier_api::DEFAULT_BASE_URL;

const APP_QUALIFIER: &str = "com";
const APP_ORG: &str = "ParcelQuote";
const APP_NAME: &str = "ParcelQuote";
const CONFIG_FILENAME: &str = "shipping.json";

pub const DEFAULT_API_KEY_ENV: &str = "CARRIER_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config directory unavailable")]
    StorageUnavailable,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] SerdeError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A physical ship-from location and the carrier accounts that ship from it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OriginConfig {
    pub name: String,
    pub address: Address,
    #[serde(default)]
    pub carrier_accounts: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_rate_cache_ttl")]
    pub rate_cache_ttl_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_rate_cache_ttl() -> u64 {
    600
}

fn default_top_n() -> usize {
    3
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            rate_cache_ttl_secs: default_rate_cache_ttl(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShippingConfig {
    pub boxes: Vec<ShippingBox>,
    pub sizing: SizingModel,
    #[serde(default)]
    pub sort_preference: SortPreference,
    /// How many options a quote presents.
    #[serde(default = "default_top_n")]
    pub present_top_n: usize,
    #[serde(default)]
    pub origins: Vec<OriginConfig>,
    #[serde(default)]
    pub api: ApiConfig,
}

impl Default for ShippingConfig {
    fn default() -> Self {
        Self {
            boxes: default_box_catalog(),
            sizing: SizingModel::default(),
            sort_preference: SortPreference::PriceThenDays,
            present_top_n: default_top_n(),
            origins: Vec::new(),
            api: ApiConfig::default(),
        }
    }
}

impl ShippingConfig {
    /// Reject anything the packer or quote service could trip over.
    /// Reports every problem found, not just the first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        self.validate_boxes(&mut problems);
        self.validate_sizing(&mut problems);
        self.validate_origins(&mut problems);

        if self.present_top_n == 0 {
            problems.push("present_top_n must be at least 1".to_string());
        }
        if url::Url::parse(&self.api.base_url).is_err() {
            problems.push(format!("api.base_url is not a URL: {}", self.api.base_url));
        }
        if self.api.api_key_env.trim().is_empty() {
            problems.push("api.api_key_env must name an environment variable".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }

    fn validate_boxes(&self, problems: &mut Vec<String>) {
        if self.boxes.is_empty() {
            problems.push("box catalog is empty".to_string());
        }
        let mut seen = HashSet::new();
        for b in &self.boxes {
            if b.sku.trim().is_empty() {
                problems.push(format!("box '{}' has an empty sku", b.name));
            } else if !seen.insert(b.sku.as_str()) {
                problems.push(format!("duplicate box sku '{}'", b.sku));
            }
            if !b.dimensions.is_positive() {
                problems.push(format!("box '{}' dimensions must be positive", b.sku));
            }
            if !non_negative(b.weight_oz) {
                problems.push(format!("box '{}' weight must be >= 0", b.sku));
            }
            if !non_negative(b.unit_cost) {
                problems.push(format!("box '{}' unit cost must be >= 0", b.sku));
            }
        }
    }

    fn validate_sizing(&self, problems: &mut Vec<String>) {
        let sizing = &self.sizing;
        if !(sizing.fill_ratio.is_finite() && sizing.fill_ratio > 0.0 && sizing.fill_ratio <= 1.0)
        {
            problems.push(format!(
                "fill_ratio must be in (0, 1], got {}",
                sizing.fill_ratio
            ));
        }
        if !positive(sizing.unit_volume) {
            problems.push(format!(
                "unit_volume must be positive, got {}",
                sizing.unit_volume
            ));
        }

        for (category, units) in sizing.equivalents.iter() {
            if *units == 0 {
                problems.push(format!("equivalent units for {category} must be positive"));
            }
        }
        for (category, stats) in sizing.item_weights.iter() {
            if !(positive(stats.min) && positive(stats.max) && positive(stats.avg)) {
                problems.push(format!("{category} weights must be positive"));
            } else if !(stats.min <= stats.avg && stats.avg <= stats.max) {
                problems.push(format!("{category} weights need min <= avg <= max"));
            }
        }
        for (category, guard) in sizing.dimension_guards.iter() {
            if !guard.is_positive() {
                problems.push(format!("{category} dimension guard must be positive"));
            }
        }

        let m = &sizing.materials;
        let materials = [
            ("bubble_wrap_per_item_oz", m.bubble_wrap_per_item_oz),
            ("paper_per_box_oz", m.paper_per_box_oz),
            ("tape_per_box_oz", m.tape_per_box_oz),
            ("air_pillows_per_box_oz", m.air_pillows_per_box_oz),
            ("handling_fee_per_box", m.handling_fee_per_box),
        ];
        for (name, value) in materials {
            if !non_negative(value) {
                problems.push(format!("materials.{name} must be >= 0, got {value}"));
            }
        }
    }

    fn validate_origins(&self, problems: &mut Vec<String>) {
        let mut accounts = HashSet::new();
        for origin in &self.origins {
            if origin.name.trim().is_empty() {
                problems.push("origin with empty name".to_string());
            }
            if origin.address.zip.trim().is_empty() {
                problems.push(format!("origin '{}' has no zip", origin.name));
            }
            for account in &origin.carrier_accounts {
                if !accounts.insert(account.as_str()) {
                    problems.push(format!(
                        "carrier account '{account}' is assigned to more than one origin"
                    ));
                }
            }
        }
    }

    /// Origin a carrier account ships from.
    pub fn origin_for_account(&self, account_id: &str) -> Option<&OriginConfig> {
        self.origins
            .iter()
            .find(|origin| origin.carrier_accounts.iter().any(|a| a == account_id))
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .map(|dirs| dirs.config_dir().join(CONFIG_FILENAME))
}

/// Read, parse and validate a config file.
pub fn load_config(path: &Path) -> Result<ShippingConfig, ConfigError> {
    let data = fs::read_to_string(path)?;
    let config: ShippingConfig = serde_json::from_str(&data)?;
    config.validate()?;
    info!(
        path = %path.display(),
        boxes = config.boxes.len(),
        origins = config.origins.len(),
        "loaded shipping config"
    );
    Ok(config)
}

/// Explicit path if given, else the per-user config file if present, else the
/// built-in defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<ShippingConfig, ConfigError> {
    if let Some(path) = path {
        return load_config(path);
    }
    match default_config_path() {
        Some(path) if path.exists() => load_config(&path),
        _ => {
            debug!("no config file found, using built-in defaults");
            let config = ShippingConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

pub fn save_config(config: &ShippingConfig, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path().ok_or(ConfigError::StorageUnavailable)?,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(&path, json)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CategoryTable, Dimensions, WeightStats};

    fn origin(name: &str, accounts: &[&str]) -> OriginConfig {
        OriginConfig {
            name: name.to_string(),
            address: Address {
                name: name.to_string(),
                street1: "1 Main St".to_string(),
                city: "Springfield".to_string(),
                state: "IL".to_string(),
                zip: "62701".to_string(),
                country: "US".to_string(),
                ..Address::default()
            },
            carrier_accounts: accounts.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn invalid_message(config: &ShippingConfig) -> String {
        match config.validate() {
            Err(ConfigError::Invalid(message)) => message,
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn defaults_are_valid() {
        ShippingConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn round_trips_through_a_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("shipping.json");
        let mut config = ShippingConfig::default();
        config.origins = vec![origin("Warehouse", &["ca_ups"])];

        let written = save_config(&config, Some(&path)).expect("save");
        assert_eq!(written, path);
        assert_eq!(load_config(&path).expect("load"), config);
    }

    #[test]
    fn missing_category_fails_to_parse() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("shipping.json");
        let mut value = serde_json::to_value(ShippingConfig::default()).expect("to json");
        value["sizing"]["item_weights"]
            .as_object_mut()
            .expect("object")
            .remove("xlarge");
        fs::write(&path, value.to_string()).expect("write");

        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn rejects_bad_numbers() {
        let mut config = ShippingConfig::default();
        config.sizing.fill_ratio = 1.5;
        config.sizing.unit_volume = 0.0;
        config.sizing.equivalents = CategoryTable {
            small: 0,
            medium: 3,
            large: 6,
            xlarge: 18,
        };
        config.sizing.item_weights.large = WeightStats::new(10.0, 5.0, 8.0);
        config.sizing.materials.handling_fee_per_box = -1.0;
        config.present_top_n = 0;

        let message = invalid_message(&config);
        for needle in [
            "fill_ratio",
            "unit_volume",
            "equivalent units for small",
            "large weights need min <= avg <= max",
            "handling_fee_per_box",
            "present_top_n",
        ] {
            assert!(message.contains(needle), "missing '{needle}' in {message}");
        }
    }

    #[test]
    fn rejects_bad_catalog() {
        let mut config = ShippingConfig::default();
        config.boxes[1].sku = config.boxes[0].sku.clone();
        config.boxes[2].dimensions = Dimensions::new(0.0, 1.0, 1.0);
        let message = invalid_message(&config);
        assert!(message.contains("duplicate box sku"));
        assert!(message.contains("dimensions must be positive"));

        config.boxes.clear();
        assert!(invalid_message(&config).contains("box catalog is empty"));
    }

    #[test]
    fn account_may_belong_to_one_origin_only() {
        let mut config = ShippingConfig::default();
        config.origins = vec![
            origin("Post office", &["ca_usps"]),
            origin("Warehouse", &["ca_ups", "ca_usps"]),
        ];
        assert!(invalid_message(&config).contains("ca_usps"));

        config.origins[1].carrier_accounts = vec!["ca_ups".to_string()];
        config.validate().expect("valid");
        assert_eq!(
            config.origin_for_account("ca_ups").map(|o| o.name.as_str()),
            Some("Warehouse")
        );
        assert!(config.origin_for_account("ca_dhl").is_none());
    }

    #[test]
    fn missing_optional_sections_use_defaults() {
        let json = serde_json::json!({
            "boxes": serde_json::to_value(default_box_catalog()).expect("boxes"),
            "sizing": serde_json::to_value(SizingModel::default()).expect("sizing"),
            "sort_preference": "days_then_price"
        });
        let config: ShippingConfig = serde_json::from_value(json).expect("parse");
        assert_eq!(config.sort_preference, SortPreference::DaysThenPrice);
        assert_eq!(config.present_top_n, 3);
        assert_eq!(config.api, ApiConfig::default());
        assert!(config.origins.is_empty());
    }
}
