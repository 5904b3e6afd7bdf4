//! Run configuration from a properties file.
//!
//! `key = value` lines, `#` comments, unknown keys rejected. CLI flags
//! override whatever the file sets. Recognized keys:
//!
//! - `domain` — URI domain every base is derived from
//! - `type_prefix`, `property_prefix` — namespace prefixes in description files
//! - `store` — store directory path
//! - `stages` — `inference`, `schema`, `data` or `full`
//! - `similarity` — `exact` or `jaro_winkler`
//! - `similarity_threshold` — match threshold for the graded metric

use std::path::{Path, PathBuf};
use thiserror::Error;
use xylograph_gen::{MatcherKind, StageSelection};
use xylograph_mapping::{ConfigError, UriConfig};

const DEFAULT_DOMAIN: &str = "http://xylograph.local/kg";
const DEFAULT_STORE: &str = "xylograph-store";
const DEFAULT_THRESHOLD: f64 = 0.92;

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: expected `key = value`, got {text:?}")]
    Malformed { line: usize, text: String },
    #[error("unknown configuration key {0:?}")]
    UnknownKey(String),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

/// Effective run configuration, defaults overlaid by a properties file.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub domain: String,
    pub store: PathBuf,
    pub stages: StageSelection,
    pub matcher: MatcherKind,
    pub type_prefix: Option<String>,
    pub property_prefix: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            domain: DEFAULT_DOMAIN.to_string(),
            store: PathBuf::from(DEFAULT_STORE),
            stages: StageSelection::Full,
            matcher: MatcherKind::Exact,
            type_prefix: None,
            property_prefix: None,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigFileError> {
        let mut config = Self::default();
        let mut graded = false;
        let mut threshold = DEFAULT_THRESHOLD;

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigFileError::Malformed {
                    line: index + 1,
                    text: line.to_string(),
                });
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "domain" => config.domain = value.to_string(),
                "store" => config.store = PathBuf::from(value),
                "type_prefix" => config.type_prefix = Some(value.to_string()),
                "property_prefix" => config.property_prefix = Some(value.to_string()),
                "stages" => {
                    config.stages = parse_stages(value).ok_or_else(|| invalid(key, value))?
                }
                "similarity" => match value {
                    "exact" => graded = false,
                    "jaro_winkler" => graded = true,
                    _ => return Err(invalid(key, value)),
                },
                "similarity_threshold" => {
                    threshold = value.parse().map_err(|_| invalid(key, value))?;
                    if !(0.0..=1.0).contains(&threshold) {
                        return Err(invalid(key, value));
                    }
                }
                _ => return Err(ConfigFileError::UnknownKey(key.to_string())),
            }
        }

        config.matcher = if graded {
            MatcherKind::JaroWinkler { threshold }
        } else {
            MatcherKind::Exact
        };
        Ok(config)
    }

    /// Derive the URI configuration, honoring a command-line domain override
    /// and any configured prefixes. Fails before any stage runs.
    pub fn uri_config(&self, domain_override: Option<&str>) -> Result<UriConfig, ConfigError> {
        let domain = domain_override.unwrap_or(&self.domain);
        let mut cfg = UriConfig::from_domain(domain)?;
        if let Some(prefix) = &self.type_prefix {
            cfg.type_prefix = prefix.clone();
        }
        if let Some(prefix) = &self.property_prefix {
            cfg.property_prefix = prefix.clone();
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_stages(value: &str) -> Option<StageSelection> {
    match value {
        "inference" => Some(StageSelection::InferenceOnly),
        "schema" => Some(StageSelection::SchemaOnly),
        "data" => Some(StageSelection::DataOnly),
        "full" => Some(StageSelection::Full),
        _ => None,
    }
}

fn invalid(key: &str, value: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
