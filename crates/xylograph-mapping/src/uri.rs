//! URI derivation and validation.
//!
//! One configured domain value derives every base the emitter needs: a
//! resource base for instances, a type base + prefix for entity types, and a
//! property base + prefix for properties. Bases must not end in a path
//! separator; that is a fatal configuration error surfaced before any stage
//! runs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} must not end in a path separator: {value:?}")]
    TrailingSeparator { field: &'static str, value: String },
}

/// Derived URI bases and prefixes for one generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UriConfig {
    /// Base for instance resources, e.g. `http://example.org/kg/resource`.
    pub resource_base: String,
    /// Base for entity-type resources.
    pub type_base: String,
    /// Namespace-style prefix carried by type identifiers in description
    /// files (`class:item`); stripped before use.
    pub type_prefix: String,
    /// Base for property resources.
    pub property_base: String,
    pub property_prefix: String,
}

impl UriConfig {
    /// Derive every base from one domain value such as
    /// `http://example.org/kg`.
    pub fn from_domain(domain: &str) -> Result<Self, ConfigError> {
        if domain.trim().is_empty() {
            return Err(ConfigError::Empty { field: "domain" });
        }
        if domain.ends_with('/') {
            return Err(ConfigError::TrailingSeparator {
                field: "domain",
                value: domain.to_string(),
            });
        }
        let cfg = Self {
            resource_base: format!("{domain}/resource"),
            type_base: format!("{domain}/schema/type"),
            type_prefix: "class".to_string(),
            property_base: format!("{domain}/schema/prop"),
            property_prefix: "prop".to_string(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check the separator constraint on every base. Runs at startup; any
    /// violation aborts before the first stage.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("resource_base", &self.resource_base),
            ("type_base", &self.type_base),
            ("property_base", &self.property_base),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Empty { field });
            }
            if value.ends_with('/') {
                return Err(ConfigError::TrailingSeparator {
                    field,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn type_uri(&self, local: &str) -> String {
        format!("{}/{}", self.type_base, local)
    }

    pub fn property_uri(&self, local: &str) -> String {
        format!("{}/{}", self.property_base, local)
    }

    pub fn resource_uri(&self, type_name: &str, id: &str) -> String {
        format!("{}/{}/{}", self.resource_base, type_name, id)
    }

    /// Render a local type name with the configured prefix, as written in
    /// description files (`class:item`).
    pub fn prefixed_type_id(&self, local: &str) -> String {
        format!("{}:{}", self.type_prefix, local)
    }

    /// Strip the configured type prefix from a description identifier, if
    /// present.
    pub fn strip_type_prefix<'a>(&self, id: &'a str) -> &'a str {
        id.strip_prefix(&self.type_prefix)
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_bases_from_domain() {
        let cfg = UriConfig::from_domain("http://example.org/kg").unwrap();
        assert_eq!(cfg.type_uri("item"), "http://example.org/kg/schema/type/item");
        assert_eq!(cfg.property_uri("title"), "http://example.org/kg/schema/prop/title");
        assert_eq!(
            cfg.resource_uri("item", "dune"),
            "http://example.org/kg/resource/item/dune"
        );
    }

    #[test]
    fn rejects_trailing_separator() {
        let err = UriConfig::from_domain("http://example.org/kg/").unwrap_err();
        assert!(matches!(err, ConfigError::TrailingSeparator { field: "domain", .. }));

        let mut cfg = UriConfig::from_domain("http://example.org/kg").unwrap();
        cfg.type_base.push('/');
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ConfigError::TrailingSeparator { field: "type_base", .. }));
    }

    #[test]
    fn rejects_empty_domain() {
        assert_eq!(
            UriConfig::from_domain("  "),
            Err(ConfigError::Empty { field: "domain" })
        );
    }

    #[test]
    fn strips_type_prefix() {
        let cfg = UriConfig::from_domain("http://example.org/kg").unwrap();
        assert_eq!(cfg.strip_type_prefix("class:item"), "item");
        assert_eq!(cfg.strip_type_prefix("item"), "item");
        // Only the configured prefix is stripped.
        assert_eq!(cfg.strip_type_prefix("other:item"), "other:item");
        assert_eq!(cfg.prefixed_type_id("item"), "class:item");
    }
}
