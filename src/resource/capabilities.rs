//! Resource capabilities.
//!
//! The connector reports what it can natively do with a resource; the resource
//! configuration may switch capabilities off, switch emulated ones on, or tune
//! their options. Overrides are written as `name -> bool` or
//! `name -> {"enabled": bool, ...options}`.
//!
//! ```rust
//! use resource_provisioning::resource::capabilities::{CapabilitySet, CapabilityType};
//! use serde_json::json;
//! use std::collections::BTreeMap;
//!
//! let native = CapabilitySet::new()
//!     .with_enabled(CapabilityType::Read)
//!     .with_enabled(CapabilityType::LiveSync);
//! let mut overrides = BTreeMap::new();
//! overrides.insert("liveSync".to_string(), json!(false));
//!
//! let effective = native.with_overrides(&overrides).unwrap();
//! assert!(effective.is_enabled(CapabilityType::Read));
//! assert!(!effective.is_enabled(CapabilityType::LiveSync));
//! ```

use crate::error::{ProvisioningError, ProvisioningResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Capability kinds understood by the provisioning core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CapabilityType {
    Read,
    Create,
    Update,
    Delete,
    LiveSync,
    Activation,
    Credentials,
    TestConnection,
    Script,
    PagedSearch,
    CountObjects,
    DiscoverConfiguration,
    AuxiliaryObjectClasses,
}

impl CapabilityType {
    pub const ALL: [CapabilityType; 13] = [
        CapabilityType::Read,
        CapabilityType::Create,
        CapabilityType::Update,
        CapabilityType::Delete,
        CapabilityType::LiveSync,
        CapabilityType::Activation,
        CapabilityType::Credentials,
        CapabilityType::TestConnection,
        CapabilityType::Script,
        CapabilityType::PagedSearch,
        CapabilityType::CountObjects,
        CapabilityType::DiscoverConfiguration,
        CapabilityType::AuxiliaryObjectClasses,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CapabilityType::Read => "read",
            CapabilityType::Create => "create",
            CapabilityType::Update => "update",
            CapabilityType::Delete => "delete",
            CapabilityType::LiveSync => "liveSync",
            CapabilityType::Activation => "activation",
            CapabilityType::Credentials => "credentials",
            CapabilityType::TestConnection => "testConnection",
            CapabilityType::Script => "script",
            CapabilityType::PagedSearch => "pagedSearch",
            CapabilityType::CountObjects => "countObjects",
            CapabilityType::DiscoverConfiguration => "discoverConfiguration",
            CapabilityType::AuxiliaryObjectClasses => "auxiliaryObjectClasses",
        }
    }
}

impl fmt::Display for CapabilityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityType {
    type Err = ProvisioningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CapabilityType::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ProvisioningError::misconfiguration(format!("Unknown capability '{}'", s)))
    }
}

/// One capability with its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityConfig {
    pub enabled: bool,
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl CapabilityConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            options: Map::new(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            options: Map::new(),
        }
    }

    pub fn with_option(mut self, name: impl Into<String>, value: Value) -> Self {
        self.options.insert(name.into(), value);
        self
    }
}

/// Set of capabilities keyed by type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeMap<CapabilityType, CapabilityConfig>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: CapabilityType, config: CapabilityConfig) -> Self {
        self.0.insert(capability, config);
        self
    }

    pub fn with_enabled(self, capability: CapabilityType) -> Self {
        self.with(capability, CapabilityConfig::enabled())
    }

    pub fn insert(&mut self, capability: CapabilityType, config: CapabilityConfig) {
        self.0.insert(capability, config);
    }

    /// The capability, if present and enabled.
    pub fn get(&self, capability: CapabilityType) -> Option<&CapabilityConfig> {
        self.0.get(&capability).filter(|c| c.enabled)
    }

    /// The capability regardless of its enabled flag.
    pub fn get_declared(&self, capability: CapabilityType) -> Option<&CapabilityConfig> {
        self.0.get(&capability)
    }

    pub fn is_enabled(&self, capability: CapabilityType) -> bool {
        self.get(capability).is_some()
    }

    pub fn enabled_types(&self) -> Vec<CapabilityType> {
        self.0
            .iter()
            .filter(|(_, c)| c.enabled)
            .map(|(t, _)| *t)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Apply configured overrides on top of this set.
    ///
    /// An override replaces the enabled flag and merges its options over the
    /// base options. Unknown capability names and malformed values are
    /// configuration errors.
    pub fn with_overrides(&self, overrides: &BTreeMap<String, Value>) -> ProvisioningResult<Self> {
        let mut merged = self.clone();
        for (name, value) in overrides {
            let capability: CapabilityType = name.parse()?;
            let (enabled, options) = parse_override(name, value)?;
            let entry = merged
                .0
                .entry(capability)
                .or_insert_with(CapabilityConfig::disabled);
            entry.enabled = enabled;
            entry.options.extend(options);
        }
        Ok(merged)
    }
}

fn parse_override(name: &str, value: &Value) -> ProvisioningResult<(bool, Map<String, Value>)> {
    match value {
        Value::Bool(enabled) => Ok((*enabled, Map::new())),
        Value::Object(map) => {
            let enabled = match map.get("enabled") {
                None => true,
                Some(Value::Bool(b)) => *b,
                Some(other) => {
                    return Err(ProvisioningError::misconfiguration(format!(
                        "Capability '{}' has non-boolean 'enabled': {}",
                        name, other
                    )));
                }
            };
            let options = map
                .iter()
                .filter(|(k, _)| k.as_str() != "enabled")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Ok((enabled, options))
        }
        other => Err(ProvisioningError::misconfiguration(format!(
            "Capability '{}' override must be a boolean or an object, got {}",
            name, other
        ))),
    }
}
