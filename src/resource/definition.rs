//! Resource definitions as stored in the repository and as completed.
//!
//! A single [`ResourceDefinition`] type covers both forms. A raw definition
//! comes from the repository with [`CompletionStatus::NotCompleted`]; completion
//! fills in the effective capabilities, the resource schema and the ancestor
//! versions consulted, and flips the status.

use super::capabilities::CapabilitySet;
use crate::connector::{ConnectorReference, NativeSchema};
use crate::schema::{ObjectTypeConfig, ResourceSchema, merge_object_types};
use crate::version::ObjectVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// How far completion got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionStatus {
    #[default]
    NotCompleted,
    Completed,
    CompletedWithErrors,
}

/// Policy governing whether attribute values are kept in shadows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CachingStrategy {
    /// Only identifiers are stored; everything else is read live.
    #[default]
    None,
    /// Values observed during normal operation are stored.
    Passive,
    /// A strategy this core does not implement.
    Other(String),
}

impl CachingStrategy {
    pub fn as_str(&self) -> &str {
        match self {
            CachingStrategy::None => "none",
            CachingStrategy::Passive => "passive",
            CachingStrategy::Other(name) => name,
        }
    }
}

impl From<String> for CachingStrategy {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "none" => CachingStrategy::None,
            "passive" => CachingStrategy::Passive,
            _ => CachingStrategy::Other(value),
        }
    }
}

impl From<&str> for CachingStrategy {
    fn from(value: &str) -> Self {
        CachingStrategy::from(value.to_string())
    }
}

impl From<CachingStrategy> for String {
    fn from(strategy: CachingStrategy) -> Self {
        strategy.as_str().to_string()
    }
}

impl fmt::Display for CachingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caching configuration at resource or object-type level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CachingPolicy {
    pub caching_strategy: Option<CachingStrategy>,
}

impl CachingPolicy {
    pub fn new(strategy: CachingStrategy) -> Self {
        Self {
            caching_strategy: Some(strategy),
        }
    }
}

/// Availability of the resource as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityStatus {
    Up,
    Down,
    Broken,
}

impl fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AvailabilityStatus::Up => "UP",
            AvailabilityStatus::Down => "DOWN",
            AvailabilityStatus::Broken => "BROKEN",
        };
        f.write_str(name)
    }
}

/// One recorded availability transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationalStateChange {
    pub status: AvailabilityStatus,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
    pub task_id: Option<String>,
}

/// Availability history of a resource, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperationalState {
    pub last_availability_status: Option<AvailabilityStatus>,
    pub history: Vec<OperationalStateChange>,
}

impl OperationalState {
    /// Record a transition, keeping at most `history_limit` entries.
    pub fn record(&mut self, change: OperationalStateChange, history_limit: usize) {
        self.last_availability_status = Some(change.status);
        self.history.push(change);
        if self.history.len() > history_limit {
            let excess = self.history.len() - history_limit;
            self.history.drain(..excess);
        }
    }
}

/// Administrator-supplied configuration of a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceConfiguration {
    pub connector_ref: Option<ConnectorReference>,
    pub connector_configuration: Map<String, Value>,
    /// Capability overrides, `name -> bool | {"enabled": bool, ...}`.
    pub capabilities: BTreeMap<String, Value>,
    pub schema_handling: Vec<ObjectTypeConfig>,
    pub caching: Option<CachingPolicy>,
    /// Parent (template) resource this one inherits from.
    pub super_ref: Option<String>,
    pub is_template: bool,
    /// Connector schema stored by an earlier completion.
    pub native_schema: Option<NativeSchema>,
    /// Connector capabilities stored by an earlier completion.
    pub native_capabilities: Option<CapabilitySet>,
}

impl ResourceConfiguration {
    pub fn new(connector_ref: ConnectorReference) -> Self {
        Self {
            connector_ref: Some(connector_ref),
            ..Default::default()
        }
    }

    /// Overlay this (child) configuration on top of `parent`.
    ///
    /// Scalars set on the child win, connector configuration is deep-merged,
    /// capability overrides merge per name, and object types merge per kind and intent.
    /// The result keeps the child's `super_ref` and `is_template`.
    pub fn merged_over(&self, parent: &ResourceConfiguration) -> ResourceConfiguration {
        let mut connector_configuration = parent.connector_configuration.clone();
        deep_merge(&mut connector_configuration, &self.connector_configuration);

        let mut capabilities = parent.capabilities.clone();
        capabilities.extend(self.capabilities.clone());

        ResourceConfiguration {
            connector_ref: self
                .connector_ref
                .clone()
                .or_else(|| parent.connector_ref.clone()),
            connector_configuration,
            capabilities,
            schema_handling: merge_object_types(&parent.schema_handling, &self.schema_handling),
            caching: self.caching.clone().or_else(|| parent.caching.clone()),
            super_ref: self.super_ref.clone(),
            is_template: self.is_template,
            native_schema: self
                .native_schema
                .clone()
                .or_else(|| parent.native_schema.clone()),
            native_capabilities: self
                .native_capabilities
                .clone()
                .or_else(|| parent.native_capabilities.clone()),
        }
    }

    pub fn caching_strategy(&self) -> Option<&CachingStrategy> {
        self.caching.as_ref().and_then(|c| c.caching_strategy.as_ref())
    }
}

fn deep_merge(target: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// A resource: an external system reached through a connector.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDefinition {
    pub oid: String,
    pub name: String,
    /// Repository version this definition was read at.
    pub version: ObjectVersion,
    pub configuration: ResourceConfiguration,
    pub completion_status: CompletionStatus,
    /// Effective capabilities (native merged with overrides). Empty until completed.
    pub capabilities: CapabilitySet,
    /// Versions of every ancestor consulted during completion.
    pub ancestor_versions: BTreeMap<String, ObjectVersion>,
    pub schema: Option<Arc<ResourceSchema>>,
    pub operational_state: OperationalState,
}

impl ResourceDefinition {
    /// A raw, not yet completed definition.
    pub fn new(
        oid: impl Into<String>,
        name: impl Into<String>,
        configuration: ResourceConfiguration,
    ) -> Self {
        Self {
            oid: oid.into(),
            name: name.into(),
            version: ObjectVersion::initial(),
            configuration,
            completion_status: CompletionStatus::NotCompleted,
            capabilities: CapabilitySet::new(),
            ancestor_versions: BTreeMap::new(),
            schema: None,
            operational_state: OperationalState::default(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completion_status == CompletionStatus::Completed
    }

    pub fn availability_status(&self) -> Option<AvailabilityStatus> {
        self.operational_state.last_availability_status
    }

    pub fn is_template(&self) -> bool {
        self.configuration.is_template
    }
}

/// Change applied to a stored resource by the repository write path.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceModification {
    RecordAvailability {
        change: OperationalStateChange,
        history_limit: usize,
    },
    ReplaceConfiguration(ResourceConfiguration),
    Rename(String),
}

impl ResourceModification {
    pub fn apply(&self, definition: &mut ResourceDefinition) {
        match self {
            ResourceModification::RecordAvailability {
                change,
                history_limit,
            } => definition
                .operational_state
                .record(change.clone(), *history_limit),
            ResourceModification::ReplaceConfiguration(configuration) => {
                definition.configuration = configuration.clone();
            }
            ResourceModification::Rename(name) => definition.name = name.clone(),
        }
    }
}
