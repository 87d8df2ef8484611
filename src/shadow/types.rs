//! Shadows and observed resource objects.

use crate::schema::{ItemName, ShadowKind};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};

/// Lifecycle of a shadow in the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShadowLifecycleState {
    /// Planned, not yet attempted.
    Proposed,
    /// Creation on the resource is about to be attempted.
    Conceived,
    /// Creation is in progress or pending retry.
    Gestating,
    Live,
    /// Deletion is in progress.
    Reaping,
    /// Deleted on the resource, kept for a while.
    Corpse,
    /// Known to be gone from the resource.
    Tombstone,
}

impl ShadowLifecycleState {
    /// States in which the object is not yet known to exist on the resource.
    pub fn is_pre_creation(self) -> bool {
        matches!(
            self,
            ShadowLifecycleState::Conceived | ShadowLifecycleState::Gestating
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdministrativeStatus {
    Enabled,
    Disabled,
    Archived,
}

impl AdministrativeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AdministrativeStatus::Enabled => "enabled",
            AdministrativeStatus::Disabled => "disabled",
            AdministrativeStatus::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockoutStatus {
    Normal,
    Locked,
}

impl LockoutStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LockoutStatus::Normal => "normal",
            LockoutStatus::Locked => "locked",
        }
    }
}

/// Activation-related properties of an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivationState {
    pub administrative_status: Option<AdministrativeStatus>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub lockout_status: Option<LockoutStatus>,
}

/// Present when the shadow holds a full, trustworthy copy of the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachingMetadata {
    pub retrieval_timestamp: DateTime<Utc>,
}

impl CachingMetadata {
    /// JSON form, as stored in the shadow.
    pub fn to_value(&self) -> Value {
        json!({ "retrievalTimestamp": timestamp_value(&self.retrieval_timestamp) })
    }
}

/// RFC 3339 timestamp in UTC, the form chrono serializes to.
pub fn timestamp_value(timestamp: &DateTime<Utc>) -> Value {
    Value::String(timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Repository copy of one object on a resource.
///
/// Attribute values are stored normalized by the attribute's matching rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowRecord {
    pub oid: String,
    pub resource_oid: String,
    pub object_class: ItemName,
    pub kind: Option<ShadowKind>,
    pub intent: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<ItemName, Vec<Value>>,
    #[serde(default)]
    pub auxiliary_object_classes: BTreeSet<ItemName>,
    #[serde(default)]
    pub exists: bool,
    pub lifecycle_state: ShadowLifecycleState,
    pub production: Option<bool>,
    #[serde(default)]
    pub activation: ActivationState,
    pub caching_metadata: Option<CachingMetadata>,
}

impl ShadowRecord {
    pub fn new(
        oid: impl Into<String>,
        resource_oid: impl Into<String>,
        object_class: ItemName,
    ) -> Self {
        Self {
            oid: oid.into(),
            resource_oid: resource_oid.into(),
            object_class,
            kind: None,
            intent: None,
            name: None,
            attributes: BTreeMap::new(),
            auxiliary_object_classes: BTreeSet::new(),
            exists: true,
            lifecycle_state: ShadowLifecycleState::Live,
            production: None,
            activation: ActivationState::default(),
            caching_metadata: None,
        }
    }

    pub fn with_attribute(mut self, name: ItemName, values: Vec<Value>) -> Self {
        self.attributes.insert(name, values);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_type(mut self, kind: ShadowKind, intent: impl Into<String>) -> Self {
        self.kind = Some(kind);
        self.intent = Some(intent.into());
        self
    }

    pub fn with_lifecycle_state(mut self, state: ShadowLifecycleState) -> Self {
        self.lifecycle_state = state;
        self
    }

    /// Stored values of an attribute, matching unqualified names loosely.
    pub fn attribute_values(&self, name: &ItemName) -> Option<&Vec<Value>> {
        self.attributes.get(name).or_else(|| {
            self.attributes
                .iter()
                .find(|(stored, _)| stored.matches(name))
                .map(|(_, values)| values)
        })
    }
}

/// Values of one attribute as returned by the connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedAttribute {
    pub values: Vec<Value>,
    /// Only part of the values was retrieved.
    #[serde(default)]
    pub incomplete: bool,
}

impl ObservedAttribute {
    pub fn complete(values: Vec<Value>) -> Self {
        Self {
            values,
            incomplete: false,
        }
    }

    pub fn incomplete(values: Vec<Value>) -> Self {
        Self {
            values,
            incomplete: true,
        }
    }
}

/// Object as just observed on the resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceObject {
    pub object_class: ItemName,
    #[serde(default)]
    pub attributes: BTreeMap<ItemName, ObservedAttribute>,
    #[serde(default)]
    pub auxiliary_object_classes: BTreeSet<ItemName>,
    #[serde(default)]
    pub activation: ActivationState,
    /// Production/development classification of the object, when known.
    pub production: Option<bool>,
}

impl ResourceObject {
    pub fn new(object_class: ItemName) -> Self {
        Self {
            object_class,
            attributes: BTreeMap::new(),
            auxiliary_object_classes: BTreeSet::new(),
            activation: ActivationState::default(),
            production: None,
        }
    }

    pub fn with_attribute(mut self, name: ItemName, values: Vec<Value>) -> Self {
        self.attributes.insert(name, ObservedAttribute::complete(values));
        self
    }

    pub fn with_incomplete_attribute(mut self, name: ItemName, values: Vec<Value>) -> Self {
        self.attributes
            .insert(name, ObservedAttribute::incomplete(values));
        self
    }

    pub fn with_auxiliary_object_class(mut self, name: ItemName) -> Self {
        self.auxiliary_object_classes.insert(name);
        self
    }

    /// Plain attribute map, used for name derivation.
    pub fn attribute_values(&self) -> BTreeMap<ItemName, Vec<Value>> {
        self.attributes
            .iter()
            .map(|(name, attribute)| (name.clone(), attribute.values.clone()))
            .collect()
    }
}
