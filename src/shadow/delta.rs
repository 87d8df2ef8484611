//! Shadow modification model.

use super::types::{
    ActivationState, AdministrativeStatus, CachingMetadata, LockoutStatus, ShadowRecord,
    timestamp_value,
};
use crate::schema::ItemName;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivationProperty {
    AdministrativeStatus,
    ValidFrom,
    ValidTo,
    LockoutStatus,
}

impl ActivationProperty {
    pub const ALL: [ActivationProperty; 4] = [
        ActivationProperty::AdministrativeStatus,
        ActivationProperty::ValidFrom,
        ActivationProperty::ValidTo,
        ActivationProperty::LockoutStatus,
    ];

    /// The property's value as a (possibly empty) value list.
    pub fn values_of(self, activation: &ActivationState) -> Vec<Value> {
        let value = match self {
            ActivationProperty::AdministrativeStatus => activation
                .administrative_status
                .map(|s| Value::String(s.as_str().to_string())),
            ActivationProperty::ValidFrom => activation.valid_from.as_ref().map(timestamp_value),
            ActivationProperty::ValidTo => activation.valid_to.as_ref().map(timestamp_value),
            ActivationProperty::LockoutStatus => activation
                .lockout_status
                .map(|s| Value::String(s.as_str().to_string())),
        };
        value.into_iter().collect()
    }
}

/// Path of a shadow item touched by a delta.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemPath {
    Attribute(ItemName),
    Name,
    AuxiliaryObjectClass,
    Exists,
    Production,
    Activation(ActivationProperty),
    CachingMetadata,
}

impl fmt::Display for ItemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemPath::Attribute(name) => write!(f, "attributes/{}", name),
            ItemPath::Name => f.write_str("name"),
            ItemPath::AuxiliaryObjectClass => f.write_str("auxiliaryObjectClass"),
            ItemPath::Exists => f.write_str("exists"),
            ItemPath::Production => f.write_str("production"),
            ItemPath::Activation(property) => write!(f, "activation/{:?}", property),
            ItemPath::CachingMetadata => f.write_str("cachingMetadata"),
        }
    }
}

/// Modification of one item: either a replace, or incremental add/delete.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDelta {
    pub path: ItemPath,
    pub values_to_add: Vec<Value>,
    pub values_to_delete: Vec<Value>,
    /// `Some(vec![])` clears the item.
    pub values_to_replace: Option<Vec<Value>>,
}

impl ItemDelta {
    fn empty(path: ItemPath) -> Self {
        Self {
            path,
            values_to_add: Vec::new(),
            values_to_delete: Vec::new(),
            values_to_replace: None,
        }
    }

    pub fn add(path: ItemPath, values: Vec<Value>) -> Self {
        Self {
            values_to_add: values,
            ..Self::empty(path)
        }
    }

    pub fn delete(path: ItemPath, values: Vec<Value>) -> Self {
        Self {
            values_to_delete: values,
            ..Self::empty(path)
        }
    }

    pub fn replace(path: ItemPath, values: Vec<Value>) -> Self {
        Self {
            values_to_replace: Some(values),
            ..Self::empty(path)
        }
    }

    pub fn add_and_delete(path: ItemPath, add: Vec<Value>, delete: Vec<Value>) -> Self {
        Self {
            values_to_add: add,
            values_to_delete: delete,
            ..Self::empty(path)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values_to_add.is_empty()
            && self.values_to_delete.is_empty()
            && self.values_to_replace.is_none()
    }

    pub fn is_replace(&self) -> bool {
        self.values_to_replace.is_some()
    }

    /// Same modification aimed at another path.
    pub fn with_path(mut self, path: ItemPath) -> Self {
        self.path = path;
        self
    }

    /// Apply to a value list.
    fn apply_values(&self, current: &[Value]) -> Vec<Value> {
        if let Some(replacement) = &self.values_to_replace {
            return replacement.clone();
        }
        let mut values: Vec<Value> = current
            .iter()
            .filter(|v| !self.values_to_delete.contains(v))
            .cloned()
            .collect();
        for value in &self.values_to_add {
            if !values.contains(value) {
                values.push(value.clone());
            }
        }
        values
    }
}

/// Changes reported by the connector for one object (e.g. by live sync).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceObjectDelta {
    pub modifications: Vec<ItemDelta>,
}

impl ResourceObjectDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_modification(mut self, modification: ItemDelta) -> Self {
        self.modifications.push(modification);
        self
    }

    pub fn find_attribute(&self, name: &ItemName) -> Option<&ItemDelta> {
        self.modifications.iter().find(|m| match &m.path {
            ItemPath::Attribute(attribute) => attribute.matches(name),
            _ => false,
        })
    }
}

/// Delta bringing a stored shadow in line with the resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShadowDelta {
    pub modifications: Vec<ItemDelta>,
}

impl ShadowDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, modification: ItemDelta) {
        if !modification.is_empty() {
            self.modifications.push(modification);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modifications.len()
    }

    pub fn find(&self, path: &ItemPath) -> Option<&ItemDelta> {
        self.modifications.iter().find(|m| &m.path == path)
    }

    pub fn find_attribute(&self, name: &ItemName) -> Option<&ItemDelta> {
        self.find(&ItemPath::Attribute(name.clone()))
    }

    pub fn attribute_modifications(&self) -> impl Iterator<Item = &ItemDelta> {
        self.modifications
            .iter()
            .filter(|m| matches!(m.path, ItemPath::Attribute(_)))
    }

    /// Shadow with this delta applied. The input is left untouched.
    pub fn applied_to(&self, shadow: &ShadowRecord) -> ShadowRecord {
        let mut result = shadow.clone();
        for modification in &self.modifications {
            match &modification.path {
                ItemPath::Attribute(name) => {
                    let current = result.attributes.remove(name).unwrap_or_default();
                    let updated = modification.apply_values(&current);
                    if !updated.is_empty() {
                        result.attributes.insert(name.clone(), updated);
                    }
                }
                ItemPath::Name => {
                    result.name = first(modification, result.name.iter().map(|n| Value::String(n.clone())))
                        .and_then(|v| v.as_str().map(str::to_string));
                }
                ItemPath::AuxiliaryObjectClass => {
                    let current: Vec<Value> = result
                        .auxiliary_object_classes
                        .iter()
                        .map(|n| Value::String(n.to_string()))
                        .collect();
                    result.auxiliary_object_classes = modification
                        .apply_values(&current)
                        .iter()
                        .filter_map(|v| v.as_str().and_then(|s| s.parse().ok()))
                        .collect();
                }
                ItemPath::Exists => {
                    if let Some(exists) = first(modification, [Value::Bool(result.exists)])
                        .and_then(|v| v.as_bool())
                    {
                        result.exists = exists;
                    }
                }
                ItemPath::Production => {
                    result.production = first(modification, result.production.map(Value::Bool))
                        .and_then(|v| v.as_bool());
                }
                ItemPath::Activation(property) => {
                    let current = property.values_of(&result.activation);
                    let value = first(modification, current);
                    set_activation(&mut result.activation, *property, value);
                }
                ItemPath::CachingMetadata => {
                    result.caching_metadata =
                        first(modification, result.caching_metadata.map(|m| m.to_value()))
                            .and_then(|v| serde_json::from_value::<CachingMetadata>(v).ok());
                }
            }
        }
        result
    }
}

fn first(modification: &ItemDelta, current: impl IntoIterator<Item = Value>) -> Option<Value> {
    let current: Vec<Value> = current.into_iter().collect();
    modification.apply_values(&current).into_iter().next()
}

fn set_activation(activation: &mut ActivationState, property: ActivationProperty, value: Option<Value>) {
    match property {
        ActivationProperty::AdministrativeStatus => {
            activation.administrative_status =
                value.and_then(|v| serde_json::from_value::<AdministrativeStatus>(v).ok());
        }
        ActivationProperty::ValidFrom => {
            activation.valid_from = value.and_then(|v| serde_json::from_value::<DateTime<Utc>>(v).ok());
        }
        ActivationProperty::ValidTo => {
            activation.valid_to = value.and_then(|v| serde_json::from_value::<DateTime<Utc>>(v).ok());
        }
        ActivationProperty::LockoutStatus => {
            activation.lockout_status =
                value.and_then(|v| serde_json::from_value::<LockoutStatus>(v).ok());
        }
    }
}
