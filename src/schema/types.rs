//! Core type definitions for resource object schemas.
//!
//! Attribute definitions come from the connector (the RAW layer) and may be
//! refined per layer by administrator-declared overrides. [`AttributeDefinition::for_layer`]
//! resolves a plain [`AttributeView`] for one layer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Prefix of attributes defined by the resource itself.
pub const PREFIX_RESOURCE_INSTANCE: &str = "ri";
/// Prefix of attributes defined by the connector framework (uid, name, ...).
pub const PREFIX_CONNECTOR_FRAMEWORK: &str = "icfs";

/// Namespaced attribute or object-class name, written `prefix:local`.
///
/// Unqualified names (no prefix) match qualified names with the same local part,
/// see [`ItemName::matches`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemName {
    prefix: Option<String>,
    local: String,
}

impl ItemName {
    pub fn new(prefix: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            local: local.into(),
        }
    }

    /// Name without a namespace prefix.
    pub fn unqualified(local: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local: local.into(),
        }
    }

    /// Name in the resource-instance namespace.
    pub fn ri(local: impl Into<String>) -> Self {
        Self::new(PREFIX_RESOURCE_INSTANCE, local)
    }

    /// Name in the connector-framework namespace.
    pub fn icfs(local: impl Into<String>) -> Self {
        Self::new(PREFIX_CONNECTOR_FRAMEWORK, local)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn local_part(&self) -> &str {
        &self.local
    }

    /// Loose comparison: local parts equal and prefixes equal unless one side is unqualified.
    pub fn matches(&self, other: &ItemName) -> bool {
        if self.local != other.local {
            return false;
        }
        match (&self.prefix, &other.prefix) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl fmt::Display for ItemName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{}:{}", prefix, self.local),
            None => write!(f, "{}", self.local),
        }
    }
}

impl FromStr for ItemName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("item name cannot be empty".to_string());
        }
        match s.split_once(':') {
            Some((prefix, local)) if !prefix.is_empty() && !local.is_empty() => {
                Ok(Self::new(prefix, local))
            }
            Some(_) => Err(format!("malformed item name '{}'", s)),
            None => Ok(Self::unqualified(s)),
        }
    }
}

impl TryFrom<String> for ItemName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ItemName> for String {
    fn from(name: ItemName) -> Self {
        name.to_string()
    }
}

/// Value types reported by connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ValueType {
    #[default]
    String,
    PolyString,
    Int,
    Long,
    Boolean,
    DateTime,
    Binary,
}

impl ValueType {
    /// Whether values of this type are textual.
    pub fn is_textual(self) -> bool {
        matches!(self, ValueType::String | ValueType::PolyString)
    }
}

/// Coarse category of a resource object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShadowKind {
    Account,
    Entitlement,
    Generic,
    Unknown,
}

impl fmt::Display for ShadowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShadowKind::Account => "account",
            ShadowKind::Entitlement => "entitlement",
            ShadowKind::Generic => "generic",
            ShadowKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Kind plus intent: the key of an object type definition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeIdentification {
    pub kind: ShadowKind,
    pub intent: String,
}

impl TypeIdentification {
    pub fn new(kind: ShadowKind, intent: impl Into<String>) -> Self {
        Self {
            kind,
            intent: intent.into(),
        }
    }
}

impl fmt::Display for TypeIdentification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.intent)
    }
}

/// Layers at which a definition can be viewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LayerType {
    /// As reported by the connector.
    Raw,
    /// As used by the provisioning/model logic.
    Model,
    /// As shown to people.
    Presentation,
}

/// Fully resolved per-layer properties of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerProperties {
    pub ignored: bool,
    pub can_create: bool,
    pub can_read: bool,
    pub can_update: bool,
    pub display_name: Option<String>,
    pub display_order: Option<i32>,
    pub has_outbound_mapping: bool,
}

impl Default for LayerProperties {
    fn default() -> Self {
        Self {
            ignored: false,
            can_create: true,
            can_read: true,
            can_update: true,
            display_name: None,
            display_order: None,
            has_outbound_mapping: false,
        }
    }
}

impl LayerProperties {
    fn apply(&self, o: &LayerOverride) -> Self {
        Self {
            ignored: o.ignored.unwrap_or(self.ignored),
            can_create: o.can_create.unwrap_or(self.can_create),
            can_read: o.can_read.unwrap_or(self.can_read),
            can_update: o.can_update.unwrap_or(self.can_update),
            display_name: o.display_name.clone().or_else(|| self.display_name.clone()),
            display_order: o.display_order.or(self.display_order),
            has_outbound_mapping: o.has_outbound_mapping.unwrap_or(self.has_outbound_mapping),
        }
    }
}

/// Administrator override of some layer properties. Unset fields inherit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayerOverride {
    pub ignored: Option<bool>,
    pub can_create: Option<bool>,
    pub can_read: Option<bool>,
    pub can_update: Option<bool>,
    pub display_name: Option<String>,
    pub display_order: Option<i32>,
    pub has_outbound_mapping: Option<bool>,
}

impl LayerOverride {
    /// Overlay `other` on top of `self`: fields set in `other` win.
    pub fn merged_with(&self, other: &LayerOverride) -> LayerOverride {
        LayerOverride {
            ignored: other.ignored.or(self.ignored),
            can_create: other.can_create.or(self.can_create),
            can_read: other.can_read.or(self.can_read),
            can_update: other.can_update.or(self.can_update),
            display_name: other.display_name.clone().or_else(|| self.display_name.clone()),
            display_order: other.display_order.or(self.display_order),
            has_outbound_mapping: other.has_outbound_mapping.or(self.has_outbound_mapping),
        }
    }
}

/// Definition of one resource object attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDefinition {
    pub name: ItemName,
    pub value_type: ValueType,
    pub min_occurs: u32,
    /// `None` means unbounded.
    pub max_occurs: Option<u32>,
    pub matching_rule: Option<String>,
    /// Stored only in the repository index, never as a full value.
    pub index_only: bool,
    /// Explicit opt-in/opt-out of shadow caching.
    pub cached: Option<bool>,
    /// Connector-reported (RAW) properties.
    pub native: LayerProperties,
    #[serde(default)]
    pub overrides: BTreeMap<LayerType, LayerOverride>,
}

impl AttributeDefinition {
    /// Optional single-valued string attribute with default properties.
    pub fn new(name: ItemName) -> Self {
        Self {
            name,
            value_type: ValueType::String,
            min_occurs: 0,
            max_occurs: Some(1),
            matching_rule: None,
            index_only: false,
            cached: None,
            native: LayerProperties::default(),
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn multi_valued(mut self) -> Self {
        self.max_occurs = None;
        self
    }

    pub fn required(mut self) -> Self {
        self.min_occurs = 1;
        self
    }

    pub fn with_matching_rule(mut self, rule: impl Into<String>) -> Self {
        self.matching_rule = Some(rule.into());
        self
    }

    pub fn index_only(mut self) -> Self {
        self.index_only = true;
        self
    }

    pub fn with_native(mut self, native: LayerProperties) -> Self {
        self.native = native;
        self
    }

    pub fn with_override(mut self, layer: LayerType, layer_override: LayerOverride) -> Self {
        self.overrides.insert(layer, layer_override);
        self
    }

    pub fn is_single_valued(&self) -> bool {
        self.max_occurs == Some(1)
    }

    pub fn is_multi_valued(&self) -> bool {
        !self.is_single_valued()
    }

    /// Resolve the properties visible at `layer`.
    ///
    /// RAW is what the connector reported; MODEL applies MODEL overrides to RAW;
    /// PRESENTATION applies PRESENTATION overrides to the resolved MODEL view.
    pub fn layer_properties(&self, layer: LayerType) -> LayerProperties {
        let model = || match self.overrides.get(&LayerType::Model) {
            Some(o) => self.native.apply(o),
            None => self.native.clone(),
        };
        match layer {
            LayerType::Raw => self.native.clone(),
            LayerType::Model => model(),
            LayerType::Presentation => match self.overrides.get(&LayerType::Presentation) {
                Some(o) => model().apply(o),
                None => model(),
            },
        }
    }

    /// Plain resolved view of this attribute for one layer.
    pub fn for_layer(&self, layer: LayerType) -> AttributeView {
        let properties = self.layer_properties(layer);
        AttributeView {
            name: self.name.clone(),
            layer,
            value_type: self.value_type,
            min_occurs: self.min_occurs,
            max_occurs: self.max_occurs,
            matching_rule: self.matching_rule.clone(),
            index_only: self.index_only,
            ignored: properties.ignored,
            can_create: properties.can_create,
            can_read: properties.can_read,
            can_update: properties.can_update,
            display_name: properties.display_name,
            display_order: properties.display_order,
            has_outbound_mapping: properties.has_outbound_mapping,
        }
    }
}

/// An attribute definition resolved for a single layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeView {
    pub name: ItemName,
    pub layer: LayerType,
    pub value_type: ValueType,
    pub min_occurs: u32,
    pub max_occurs: Option<u32>,
    pub matching_rule: Option<String>,
    pub index_only: bool,
    pub ignored: bool,
    pub can_create: bool,
    pub can_read: bool,
    pub can_update: bool,
    pub display_name: Option<String>,
    pub display_order: Option<i32>,
    pub has_outbound_mapping: bool,
}

/// Direction of an entitlement association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssociationDirection {
    /// The subject (account) holds the reference, e.g. `memberOf`.
    SubjectToObject,
    /// The object (group) holds the reference, e.g. `member`.
    ObjectToSubject,
}

/// Entitlement relation between an account type and an entitlement type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationDefinition {
    pub name: ItemName,
    pub target_kind: ShadowKind,
    pub target_intents: Vec<String>,
    pub direction: AssociationDirection,
    /// Attribute on the holder side that carries the reference.
    pub association_attribute: ItemName,
    /// Attribute on the other side whose value is referenced.
    pub value_attribute: ItemName,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_name_parsing_and_display() {
        let name: ItemName = "ri:mail".parse().unwrap();
        assert_eq!(name, ItemName::ri("mail"));
        assert_eq!(name.to_string(), "ri:mail");

        let bare: ItemName = "mail".parse().unwrap();
        assert_eq!(bare.prefix(), None);
        assert!(bare.matches(&name));
        assert!(!ItemName::icfs("mail").matches(&name));
        assert!("ri:".parse::<ItemName>().is_err());
    }

    #[test]
    fn test_item_name_serde_uses_string_form() {
        let json = serde_json::to_string(&ItemName::icfs("name")).unwrap();
        assert_eq!(json, "\"icfs:name\"");
        let back: ItemName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ItemName::icfs("name"));
    }

    #[test]
    fn test_layer_resolution() {
        let attr = AttributeDefinition::new(ItemName::ri("description"))
            .with_override(
                LayerType::Model,
                LayerOverride {
                    can_update: Some(false),
                    display_name: Some("Description".to_string()),
                    ..Default::default()
                },
            )
            .with_override(
                LayerType::Presentation,
                LayerOverride {
                    ignored: Some(true),
                    ..Default::default()
                },
            );

        let raw = attr.for_layer(LayerType::Raw);
        assert!(raw.can_update);
        assert!(!raw.ignored);
        assert_eq!(raw.display_name, None);

        let model = attr.for_layer(LayerType::Model);
        assert!(!model.can_update);
        assert!(!model.ignored);
        assert_eq!(model.display_name.as_deref(), Some("Description"));

        let presentation = attr.for_layer(LayerType::Presentation);
        assert!(presentation.ignored);
        assert!(!presentation.can_update);
        assert_eq!(presentation.display_name.as_deref(), Some("Description"));
    }

    #[test]
    fn test_cardinality() {
        let single = AttributeDefinition::new(ItemName::ri("mail"));
        assert!(single.is_single_valued());
        let multi = single.clone().multi_valued();
        assert!(multi.is_multi_valued());
        assert!(ValueType::PolyString.is_textual());
        assert!(!ValueType::Int.is_textual());
    }

    #[test]
    fn test_override_merge_prefers_later() {
        let parent = LayerOverride {
            can_read: Some(false),
            display_order: Some(10),
            ..Default::default()
        };
        let child = LayerOverride {
            display_order: Some(20),
            ..Default::default()
        };
        let merged = parent.merged_with(&child);
        assert_eq!(merged.can_read, Some(false));
        assert_eq!(merged.display_order, Some(20));
    }
}
