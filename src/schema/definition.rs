//! Object class and object type definitions.
//!
//! A connector reports object classes. Administrators refine some of them into
//! object types keyed by kind and intent. Code that needs "the definition of
//! this shadow" works with [`ObjectDefinition`], a small tagged union of the two,
//! or with [`CompositeObjectDefinition`] when auxiliary classes are involved.

use super::protected::ProtectedObjectPattern;
use super::types::{
    AssociationDefinition, AttributeDefinition, AttributeView, ItemName, LayerType, ShadowKind,
    TypeIdentification,
};
use crate::resource::capabilities::CapabilitySet;
use crate::resource::definition::CachingPolicy;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Connector-native object class with its RAW attribute definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceObjectClassDefinition {
    pub name: ItemName,
    pub auxiliary: bool,
    pub attributes: Vec<AttributeDefinition>,
    pub primary_identifiers: Vec<ItemName>,
    pub secondary_identifiers: Vec<ItemName>,
    pub display_name_attribute: Option<ItemName>,
    pub naming_attribute: Option<ItemName>,
}

impl ResourceObjectClassDefinition {
    pub fn new(name: ItemName) -> Self {
        Self {
            name,
            auxiliary: false,
            attributes: Vec::new(),
            primary_identifiers: Vec::new(),
            secondary_identifiers: Vec::new(),
            display_name_attribute: None,
            naming_attribute: None,
        }
    }

    pub fn find_attribute(&self, name: &ItemName) -> Option<&AttributeDefinition> {
        find_in(&self.attributes, name)
    }

    pub fn is_primary_identifier(&self, name: &ItemName) -> bool {
        self.primary_identifiers.iter().any(|id| id.matches(name))
    }

    pub fn is_identifier(&self, name: &ItemName) -> bool {
        self.is_primary_identifier(name)
            || self.secondary_identifiers.iter().any(|id| id.matches(name))
    }
}

/// Administrator-declared refinement of an object class, keyed by kind and intent.
///
/// Attributes are resolved eagerly at construction: each entry is the class
/// attribute with the type-level refinement applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceObjectTypeDefinition {
    pub identification: TypeIdentification,
    pub display_name: Option<String>,
    pub default_for_kind: bool,
    pub object_class: Arc<ResourceObjectClassDefinition>,
    pub attributes: Vec<AttributeDefinition>,
    pub display_name_attribute: Option<ItemName>,
    pub associations: Vec<AssociationDefinition>,
    pub protected_patterns: Vec<ProtectedObjectPattern>,
    pub auxiliary_object_classes: Vec<ItemName>,
    pub caching: Option<CachingPolicy>,
    /// Effective capabilities when the type overrides the resource's.
    pub capabilities: Option<CapabilitySet>,
}

impl ResourceObjectTypeDefinition {
    pub fn kind(&self) -> ShadowKind {
        self.identification.kind
    }

    pub fn intent(&self) -> &str {
        &self.identification.intent
    }

    /// Type-level attribute, falling back to the class-level one.
    pub fn find_attribute(&self, name: &ItemName) -> Option<&AttributeDefinition> {
        find_in(&self.attributes, name).or_else(|| self.object_class.find_attribute(name))
    }

    pub fn find_association(&self, name: &ItemName) -> Option<&AssociationDefinition> {
        self.associations.iter().find(|a| a.name.matches(name))
    }
}

fn find_in<'a>(
    attributes: &'a [AttributeDefinition],
    name: &ItemName,
) -> Option<&'a AttributeDefinition> {
    attributes
        .iter()
        .find(|a| a.name == *name)
        .or_else(|| attributes.iter().find(|a| a.name.matches(name)))
}

/// Either a bare object class or a refined object type.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectDefinition {
    Class(Arc<ResourceObjectClassDefinition>),
    Type(Arc<ResourceObjectTypeDefinition>),
}

impl ObjectDefinition {
    pub fn object_class(&self) -> &ResourceObjectClassDefinition {
        match self {
            ObjectDefinition::Class(class) => class,
            ObjectDefinition::Type(object_type) => &object_type.object_class,
        }
    }

    pub fn object_class_name(&self) -> &ItemName {
        &self.object_class().name
    }

    pub fn type_identification(&self) -> Option<&TypeIdentification> {
        match self {
            ObjectDefinition::Class(_) => None,
            ObjectDefinition::Type(object_type) => Some(&object_type.identification),
        }
    }

    pub fn attributes(&self) -> &[AttributeDefinition] {
        match self {
            ObjectDefinition::Class(class) => &class.attributes,
            ObjectDefinition::Type(object_type) => &object_type.attributes,
        }
    }

    pub fn find_attribute(&self, name: &ItemName) -> Option<&AttributeDefinition> {
        match self {
            ObjectDefinition::Class(class) => class.find_attribute(name),
            ObjectDefinition::Type(object_type) => object_type.find_attribute(name),
        }
    }

    pub fn is_identifier(&self, name: &ItemName) -> bool {
        self.object_class().is_identifier(name)
    }

    pub fn display_name_attribute(&self) -> Option<&ItemName> {
        match self {
            ObjectDefinition::Class(class) => class.display_name_attribute.as_ref(),
            ObjectDefinition::Type(object_type) => object_type
                .display_name_attribute
                .as_ref()
                .or(object_type.object_class.display_name_attribute.as_ref()),
        }
    }

    pub fn caching_policy(&self) -> Option<&CachingPolicy> {
        match self {
            ObjectDefinition::Class(_) => None,
            ObjectDefinition::Type(object_type) => object_type.caching.as_ref(),
        }
    }

    pub fn protected_patterns(&self) -> &[ProtectedObjectPattern] {
        match self {
            ObjectDefinition::Class(_) => &[],
            ObjectDefinition::Type(object_type) => &object_type.protected_patterns,
        }
    }

    /// Project every attribute onto one layer.
    pub fn for_layer(&self, layer: LayerType) -> ObjectDefinitionView {
        ObjectDefinitionView {
            object_class: self.object_class_name().clone(),
            type_identification: self.type_identification().cloned(),
            layer,
            attributes: self
                .attributes()
                .iter()
                .map(|attribute| attribute.for_layer(layer))
                .collect(),
        }
    }
}

/// Plain per-layer projection of an [`ObjectDefinition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDefinitionView {
    pub object_class: ItemName,
    pub type_identification: Option<TypeIdentification>,
    pub layer: LayerType,
    pub attributes: Vec<AttributeView>,
}

impl ObjectDefinitionView {
    pub fn find_attribute(&self, name: &ItemName) -> Option<&AttributeView> {
        self.attributes.iter().find(|a| a.name.matches(name))
    }

    /// Attributes not ignored at this layer, ordered by display order then name.
    pub fn visible_attributes(&self) -> Vec<&AttributeView> {
        let mut visible: Vec<&AttributeView> =
            self.attributes.iter().filter(|a| !a.ignored).collect();
        visible.sort_by(|a, b| {
            a.display_order
                .unwrap_or(i32::MAX)
                .cmp(&b.display_order.unwrap_or(i32::MAX))
                .then_with(|| a.name.cmp(&b.name))
        });
        visible
    }
}

/// Structural definition plus the auxiliary classes present on an object.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeObjectDefinition {
    pub structural: ObjectDefinition,
    pub auxiliary: Vec<Arc<ResourceObjectClassDefinition>>,
}

impl CompositeObjectDefinition {
    pub fn new(structural: ObjectDefinition) -> Self {
        Self {
            structural,
            auxiliary: Vec::new(),
        }
    }

    pub fn with_auxiliary(mut self, auxiliary: Arc<ResourceObjectClassDefinition>) -> Self {
        self.auxiliary.push(auxiliary);
        self
    }

    /// Structural attributes take precedence over auxiliary ones.
    pub fn find_attribute(&self, name: &ItemName) -> Option<&AttributeDefinition> {
        self.structural.find_attribute(name).or_else(|| {
            self.auxiliary
                .iter()
                .find_map(|class| class.find_attribute(name))
        })
    }

    pub fn is_identifier(&self, name: &ItemName) -> bool {
        self.structural.is_identifier(name)
    }

    /// Derive the shadow name from object attributes.
    ///
    /// Tries the display-name attribute, the naming attribute, the first
    /// secondary identifier and the first primary identifier, in that order.
    pub fn derive_name(&self, attributes: &BTreeMap<ItemName, Vec<Value>>) -> Option<String> {
        let class = self.structural.object_class();
        let candidates = self
            .structural
            .display_name_attribute()
            .into_iter()
            .chain(class.naming_attribute.iter())
            .chain(class.secondary_identifiers.first())
            .chain(class.primary_identifiers.first());

        for candidate in candidates {
            let value = attributes
                .iter()
                .find(|(name, _)| name.matches(candidate))
                .and_then(|(_, values)| values.first());
            if let Some(value) = value {
                return Some(match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
            }
        }
        None
    }
}
