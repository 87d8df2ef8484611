//! Completed resource schema: object classes plus refined object types.

use super::definition::{
    CompositeObjectDefinition, ObjectDefinition, ResourceObjectClassDefinition,
    ResourceObjectTypeDefinition,
};
use super::handling::ObjectTypeConfig;
use super::types::{AttributeDefinition, ItemName, LayerProperties, ShadowKind, TypeIdentification};
use crate::connector::{NativeAttribute, NativeObjectClass, NativeSchema};
use crate::error::{ProvisioningError, ProvisioningResult};
use crate::resource::capabilities::CapabilitySet;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Object class and object type definitions of one resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceSchema {
    object_classes: Vec<Arc<ResourceObjectClassDefinition>>,
    object_types: Vec<Arc<ResourceObjectTypeDefinition>>,
}

/// Result of building a schema: what could be built, and what could not.
///
/// Every error concerns one scope (an object type); the rest of the schema is
/// still usable for diagnostics.
#[derive(Debug)]
pub struct SchemaBuildOutcome {
    pub schema: ResourceSchema,
    pub errors: Vec<ProvisioningError>,
}

impl ResourceSchema {
    /// RAW schema: connector object classes only.
    pub fn from_native(native: &NativeSchema) -> Self {
        Self {
            object_classes: native
                .object_classes
                .iter()
                .map(|oc| Arc::new(class_from_native(oc)))
                .collect(),
            object_types: Vec::new(),
        }
    }

    /// Apply declared object types on top of the connector schema.
    pub fn build(
        native: &NativeSchema,
        object_types: &[ObjectTypeConfig],
        resource_capabilities: &CapabilitySet,
    ) -> SchemaBuildOutcome {
        let mut schema = Self::from_native(native);
        let mut errors = Vec::new();
        let mut seen = BTreeSet::new();
        let mut defaults: BTreeMap<ShadowKind, TypeIdentification> = BTreeMap::new();

        for config in object_types {
            let identification = config.identification();
            if !seen.insert(identification.clone()) {
                errors.push(ProvisioningError::misconfiguration(format!(
                    "Object type {} is defined more than once",
                    identification
                )));
                continue;
            }
            if config.default_for_kind == Some(true) {
                if let Some(previous) = defaults.get(&config.kind) {
                    errors.push(ProvisioningError::misconfiguration(format!(
                        "Object types {} and {} are both marked default for kind {}",
                        previous, identification, config.kind
                    )));
                    continue;
                }
                defaults.insert(config.kind, identification.clone());
            }
            match schema.resolve_type(config, resource_capabilities) {
                Ok(object_type) => schema.object_types.push(Arc::new(object_type)),
                Err(e) => errors.push(e),
            }
        }

        debug!(
            "Built resource schema: {} object classes, {} object types, {} errors",
            schema.object_classes.len(),
            schema.object_types.len(),
            errors.len()
        );
        SchemaBuildOutcome { schema, errors }
    }

    fn resolve_type(
        &self,
        config: &ObjectTypeConfig,
        resource_capabilities: &CapabilitySet,
    ) -> ProvisioningResult<ResourceObjectTypeDefinition> {
        let identification = config.identification();
        let class_name = config.object_class.as_ref().ok_or_else(|| {
            ProvisioningError::misconfiguration(format!(
                "Object type {} does not name an object class",
                identification
            ))
        })?;
        let object_class = self.find_object_class(class_name).ok_or_else(|| {
            ProvisioningError::misconfiguration(format!(
                "Object type {} refers to unknown object class {}",
                identification, class_name
            ))
        })?;

        let mut refined: BTreeMap<ItemName, AttributeDefinition> = BTreeMap::new();
        for refinement in &config.attributes {
            let name = refinement.name.as_ref().ok_or_else(|| {
                ProvisioningError::misconfiguration(format!(
                    "Attribute refinement without a name in object type {}",
                    identification
                ))
            })?;
            let base = object_class.find_attribute(name).ok_or_else(|| {
                ProvisioningError::misconfiguration(format!(
                    "Object type {} refines attribute {} not present in object class {}",
                    identification, name, object_class.name
                ))
            })?;
            refined.insert(base.name.clone(), refinement.apply_to(base)?);
        }
        let attributes = object_class
            .attributes
            .iter()
            .map(|base| refined.remove(&base.name).unwrap_or_else(|| base.clone()))
            .collect();
        for aux in &config.auxiliary_object_classes {
            if self.find_object_class(aux).is_none() {
                return Err(ProvisioningError::misconfiguration(format!(
                    "Object type {} refers to unknown auxiliary object class {}",
                    identification, aux
                )));
            }
        }

        let capabilities = if config.capabilities.is_empty() {
            None
        } else {
            Some(resource_capabilities.with_overrides(&config.capabilities)?)
        };

        Ok(ResourceObjectTypeDefinition {
            identification,
            display_name: config.display_name.clone(),
            default_for_kind: config.default_for_kind.unwrap_or(false),
            object_class,
            attributes,
            display_name_attribute: config.display_name_attribute.clone(),
            associations: config.associations.clone(),
            protected_patterns: config.protected.clone(),
            auxiliary_object_classes: config.auxiliary_object_classes.clone(),
            caching: config.caching.clone(),
            capabilities,
        })
    }

    pub fn object_classes(&self) -> &[Arc<ResourceObjectClassDefinition>] {
        &self.object_classes
    }

    pub fn object_types(&self) -> &[Arc<ResourceObjectTypeDefinition>] {
        &self.object_types
    }

    pub fn is_empty(&self) -> bool {
        self.object_classes.is_empty()
    }

    pub fn find_object_class(&self, name: &ItemName) -> Option<Arc<ResourceObjectClassDefinition>> {
        self.object_classes
            .iter()
            .find(|oc| oc.name == *name)
            .or_else(|| self.object_classes.iter().find(|oc| oc.name.matches(name)))
            .cloned()
    }

    pub fn find_object_type(
        &self,
        kind: ShadowKind,
        intent: &str,
    ) -> Option<Arc<ResourceObjectTypeDefinition>> {
        self.object_types
            .iter()
            .find(|t| t.kind() == kind && t.intent() == intent)
            .cloned()
    }

    pub fn object_types_of_kind(&self, kind: ShadowKind) -> Vec<Arc<ResourceObjectTypeDefinition>> {
        self.object_types
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }

    /// The default type of a kind: the one marked default, or the only type of that kind.
    pub fn find_default_type(&self, kind: ShadowKind) -> Option<Arc<ResourceObjectTypeDefinition>> {
        let of_kind = self.object_types_of_kind(kind);
        if let Some(marked) = of_kind.iter().find(|t| t.default_for_kind) {
            return Some(Arc::clone(marked));
        }
        match of_kind.as_slice() {
            [only] => Some(Arc::clone(only)),
            _ => None,
        }
    }

    /// Object type for kind and intent; without an intent, the kind's default type.
    pub fn find_object_definition(
        &self,
        kind: ShadowKind,
        intent: Option<&str>,
    ) -> Option<ObjectDefinition> {
        match intent {
            Some(intent) => self.find_object_type(kind, intent),
            None => self.find_default_type(kind),
        }
        .map(ObjectDefinition::Type)
    }

    /// Attribute lookup for a kind and intent, falling back from the type-level
    /// override to the class-level definition.
    pub fn find_attribute(
        &self,
        kind: ShadowKind,
        intent: Option<&str>,
        name: &ItemName,
    ) -> Option<AttributeDefinition> {
        self.find_object_definition(kind, intent)
            .and_then(|definition| definition.find_attribute(name).cloned())
    }

    /// Definition of an object given its class, optional type and auxiliary classes.
    pub fn composite_definition(
        &self,
        object_class: &ItemName,
        type_identification: Option<&TypeIdentification>,
        auxiliary_object_classes: &BTreeSet<ItemName>,
    ) -> ProvisioningResult<CompositeObjectDefinition> {
        let structural = match type_identification {
            Some(id) => {
                let object_type = self.find_object_type(id.kind, &id.intent).ok_or_else(|| {
                    ProvisioningError::schema_violation(format!("Unknown object type {}", id))
                })?;
                if !object_type.object_class.name.matches(object_class) {
                    return Err(ProvisioningError::schema_violation(format!(
                        "Object type {} is defined for {}, not {}",
                        id, object_type.object_class.name, object_class
                    )));
                }
                ObjectDefinition::Type(object_type)
            }
            None => ObjectDefinition::Class(self.find_object_class(object_class).ok_or_else(
                || {
                    ProvisioningError::schema_violation(format!(
                        "Unknown object class {}",
                        object_class
                    ))
                },
            )?),
        };

        let mut auxiliary_names: Vec<ItemName> = match &structural {
            ObjectDefinition::Type(t) => t.auxiliary_object_classes.clone(),
            ObjectDefinition::Class(_) => Vec::new(),
        };
        for name in auxiliary_object_classes {
            if !auxiliary_names.iter().any(|n| n.matches(name)) {
                auxiliary_names.push(name.clone());
            }
        }

        let mut composite = CompositeObjectDefinition::new(structural);
        for name in auxiliary_names {
            let aux = self.find_object_class(&name).ok_or_else(|| {
                ProvisioningError::schema_violation(format!(
                    "Unknown auxiliary object class {}",
                    name
                ))
            })?;
            composite = composite.with_auxiliary(aux);
        }
        Ok(composite)
    }
}

fn class_from_native(native: &NativeObjectClass) -> ResourceObjectClassDefinition {
    ResourceObjectClassDefinition {
        name: native.name.clone(),
        auxiliary: native.auxiliary,
        attributes: native.attributes.iter().map(attribute_from_native).collect(),
        primary_identifiers: native.primary_identifiers.clone(),
        secondary_identifiers: native.secondary_identifiers.clone(),
        display_name_attribute: native.display_name_attribute.clone(),
        naming_attribute: native.naming_attribute.clone(),
    }
}

fn attribute_from_native(native: &NativeAttribute) -> AttributeDefinition {
    AttributeDefinition {
        name: native.name.clone(),
        value_type: native.value_type,
        min_occurs: native.min_occurs,
        max_occurs: native.max_occurs,
        matching_rule: native.matching_rule.clone(),
        index_only: false,
        cached: None,
        native: LayerProperties {
            can_create: native.can_create,
            can_read: native.can_read,
            can_update: native.can_update,
            ..LayerProperties::default()
        },
        overrides: BTreeMap::new(),
    }
}
