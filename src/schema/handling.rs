//! Administrator-declared schema handling: object types and attribute refinements.
//!
//! These are the raw configuration fragments found on a resource (and on its
//! templates). They are merged along the ancestor chain and then applied to the
//! connector schema by [`ResourceSchema::build`](super::ResourceSchema::build).

use super::protected::ProtectedObjectPattern;
use super::types::{
    AssociationDefinition, AttributeDefinition, ItemName, LayerOverride, LayerType, ShadowKind,
    TypeIdentification,
};
use crate::error::{ProvisioningError, ProvisioningResult};
use crate::resource::definition::CachingPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Refinement of one attribute within an object type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttributeRefinement {
    pub name: Option<ItemName>,
    pub display_name: Option<String>,
    pub display_order: Option<i32>,
    pub matching_rule: Option<String>,
    pub cached: Option<bool>,
    pub index_only: Option<bool>,
    pub min_occurs: Option<u32>,
    /// `Some(None)` makes the attribute unbounded.
    #[serde(with = "max_occurs")]
    pub max_occurs: Option<Option<u32>>,
    /// Whether an outbound mapping feeds this attribute.
    pub outbound: Option<bool>,
    /// Per-layer limitations.
    pub limitations: BTreeMap<LayerType, LayerOverride>,
}

mod max_occurs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    // "unbounded" or a number.
    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Bounded(u32),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Option<Option<u32>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            None => s.serialize_none(),
            Some(Some(n)) => Repr::Bounded(*n).serialize(s),
            Some(None) => Repr::Text("unbounded".to_string()).serialize(s),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Option<u32>>, D::Error> {
        match Option::<Repr>::deserialize(d)? {
            None => Ok(None),
            Some(Repr::Bounded(n)) => Ok(Some(Some(n))),
            Some(Repr::Text(t)) if t == "unbounded" => Ok(Some(None)),
            Some(Repr::Text(t)) => Err(serde::de::Error::custom(format!(
                "invalid maxOccurs '{}'",
                t
            ))),
        }
    }
}

impl AttributeRefinement {
    pub fn new(name: ItemName) -> Self {
        Self {
            name: Some(name),
            ..Default::default()
        }
    }

    /// Overlay `child` on top of `self`.
    pub fn merged_with(&self, child: &AttributeRefinement) -> AttributeRefinement {
        let mut limitations = self.limitations.clone();
        for (layer, o) in &child.limitations {
            let merged = match limitations.get(layer) {
                Some(existing) => existing.merged_with(o),
                None => o.clone(),
            };
            limitations.insert(*layer, merged);
        }
        AttributeRefinement {
            name: child.name.clone().or_else(|| self.name.clone()),
            display_name: child.display_name.clone().or_else(|| self.display_name.clone()),
            display_order: child.display_order.or(self.display_order),
            matching_rule: child.matching_rule.clone().or_else(|| self.matching_rule.clone()),
            cached: child.cached.or(self.cached),
            index_only: child.index_only.or(self.index_only),
            min_occurs: child.min_occurs.or(self.min_occurs),
            max_occurs: child.max_occurs.or(self.max_occurs),
            outbound: child.outbound.or(self.outbound),
            limitations,
        }
    }

    /// Apply this refinement to the class-level definition of the same attribute.
    pub fn apply_to(&self, base: &AttributeDefinition) -> ProvisioningResult<AttributeDefinition> {
        if self.limitations.contains_key(&LayerType::Raw) {
            return Err(ProvisioningError::misconfiguration(format!(
                "Attribute '{}' declares a RAW-layer limitation; RAW is connector-reported",
                base.name
            )));
        }

        let mut refined = base.clone();
        if let Some(rule) = &self.matching_rule {
            refined.matching_rule = Some(rule.clone());
        }
        if let Some(cached) = self.cached {
            refined.cached = Some(cached);
        }
        if let Some(index_only) = self.index_only {
            refined.index_only = index_only;
        }
        if let Some(min) = self.min_occurs {
            refined.min_occurs = min;
        }
        if let Some(max) = self.max_occurs {
            refined.max_occurs = max;
        }
        if let Some(max) = refined.max_occurs {
            if refined.min_occurs > max {
                return Err(ProvisioningError::misconfiguration(format!(
                    "Attribute '{}' has minOccurs {} greater than maxOccurs {}",
                    base.name, refined.min_occurs, max
                )));
            }
        }

        let declared = LayerOverride {
            display_name: self.display_name.clone(),
            display_order: self.display_order,
            has_outbound_mapping: self.outbound,
            ..Default::default()
        };
        let model = match self.limitations.get(&LayerType::Model) {
            Some(limitation) => declared.merged_with(limitation),
            None => declared,
        };
        let model = match refined.overrides.get(&LayerType::Model) {
            Some(existing) => existing.merged_with(&model),
            None => model,
        };
        refined.overrides.insert(LayerType::Model, model);

        if let Some(presentation) = self.limitations.get(&LayerType::Presentation) {
            let merged = match refined.overrides.get(&LayerType::Presentation) {
                Some(existing) => existing.merged_with(presentation),
                None => presentation.clone(),
            };
            refined.overrides.insert(LayerType::Presentation, merged);
        }
        Ok(refined)
    }
}

/// Declared object type (kind + intent) refining an object class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectTypeConfig {
    pub kind: ShadowKind,
    pub intent: String,
    #[serde(default)]
    pub object_class: Option<ItemName>,
    #[serde(default)]
    pub default_for_kind: Option<bool>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub display_name_attribute: Option<ItemName>,
    #[serde(default)]
    pub attributes: Vec<AttributeRefinement>,
    #[serde(default)]
    pub associations: Vec<AssociationDefinition>,
    #[serde(default)]
    pub protected: Vec<ProtectedObjectPattern>,
    #[serde(default)]
    pub auxiliary_object_classes: Vec<ItemName>,
    #[serde(default)]
    pub caching: Option<CachingPolicy>,
    /// Capability overrides specific to this type.
    #[serde(default)]
    pub capabilities: BTreeMap<String, Value>,
}

impl ObjectTypeConfig {
    pub fn new(kind: ShadowKind, intent: impl Into<String>, object_class: ItemName) -> Self {
        Self {
            kind,
            intent: intent.into(),
            object_class: Some(object_class),
            default_for_kind: None,
            display_name: None,
            display_name_attribute: None,
            attributes: Vec::new(),
            associations: Vec::new(),
            protected: Vec::new(),
            auxiliary_object_classes: Vec::new(),
            caching: None,
            capabilities: BTreeMap::new(),
        }
    }

    pub fn as_default(mut self) -> Self {
        self.default_for_kind = Some(true);
        self
    }

    pub fn with_attribute(mut self, refinement: AttributeRefinement) -> Self {
        self.attributes.push(refinement);
        self
    }

    pub fn with_protected(mut self, pattern: ProtectedObjectPattern) -> Self {
        self.protected.push(pattern);
        self
    }

    pub fn with_caching(mut self, caching: CachingPolicy) -> Self {
        self.caching = Some(caching);
        self
    }

    pub fn identification(&self) -> TypeIdentification {
        TypeIdentification::new(self.kind, self.intent.clone())
    }

    /// Overlay `child` (same kind and intent) on top of `self`.
    pub fn merged_with(&self, child: &ObjectTypeConfig) -> ObjectTypeConfig {
        let mut attributes = self.attributes.clone();
        for refinement in &child.attributes {
            let existing = attributes
                .iter_mut()
                .find(|a| a.name.is_some() && a.name == refinement.name);
            match existing {
                Some(parent) => *parent = parent.merged_with(refinement),
                None => attributes.push(refinement.clone()),
            }
        }

        let mut capabilities = self.capabilities.clone();
        capabilities.extend(child.capabilities.clone());

        ObjectTypeConfig {
            kind: child.kind,
            intent: child.intent.clone(),
            object_class: child.object_class.clone().or_else(|| self.object_class.clone()),
            default_for_kind: child.default_for_kind.or(self.default_for_kind),
            display_name: child.display_name.clone().or_else(|| self.display_name.clone()),
            display_name_attribute: child
                .display_name_attribute
                .clone()
                .or_else(|| self.display_name_attribute.clone()),
            attributes,
            associations: if child.associations.is_empty() {
                self.associations.clone()
            } else {
                child.associations.clone()
            },
            protected: if child.protected.is_empty() {
                self.protected.clone()
            } else {
                child.protected.clone()
            },
            auxiliary_object_classes: if child.auxiliary_object_classes.is_empty() {
                self.auxiliary_object_classes.clone()
            } else {
                child.auxiliary_object_classes.clone()
            },
            caching: child.caching.clone().or_else(|| self.caching.clone()),
            capabilities,
        }
    }
}

/// Merge object type lists from parent and child; types pair up by kind and intent.
pub fn merge_object_types(
    parent: &[ObjectTypeConfig],
    child: &[ObjectTypeConfig],
) -> Vec<ObjectTypeConfig> {
    let mut merged = parent.to_vec();
    for child_type in child {
        match merged
            .iter_mut()
            .find(|t| t.kind == child_type.kind && t.intent == child_type.intent)
        {
            Some(parent_type) => *parent_type = parent_type.merged_with(child_type),
            None => merged.push(child_type.clone()),
        }
    }
    merged
}
