//! Shadow delta computation.
//!
//! Given a stored shadow and the object just observed on the resource, compute
//! the smallest delta that brings the shadow in line, honoring the caching
//! strategy in effect. The computation is pure: inputs are never modified and
//! any failure aborts the whole delta.

use super::delta::{ActivationProperty, ItemDelta, ItemPath, ResourceObjectDelta, ShadowDelta};
use super::types::{CachingMetadata, ObservedAttribute, ResourceObject, ShadowLifecycleState, ShadowRecord};
use crate::context::{Clock, SystemClock};
use crate::error::{ProvisioningError, ProvisioningResult};
use crate::resource::CachingStrategy;
use crate::schema::{
    AttributeDefinition, CompositeObjectDefinition, ItemName, LayerType, MatchingRule,
    MatchingRuleRegistry,
};
use log::trace;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Default for [`ShadowDeltaContext::large_value_set_threshold`].
pub const DEFAULT_LARGE_VALUE_SET_THRESHOLD: usize = 100;

/// Everything the computation needs besides the shadow and the observed object.
#[derive(Clone)]
pub struct ShadowDeltaContext {
    pub caching_strategy: CachingStrategy,
    pub definition: CompositeObjectDefinition,
    pub matching_rules: Arc<dyn MatchingRuleRegistry>,
    pub clock: Arc<dyn Clock>,
    /// Initial value sets of at least this size are written by replace.
    pub large_value_set_threshold: usize,
}

impl ShadowDeltaContext {
    pub fn new(
        caching_strategy: CachingStrategy,
        definition: CompositeObjectDefinition,
        matching_rules: Arc<dyn MatchingRuleRegistry>,
    ) -> Self {
        Self {
            caching_strategy,
            definition,
            matching_rules,
            clock: Arc::new(SystemClock),
            large_value_set_threshold: DEFAULT_LARGE_VALUE_SET_THRESHOLD,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_large_value_set_threshold(mut self, threshold: usize) -> Self {
        self.large_value_set_threshold = threshold;
        self
    }
}

/// Which attributes end up in the shadow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retention {
    IdentifiersOnly,
    Readable,
}

/// Compute the delta from `shadow` to the state reported in `observed`.
///
/// `known_delta` carries changes the connector reported explicitly; it is
/// consulted for attributes whose observed values are incomplete.
pub fn compute_shadow_delta(
    context: &ShadowDeltaContext,
    shadow: &ShadowRecord,
    observed: &ResourceObject,
    known_delta: Option<&ResourceObjectDelta>,
    lifecycle_state: ShadowLifecycleState,
) -> ProvisioningResult<ShadowDelta> {
    let retention = match &context.caching_strategy {
        CachingStrategy::None => Retention::IdentifiersOnly,
        CachingStrategy::Passive => Retention::Readable,
        CachingStrategy::Other(name) => {
            return Err(ProvisioningError::misconfiguration(format!(
                "Unsupported caching strategy '{}'",
                name
            )));
        }
    };

    let mut computer = DeltaComputer {
        context,
        shadow,
        retention,
        delta: ShadowDelta::new(),
        incomplete: false,
    };
    computer.attributes(observed, known_delta)?;
    computer.name(observed);
    computer.auxiliary_object_classes(observed);
    computer.exists(lifecycle_state);
    computer.production(observed);
    computer.caching_epilogue(observed);

    trace!(
        "Computed {} modification(s) for shadow {}",
        computer.delta.len(),
        shadow.oid
    );
    Ok(computer.delta)
}

struct DeltaComputer<'a> {
    context: &'a ShadowDeltaContext,
    shadow: &'a ShadowRecord,
    retention: Retention,
    delta: ShadowDelta,
    incomplete: bool,
}

impl DeltaComputer<'_> {
    fn should_persist(&self, definition: &AttributeDefinition) -> bool {
        if self.context.definition.is_identifier(&definition.name) {
            return true;
        }
        match self.retention {
            Retention::IdentifiersOnly => false,
            Retention::Readable => {
                definition.layer_properties(LayerType::Model).can_read
                    && definition.cached != Some(false)
            }
        }
    }

    fn rule_for(&self, definition: &AttributeDefinition) -> ProvisioningResult<Arc<dyn MatchingRule>> {
        self.context
            .matching_rules
            .resolve(definition.matching_rule.as_deref(), definition.value_type)
    }

    fn attributes(
        &mut self,
        observed: &ResourceObject,
        known_delta: Option<&ResourceObjectDelta>,
    ) -> ProvisioningResult<()> {
        let (context, shadow) = (self.context, self.shadow);
        let mut handled: BTreeSet<ItemName> = BTreeSet::new();

        for (name, attribute) in &observed.attributes {
            let Some(definition) = context.definition.find_attribute(name) else {
                continue;
            };
            if !self.should_persist(definition) {
                continue;
            }
            let stored_name = self.stored_name(&definition.name);
            handled.insert(stored_name.clone());

            if attribute.incomplete {
                self.incomplete_attribute(definition, &stored_name, known_delta)?;
            } else {
                self.complete_attribute(definition, &stored_name, attribute)?;
            }
        }

        for (name, values) in &shadow.attributes {
            if !handled.contains(name) && !values.is_empty() {
                self.delta.push(ItemDelta::delete(
                    ItemPath::Attribute(name.clone()),
                    values.clone(),
                ));
            }
        }
        Ok(())
    }

    /// Name under which the shadow stores the attribute, or its definition name.
    fn stored_name(&self, name: &ItemName) -> ItemName {
        if self.shadow.attributes.contains_key(name) {
            return name.clone();
        }
        self.shadow
            .attributes
            .keys()
            .find(|stored| stored.matches(name))
            .cloned()
            .unwrap_or_else(|| name.clone())
    }

    fn incomplete_attribute(
        &mut self,
        definition: &AttributeDefinition,
        stored_name: &ItemName,
        known_delta: Option<&ResourceObjectDelta>,
    ) -> ProvisioningResult<()> {
        let Some(known_delta) = known_delta else {
            trace!("Attribute {} is incomplete, keeping cached values", definition.name);
            self.incomplete = true;
            return Ok(());
        };
        let Some(modification) = known_delta.find_attribute(&definition.name) else {
            return Ok(());
        };
        let rule = self.rule_for(definition)?;
        let normalize = |values: &[Value]| -> Vec<Value> { normalized(rule.as_ref(), values) };
        self.delta.push(ItemDelta {
            path: ItemPath::Attribute(stored_name.clone()),
            values_to_add: normalize(&modification.values_to_add),
            values_to_delete: normalize(&modification.values_to_delete),
            values_to_replace: modification.values_to_replace.as_deref().map(normalize),
        });
        Ok(())
    }

    fn complete_attribute(
        &mut self,
        definition: &AttributeDefinition,
        stored_name: &ItemName,
        attribute: &ObservedAttribute,
    ) -> ProvisioningResult<()> {
        let rule = self.rule_for(definition)?;
        let observed = normalized(rule.as_ref(), &attribute.values);
        let path = ItemPath::Attribute(stored_name.clone());

        let shadow = self.shadow;
        let stored = match shadow.attributes.get(stored_name) {
            Some(values) if !values.is_empty() => values,
            _ => {
                if observed.is_empty() {
                    return Ok(());
                }
                let by_replace = definition.index_only
                    || observed.len() >= self.context.large_value_set_threshold;
                self.delta.push(if by_replace {
                    ItemDelta::replace(path, observed)
                } else {
                    ItemDelta::add(path, observed)
                });
                return Ok(());
            }
        };

        if definition.is_single_valued() {
            let stored_value = stored.first().map(|v| rule.normalize(v));
            if observed.first() != stored_value.as_ref() {
                let replacement = observed.into_iter().take(1).collect();
                self.delta.push(ItemDelta::replace(path, replacement));
            }
            return Ok(());
        }

        let stored_normalized: Vec<Value> = stored.iter().map(|v| rule.normalize(v)).collect();
        let to_add: Vec<Value> = observed
            .iter()
            .filter(|v| !stored_normalized.contains(v))
            .cloned()
            .collect();
        let to_delete: Vec<Value> = stored
            .iter()
            .zip(&stored_normalized)
            .filter(|(_, n)| !observed.contains(n))
            .map(|(v, _)| v.clone())
            .collect();
        self.delta
            .push(ItemDelta::add_and_delete(path, to_add, to_delete));
        Ok(())
    }

    fn name(&mut self, observed: &ResourceObject) {
        let Some(derived) = self.context.definition.derive_name(&observed.attribute_values()) else {
            return;
        };
        if self.shadow.name.as_deref() != Some(derived.as_str()) {
            self.delta
                .push(ItemDelta::replace(ItemPath::Name, vec![Value::String(derived)]));
        }
    }

    fn auxiliary_object_classes(&mut self, observed: &ResourceObject) {
        let stored = &self.shadow.auxiliary_object_classes;
        let observed_classes = &observed.auxiliary_object_classes;
        let covers = |names: &BTreeSet<ItemName>, others: &BTreeSet<ItemName>| {
            others.iter().all(|other| names.iter().any(|name| name.matches(other)))
        };
        if !covers(stored, observed_classes) || !covers(observed_classes, stored) {
            let values = observed
                .auxiliary_object_classes
                .iter()
                .map(|name| Value::String(name.to_string()))
                .collect();
            self.delta
                .push(ItemDelta::replace(ItemPath::AuxiliaryObjectClass, values));
        }
    }

    /// Only a shadow still being created learns that its object exists.
    fn exists(&mut self, lifecycle_state: ShadowLifecycleState) {
        if lifecycle_state.is_pre_creation() && !self.shadow.exists {
            self.delta
                .push(ItemDelta::replace(ItemPath::Exists, vec![Value::Bool(true)]));
        }
    }

    fn production(&mut self, observed: &ResourceObject) {
        if let Some(production) = observed.production {
            if self.shadow.production != Some(production) {
                self.delta.push(ItemDelta::replace(
                    ItemPath::Production,
                    vec![Value::Bool(production)],
                ));
            }
        }
    }

    fn caching_epilogue(&mut self, observed: &ResourceObject) {
        match self.retention {
            Retention::IdentifiersOnly => {
                if self.shadow.caching_metadata.is_some() {
                    self.delta
                        .push(ItemDelta::replace(ItemPath::CachingMetadata, Vec::new()));
                }
            }
            Retention::Readable => {
                for property in ActivationProperty::ALL {
                    let observed_values = property.values_of(&observed.activation);
                    if observed_values != property.values_of(&self.shadow.activation) {
                        self.delta.push(ItemDelta::replace(
                            ItemPath::Activation(property),
                            observed_values,
                        ));
                    }
                }
                if self.incomplete {
                    trace!(
                        "Not refreshing caching metadata of {}: incomplete attributes",
                        self.shadow.oid
                    );
                } else {
                    let metadata = CachingMetadata {
                        retrieval_timestamp: self.context.clock.now(),
                    };
                    self.delta.push(ItemDelta::replace(
                        ItemPath::CachingMetadata,
                        vec![metadata.to_value()],
                    ));
                }
            }
        }
    }
}

/// Normalized values with duplicates removed, in observed order.
fn normalized(rule: &dyn MatchingRule, values: &[Value]) -> Vec<Value> {
    let mut result: Vec<Value> = Vec::with_capacity(values.len());
    for value in values {
        let value = rule.normalize(value);
        if !result.contains(&value) {
            result.push(value);
        }
    }
    result
}
