//! Protected object patterns.
//!
//! Administrators flag objects that provisioning must never touch (e.g. the
//! `administrator` account of an LDAP server). A pattern is an equality filter
//! over shadow attributes; an object is protected when every condition holds.
//! [`ProtectedObjectPattern::matches_with`] compares values through the
//! attribute's matching rule, which is what shadow values are stored under.

use super::definition::CompositeObjectDefinition;
use super::matching::MatchingRuleRegistry;
use super::types::ItemName;
use crate::error::ProvisioningResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// `attribute = value` condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeEquals {
    pub attribute: ItemName,
    pub value: Value,
}

/// Conjunction of equality conditions identifying protected objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtectedObjectPattern {
    #[serde(default)]
    pub filter: Vec<AttributeEquals>,
}

impl ProtectedObjectPattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_condition(mut self, attribute: ItemName, value: Value) -> Self {
        self.filter.push(AttributeEquals { attribute, value });
        self
    }

    /// Whether the shadow attributes satisfy every condition.
    ///
    /// Attributes not named by the filter are ignored. An empty filter matches nothing.
    pub fn matches(&self, shadow_attributes: &BTreeMap<ItemName, Vec<Value>>) -> bool {
        if self.filter.is_empty() {
            return false;
        }
        self.filter.iter().all(|condition| {
            shadow_attributes
                .iter()
                .filter(|(name, _)| name.matches(&condition.attribute))
                .any(|(_, values)| values.contains(&condition.value))
        })
    }

    /// Like [`matches`](Self::matches), but both the condition value and the
    /// stored values are normalized by the attribute's matching rule first.
    ///
    /// Conditions on attributes unknown to the definition compare raw values.
    pub fn matches_with(
        &self,
        shadow_attributes: &BTreeMap<ItemName, Vec<Value>>,
        definition: &CompositeObjectDefinition,
        rules: &dyn MatchingRuleRegistry,
    ) -> ProvisioningResult<bool> {
        if self.filter.is_empty() {
            return Ok(false);
        }
        for condition in &self.filter {
            let rule = match definition.find_attribute(&condition.attribute) {
                Some(attribute) => {
                    Some(rules.resolve(attribute.matching_rule.as_deref(), attribute.value_type)?)
                }
                None => None,
            };
            let holds = shadow_attributes
                .iter()
                .filter(|(name, _)| name.matches(&condition.attribute))
                .any(|(_, values)| match &rule {
                    Some(rule) => values.iter().any(|v| rule.matches(v, &condition.value)),
                    None => values.contains(&condition.value),
                });
            if !holds {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Whether any of the patterns protects the object.
pub fn is_protected(
    patterns: &[ProtectedObjectPattern],
    shadow_attributes: &BTreeMap<ItemName, Vec<Value>>,
) -> bool {
    patterns.iter().any(|pattern| pattern.matches(shadow_attributes))
}

/// Whether any of the definition's own patterns protects the object, comparing
/// values under the attributes' matching rules.
pub fn is_protected_with(
    shadow_attributes: &BTreeMap<ItemName, Vec<Value>>,
    definition: &CompositeObjectDefinition,
    rules: &dyn MatchingRuleRegistry,
) -> ProvisioningResult<bool> {
    for pattern in definition.structural.protected_patterns() {
        if pattern.matches_with(shadow_attributes, definition, rules)? {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{NativeAttribute, NativeObjectClass, NativeSchema};
    use crate::resource::capabilities::CapabilitySet;
    use crate::schema::{
        ObjectTypeConfig, ResourceSchema, ShadowKind, StandardMatchingRules, TypeIdentification,
    };
    use serde_json::json;
    use std::collections::BTreeSet;

    fn attributes() -> BTreeMap<ItemName, Vec<Value>> {
        let mut map = BTreeMap::new();
        map.insert(ItemName::ri("uid"), vec![json!("admin")]);
        map.insert(ItemName::ri("ou"), vec![json!("system"), json!("people")]);
        map.insert(ItemName::ri("mail"), vec![json!("admin@example.com")]);
        map
    }

    #[test]
    fn test_single_condition_match() {
        let pattern = ProtectedObjectPattern::new().with_condition(ItemName::ri("uid"), json!("admin"));
        assert!(pattern.matches(&attributes()));
    }

    #[test]
    fn test_all_conditions_must_hold() {
        let pattern = ProtectedObjectPattern::new()
            .with_condition(ItemName::ri("uid"), json!("admin"))
            .with_condition(ItemName::ri("ou"), json!("people"));
        assert!(pattern.matches(&attributes()));

        let pattern = pattern.with_condition(ItemName::ri("mail"), json!("other@example.com"));
        assert!(!pattern.matches(&attributes()));
    }

    #[test]
    fn test_missing_attribute_does_not_match() {
        let pattern = ProtectedObjectPattern::new().with_condition(ItemName::ri("cn"), json!("admin"));
        assert!(!pattern.matches(&attributes()));
    }

    #[test]
    fn test_unqualified_condition_name() {
        let pattern =
            ProtectedObjectPattern::new().with_condition(ItemName::unqualified("uid"), json!("admin"));
        assert!(pattern.matches(&attributes()));
    }

    #[test]
    fn test_empty_filter_matches_nothing() {
        assert!(!ProtectedObjectPattern::new().matches(&attributes()));
        assert!(!is_protected(&[], &attributes()));
    }

    fn definition_with(pattern: ProtectedObjectPattern) -> CompositeObjectDefinition {
        let native = NativeSchema::new(vec![
            NativeObjectClass::new(ItemName::ri("AccountObjectClass"))
                .with_attribute(
                    NativeAttribute::new(ItemName::ri("uid")).with_matching_rule("stringIgnoreCase"),
                )
                .with_attribute(NativeAttribute::new(ItemName::ri("ou")).multi_valued())
                .with_primary_identifier(ItemName::ri("uid")),
        ]);
        let mut config = ObjectTypeConfig::new(
            ShadowKind::Account,
            "default",
            ItemName::ri("AccountObjectClass"),
        );
        config.protected.push(pattern);
        let outcome = ResourceSchema::build(&native, &[config], &CapabilitySet::new());
        assert!(outcome.errors.is_empty());
        outcome
            .schema
            .composite_definition(
                &ItemName::ri("AccountObjectClass"),
                Some(&TypeIdentification::new(ShadowKind::Account, "default")),
                &BTreeSet::new(),
            )
            .unwrap()
    }

    #[test]
    fn test_condition_uses_attribute_matching_rule() {
        let pattern = ProtectedObjectPattern::new().with_condition(ItemName::ri("uid"), json!("Admin"));
        let definition = definition_with(pattern.clone());
        let rules = StandardMatchingRules::new();

        assert!(!pattern.matches(&attributes()));
        assert!(pattern.matches_with(&attributes(), &definition, &rules).unwrap());
        assert!(is_protected_with(&attributes(), &definition, &rules).unwrap());
    }

    #[test]
    fn test_exact_rule_still_distinguishes_case() {
        let pattern = ProtectedObjectPattern::new().with_condition(ItemName::ri("ou"), json!("System"));
        let definition = definition_with(pattern.clone());
        let rules = StandardMatchingRules::new();

        assert!(!pattern.matches_with(&attributes(), &definition, &rules).unwrap());
        assert!(!is_protected_with(&attributes(), &definition, &rules).unwrap());
    }

    #[test]
    fn test_any_pattern_protects() {
        let patterns = vec![
            ProtectedObjectPattern::new().with_condition(ItemName::ri("uid"), json!("root")),
            ProtectedObjectPattern::new().with_condition(ItemName::ri("uid"), json!("admin")),
        ];
        assert!(is_protected(&patterns, &attributes()));
    }
}
