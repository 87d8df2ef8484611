//! Matching rules: value normalization used when comparing attribute values.
//!
//! The registry resolves a rule by its (optional) identifier and the value type
//! of the attribute it is applied to. A missing identifier selects the default
//! rule, which leaves values untouched.

use super::types::ValueType;
use crate::error::{ProvisioningError, ProvisioningResult};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_RULE: &str = "default";
pub const STRING_IGNORE_CASE: &str = "stringIgnoreCase";
pub const POLY_STRING_NORM: &str = "polyStringNorm";
pub const DISTINGUISHED_NAME: &str = "distinguishedName";
pub const UUID: &str = "uuid";
pub const EMAIL_ADDRESS: &str = "emailAddress";

/// Value normalization.
pub trait MatchingRule: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Whether the rule may be applied to values of this type.
    fn supports(&self, value_type: ValueType) -> bool;

    fn normalize(&self, value: &Value) -> Value;

    fn matches(&self, a: &Value, b: &Value) -> bool {
        self.normalize(a) == self.normalize(b)
    }
}

/// Registry of matching rules.
pub trait MatchingRuleRegistry: Send + Sync {
    /// Resolve the rule for an attribute. Unknown ids and type mismatches are schema violations.
    fn resolve(
        &self,
        rule: Option<&str>,
        value_type: ValueType,
    ) -> ProvisioningResult<Arc<dyn MatchingRule>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Default,
    StringIgnoreCase,
    PolyStringNorm,
    DistinguishedName,
    Uuid,
    EmailAddress,
}

#[derive(Debug)]
struct BuiltinRule(Builtin);

impl BuiltinRule {
    fn map_text(value: &Value, f: impl Fn(&str) -> String) -> Value {
        match value {
            Value::String(s) => Value::String(f(s)),
            other => other.clone(),
        }
    }
}

impl MatchingRule for BuiltinRule {
    fn name(&self) -> &str {
        match self.0 {
            Builtin::Default => DEFAULT_RULE,
            Builtin::StringIgnoreCase => STRING_IGNORE_CASE,
            Builtin::PolyStringNorm => POLY_STRING_NORM,
            Builtin::DistinguishedName => DISTINGUISHED_NAME,
            Builtin::Uuid => UUID,
            Builtin::EmailAddress => EMAIL_ADDRESS,
        }
    }

    fn supports(&self, value_type: ValueType) -> bool {
        match self.0 {
            Builtin::Default => true,
            _ => value_type.is_textual(),
        }
    }

    fn normalize(&self, value: &Value) -> Value {
        match self.0 {
            Builtin::Default => value.clone(),
            Builtin::StringIgnoreCase => Self::map_text(value, |s| s.to_lowercase()),
            Builtin::PolyStringNorm => Self::map_text(value, |s| {
                s.split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_lowercase()
            }),
            Builtin::DistinguishedName => Self::map_text(value, normalize_dn),
            Builtin::Uuid => Self::map_text(value, |s| {
                s.trim()
                    .trim_start_matches('{')
                    .trim_end_matches('}')
                    .to_lowercase()
            }),
            Builtin::EmailAddress => Self::map_text(value, |s| match s.rsplit_once('@') {
                Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
                None => s.to_string(),
            }),
        }
    }
}

fn normalize_dn(dn: &str) -> String {
    dn.split(',')
        .map(|rdn| {
            rdn.split('=')
                .map(|part| part.trim().to_lowercase())
                .collect::<Vec<_>>()
                .join("=")
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Registry holding the built-in rules plus anything registered later.
#[derive(Debug, Clone)]
pub struct StandardMatchingRules {
    rules: HashMap<String, Arc<dyn MatchingRule>>,
}

impl StandardMatchingRules {
    pub fn new() -> Self {
        let mut rules: HashMap<String, Arc<dyn MatchingRule>> = HashMap::new();
        for builtin in [
            Builtin::Default,
            Builtin::StringIgnoreCase,
            Builtin::PolyStringNorm,
            Builtin::DistinguishedName,
            Builtin::Uuid,
            Builtin::EmailAddress,
        ] {
            let rule = Arc::new(BuiltinRule(builtin));
            rules.insert(rule.name().to_string(), rule);
        }
        Self { rules }
    }

    /// Add or replace a rule.
    pub fn register(&mut self, rule: Arc<dyn MatchingRule>) {
        self.rules.insert(rule.name().to_string(), rule);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for StandardMatchingRules {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchingRuleRegistry for StandardMatchingRules {
    fn resolve(
        &self,
        rule: Option<&str>,
        value_type: ValueType,
    ) -> ProvisioningResult<Arc<dyn MatchingRule>> {
        let id = rule.unwrap_or(DEFAULT_RULE);
        let resolved = self.rules.get(id).ok_or_else(|| {
            ProvisioningError::schema_violation(format!("Unknown matching rule '{}'", id))
        })?;
        if !resolved.supports(value_type) {
            return Err(ProvisioningError::schema_violation(format!(
                "Matching rule '{}' cannot be applied to {:?} values",
                id, value_type
            )));
        }
        Ok(Arc::clone(resolved))
    }
}
