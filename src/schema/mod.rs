//! Resource schema model.
//!
//! Connectors report object classes with RAW attribute definitions. Resource
//! configuration refines them into object types (kind + intent) with MODEL and
//! PRESENTATION layer adjustments. [`ResourceSchema`] is the completed result
//! that the rest of the provisioning layer looks definitions up in.
//!
//! # Key Types
//!
//! - [`ResourceSchema`] - Object classes and object types of one resource
//! - [`AttributeDefinition`] - Attribute with per-layer properties
//! - [`MatchingRuleRegistry`] - Value normalization and comparison
//! - [`ProtectedObjectPattern`] - Filter for objects provisioning must not touch
//!
//! # Examples
//!
//! ```rust
//! use resource_provisioning::connector::{NativeAttribute, NativeObjectClass, NativeSchema};
//! use resource_provisioning::resource::capabilities::CapabilitySet;
//! use resource_provisioning::schema::{ItemName, ObjectTypeConfig, ResourceSchema, ShadowKind};
//!
//! let native = NativeSchema::new(vec![
//!     NativeObjectClass::new(ItemName::ri("AccountObjectClass"))
//!         .with_attribute(NativeAttribute::new(ItemName::icfs("name")))
//!         .with_primary_identifier(ItemName::icfs("name")),
//! ]);
//! let types = vec![ObjectTypeConfig::new(
//!     ShadowKind::Account,
//!     "default",
//!     ItemName::ri("AccountObjectClass"),
//! )];
//!
//! let outcome = ResourceSchema::build(&native, &types, &CapabilitySet::new());
//! assert!(outcome.errors.is_empty());
//! assert!(outcome.schema.find_default_type(ShadowKind::Account).is_some());
//! ```

pub mod definition;
pub mod handling;
pub mod matching;
pub mod protected;
pub mod resource_schema;
pub mod types;

pub use definition::{
    CompositeObjectDefinition, ObjectDefinition, ObjectDefinitionView,
    ResourceObjectClassDefinition, ResourceObjectTypeDefinition,
};
pub use handling::{AttributeRefinement, ObjectTypeConfig, merge_object_types};
pub use matching::{MatchingRule, MatchingRuleRegistry, StandardMatchingRules};
pub use protected::{AttributeEquals, ProtectedObjectPattern, is_protected, is_protected_with};
pub use resource_schema::{ResourceSchema, SchemaBuildOutcome};
pub use types::{
    AssociationDefinition, AssociationDirection, AttributeDefinition, AttributeView, ItemName,
    LayerOverride, LayerProperties, LayerType, ShadowKind, TypeIdentification, ValueType,
};
