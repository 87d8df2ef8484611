//! Shadows and shadow delta computation.
//!
//! A shadow is the repository copy of an account or entitlement living on a
//! resource. Whenever the connector reports an object, [`compute_shadow_delta`]
//! works out the smallest [`ShadowDelta`] that brings the stored shadow in line
//! with it.
//!
//! # Example
//!
//! ```rust
//! use resource_provisioning::resource::CachingStrategy;
//! use resource_provisioning::schema::{
//!     AttributeDefinition, CompositeObjectDefinition, ItemName, ObjectDefinition,
//!     ResourceObjectClassDefinition, StandardMatchingRules,
//! };
//! use resource_provisioning::shadow::{
//!     compute_shadow_delta, ResourceObject, ShadowDeltaContext, ShadowLifecycleState, ShadowRecord,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let mut class = ResourceObjectClassDefinition::new(ItemName::ri("inetOrgPerson"));
//! class.attributes = vec![
//!     AttributeDefinition::new(ItemName::ri("uid")),
//!     AttributeDefinition::new(ItemName::ri("mail")).with_matching_rule("stringIgnoreCase"),
//! ];
//! class.primary_identifiers = vec![ItemName::ri("uid")];
//!
//! let context = ShadowDeltaContext::new(
//!     CachingStrategy::Passive,
//!     CompositeObjectDefinition::new(ObjectDefinition::Class(Arc::new(class))),
//!     Arc::new(StandardMatchingRules::new()),
//! );
//! let shadow = ShadowRecord::new("shadow-1", "resource-1", ItemName::ri("inetOrgPerson"))
//!     .with_name("jdoe")
//!     .with_attribute(ItemName::ri("uid"), vec![json!("jdoe")])
//!     .with_attribute(ItemName::ri("mail"), vec![json!("jdoe@example.com")]);
//! let observed = ResourceObject::new(ItemName::ri("inetOrgPerson"))
//!     .with_attribute(ItemName::ri("uid"), vec![json!("jdoe")])
//!     .with_attribute(ItemName::ri("mail"), vec![json!("JDoe@Example.com")]);
//!
//! let delta = compute_shadow_delta(&context, &shadow, &observed, None, ShadowLifecycleState::Live)?;
//! assert!(delta.find_attribute(&ItemName::ri("mail")).is_none());
//! # Ok::<(), resource_provisioning::ProvisioningError>(())
//! ```

pub mod computer;
pub mod delta;
pub mod types;

pub use computer::{DEFAULT_LARGE_VALUE_SET_THRESHOLD, ShadowDeltaContext, compute_shadow_delta};
pub use delta::{ActivationProperty, ItemDelta, ItemPath, ResourceObjectDelta, ShadowDelta};
pub use types::{
    ActivationState, AdministrativeStatus, CachingMetadata, LockoutStatus, ObservedAttribute,
    ResourceObject, ShadowLifecycleState, ShadowRecord,
};
