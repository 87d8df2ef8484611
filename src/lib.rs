//! Provisioning core for identity governance.
//!
//! Reconciles the repository's view of external managed systems (resources)
//! and of the accounts discovered on them (shadows) with what connectors
//! report.
//!
//! # Core Components
//!
//! - [`ResourceManager`] - Cache-or-complete access to resource definitions
//! - [`ResourceDefinitionCache`] - Version-gated cache shared across callers
//! - [`compute_shadow_delta`] - Minimal delta between a shadow and an observed object
//! - [`ResourceSchema`] - Object classes and object types of a completed resource
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use resource_provisioning::{OperationContext, ReadOptions, ResourceManager};
//! use resource_provisioning::repository::InMemoryRepository;
//! # use resource_provisioning::connector::ConnectorFramework;
//!
//! # async fn example<C: ConnectorFramework>(connectors: C) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ResourceManager::builder()
//!     .with_repository(InMemoryRepository::new())
//!     .with_connector_framework(connectors)
//!     .build()?;
//!
//! let context = OperationContext::with_generated_id();
//! let resource = manager
//!     .get_resource("resource-oid", ReadOptions::new(), &context)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connector;
pub mod context;
pub mod error;
pub mod repository;
pub mod resource;
pub mod schema;
pub mod shadow;
pub mod version;

// Re-export commonly used types for convenience
pub use config::ProvisioningConfig;
pub use connector::{ConnectorError, ConnectorFramework, ConnectorReference};
pub use context::{Clock, OperationContext, ReadOptions, SystemClock};
pub use error::{BuildError, ErrorKind, ProvisioningError, ProvisioningResult};
pub use repository::{Repository, RepositoryError, ResourceQuery};
pub use resource::{
    AvailabilityStatus, CachingStrategy, CapabilityType, ResourceDefinition,
    ResourceDefinitionCache, ResourceManager, ResourceManagerBuilder,
};
pub use schema::{
    ItemName, MatchingRuleRegistry, ProtectedObjectPattern, ResourceSchema, ShadowKind,
    StandardMatchingRules,
};
pub use shadow::{
    ResourceObject, ShadowDelta, ShadowDeltaContext, ShadowLifecycleState, ShadowRecord,
    compute_shadow_delta,
};
pub use version::ObjectVersion;
