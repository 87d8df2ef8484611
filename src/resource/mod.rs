//! Resource definitions and their lifecycle.
//!
//! A resource is stored raw in the repository. Before use it is completed:
//! templates merged in, connector schema and capabilities fetched, and the
//! layered schema built. Completed definitions are kept in a version-gated
//! cache.
//!
//! # Key Components
//!
//! * [`ResourceManager`] - Read/delete/availability entry point
//! * [`ResourceDefinitionCache`] - Version-gated cache of completed definitions
//! * [`ResourceCompletionOperation`] - One completion run
//! * [`CapabilitySet`] - Native capabilities merged with configured overrides

pub mod cache;
pub mod capabilities;
pub mod completion;
pub mod definition;
pub mod manager;

pub use cache::{CacheTicket, ResourceDefinitionCache};
pub use capabilities::{CapabilityConfig, CapabilitySet, CapabilityType};
pub use completion::{CompletionOutcome, OperationResultStatus, ResourceCompletionOperation};
pub use definition::{
    AvailabilityStatus, CachingPolicy, CachingStrategy, CompletionStatus, OperationalState,
    OperationalStateChange, ResourceConfiguration, ResourceDefinition, ResourceModification,
};
pub use manager::{ResourceManager, ResourceManagerBuilder};
