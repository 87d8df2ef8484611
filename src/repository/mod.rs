//! Repository collaborator.
//!
//! The repository persists raw resource definitions and hands out a version
//! with every read. It knows nothing about completion, capabilities or
//! schemas. Every successful write bumps the stored version.
//!
//! # Example Usage
//!
//! ```rust
//! use resource_provisioning::repository::{InMemoryRepository, Repository};
//! use resource_provisioning::resource::{ResourceConfiguration, ResourceDefinition};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let repository = InMemoryRepository::new();
//! let oid = repository
//!     .add_object(ResourceDefinition::new("r-1", "HR database", ResourceConfiguration::default()))
//!     .await?;
//!
//! let stored = repository.get_object(&oid).await?;
//! assert_eq!(stored.version, repository.get_version(&oid).await?);
//! # Ok(())
//! # }
//! ```

pub mod in_memory;

pub use in_memory::InMemoryRepository;

use crate::error::ErrorKind;
use crate::resource::{ResourceDefinition, ResourceModification};
use crate::version::ObjectVersion;
use std::future::Future;
use thiserror::Error;

/// Object type name used in not-found errors.
pub const RESOURCE_TYPE: &str = "Resource";

/// Errors raised by the repository.
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    #[error("{object_type} with OID {oid} not found")]
    NotFound { object_type: String, oid: String },

    #[error("{object_type} with OID {oid} already exists")]
    AlreadyExists { object_type: String, oid: String },

    /// Backend temporarily unavailable.
    #[error("repository unavailable: {message}")]
    Unavailable { message: String },

    #[error("repository failure: {message}")]
    Backend { message: String },
}

impl RepositoryError {
    pub fn resource_not_found(oid: impl Into<String>) -> Self {
        Self::NotFound {
            object_type: RESOURCE_TYPE.to_string(),
            oid: oid.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RepositoryError::NotFound { .. } => ErrorKind::ObjectNotFound,
            RepositoryError::Unavailable { .. } => ErrorKind::Communication,
            RepositoryError::AlreadyExists { .. } | RepositoryError::Backend { .. } => {
                ErrorKind::Internal
            }
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Search criteria for resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceQuery {
    /// Case-insensitive substring of the resource name.
    pub name_contains: Option<String>,
    /// Restrict to templates (`Some(true)`) or to concrete resources (`Some(false)`).
    pub template: Option<bool>,
    pub offset: usize,
    pub max_size: Option<usize>,
}

impl ResourceQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name_containing(mut self, fragment: impl Into<String>) -> Self {
        self.name_contains = Some(fragment.into());
        self
    }

    pub fn templates_only(mut self) -> Self {
        self.template = Some(true);
        self
    }

    pub fn without_templates(mut self) -> Self {
        self.template = Some(false);
        self
    }

    pub fn with_paging(mut self, offset: usize, max_size: usize) -> Self {
        self.offset = offset;
        self.max_size = Some(max_size);
        self
    }

    /// Filter part of the query (paging excluded).
    pub fn matches(&self, definition: &ResourceDefinition) -> bool {
        let name_ok = self.name_contains.as_ref().is_none_or(|fragment| {
            definition
                .name
                .to_lowercase()
                .contains(&fragment.to_lowercase())
        });
        let template_ok = self
            .template
            .is_none_or(|template| definition.is_template() == template);
        name_ok && template_ok
    }
}

/// Persistence of raw resource definitions.
///
/// Reads return the stored definition with its current version set on
/// [`ResourceDefinition::version`].
pub trait Repository: Send + Sync {
    /// Read a resource.
    fn get_object(
        &self,
        oid: &str,
    ) -> impl Future<Output = RepositoryResult<ResourceDefinition>> + Send;

    /// Current version of a resource without reading it.
    fn get_version(&self, oid: &str)
    -> impl Future<Output = RepositoryResult<ObjectVersion>> + Send;

    /// Store a new resource. An empty OID is replaced with a generated one.
    fn add_object(
        &self,
        definition: ResourceDefinition,
    ) -> impl Future<Output = RepositoryResult<String>> + Send;

    /// Apply modifications atomically and return the new version.
    fn modify_object(
        &self,
        oid: &str,
        modifications: Vec<ResourceModification>,
    ) -> impl Future<Output = RepositoryResult<ObjectVersion>> + Send;

    fn delete_object(&self, oid: &str) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// Matching resources ordered by OID.
    fn search_objects(
        &self,
        query: &ResourceQuery,
    ) -> impl Future<Output = RepositoryResult<Vec<ResourceDefinition>>> + Send;

    /// Number of matching resources, ignoring paging.
    fn count_objects(
        &self,
        query: &ResourceQuery,
    ) -> impl Future<Output = RepositoryResult<usize>> + Send;
}
