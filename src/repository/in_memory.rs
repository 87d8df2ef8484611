//! In-memory repository.
//!
//! Thread-safe implementation of [`Repository`] backed by a `HashMap` behind a
//! tokio `RwLock`. Intended for tests, demos and benchmarks.

use super::{Repository, RepositoryError, RepositoryResult, ResourceQuery, RESOURCE_TYPE};
use crate::resource::{ResourceDefinition, ResourceModification};
use crate::version::ObjectVersion;
use log::trace;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Thread-safe in-memory repository.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    objects: Arc<RwLock<HashMap<String, ResourceDefinition>>>,
}

/// Counters for debugging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InMemoryRepositoryStats {
    pub object_count: usize,
    pub template_count: usize,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stats(&self) -> InMemoryRepositoryStats {
        let objects = self.objects.read().await;
        InMemoryRepositoryStats {
            object_count: objects.len(),
            template_count: objects.values().filter(|d| d.is_template()).count(),
        }
    }

    /// Remove everything.
    pub async fn clear(&self) {
        self.objects.write().await.clear();
    }

    fn not_found(oid: &str) -> RepositoryError {
        RepositoryError::resource_not_found(oid)
    }
}

impl Repository for InMemoryRepository {
    async fn get_object(&self, oid: &str) -> RepositoryResult<ResourceDefinition> {
        let objects = self.objects.read().await;
        objects.get(oid).cloned().ok_or_else(|| Self::not_found(oid))
    }

    async fn get_version(&self, oid: &str) -> RepositoryResult<ObjectVersion> {
        let objects = self.objects.read().await;
        objects
            .get(oid)
            .map(|d| d.version)
            .ok_or_else(|| Self::not_found(oid))
    }

    async fn add_object(&self, mut definition: ResourceDefinition) -> RepositoryResult<String> {
        if definition.oid.is_empty() {
            definition.oid = Uuid::new_v4().to_string();
        }
        let mut objects = self.objects.write().await;
        if objects.contains_key(&definition.oid) {
            return Err(RepositoryError::AlreadyExists {
                object_type: RESOURCE_TYPE.to_string(),
                oid: definition.oid,
            });
        }
        definition.version = ObjectVersion::initial();
        let oid = definition.oid.clone();
        trace!("Stored resource {} at version {}", oid, definition.version);
        objects.insert(oid.clone(), definition);
        Ok(oid)
    }

    async fn modify_object(
        &self,
        oid: &str,
        modifications: Vec<ResourceModification>,
    ) -> RepositoryResult<ObjectVersion> {
        let mut objects = self.objects.write().await;
        let stored = objects.get_mut(oid).ok_or_else(|| Self::not_found(oid))?;
        for modification in &modifications {
            modification.apply(stored);
        }
        stored.version = stored.version.next();
        trace!(
            "Applied {} modification(s) to resource {}, now at version {}",
            modifications.len(),
            oid,
            stored.version
        );
        Ok(stored.version)
    }

    async fn delete_object(&self, oid: &str) -> RepositoryResult<()> {
        let mut objects = self.objects.write().await;
        objects
            .remove(oid)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(oid))
    }

    async fn search_objects(
        &self,
        query: &ResourceQuery,
    ) -> RepositoryResult<Vec<ResourceDefinition>> {
        let objects = self.objects.read().await;
        let mut matching: Vec<ResourceDefinition> = objects
            .values()
            .filter(|d| query.matches(d))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.oid.cmp(&b.oid));
        let page = matching
            .into_iter()
            .skip(query.offset)
            .take(query.max_size.unwrap_or(usize::MAX))
            .collect();
        Ok(page)
    }

    async fn count_objects(&self, query: &ResourceQuery) -> RepositoryResult<usize> {
        let objects = self.objects.read().await;
        Ok(objects.values().filter(|d| query.matches(d)).count())
    }
}
