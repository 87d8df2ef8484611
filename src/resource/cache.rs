//! Version-gated cache of completed resource definitions.
//!
//! Entries are keyed by resource OID and tagged with the repository version the
//! definition was completed from, plus the versions of every ancestor consulted.
//! A value is only handed out when the caller's expected version matches.
//!
//! Concurrent completions of the same resource are not serialized. Whichever
//! finishes last wins the slot, except that an entry is never replaced by one
//! completed from an older version. A completion that holds a [`CacheTicket`]
//! taken before an invalidation cannot bring the invalidated entry back.

use super::definition::ResourceDefinition;
use crate::context::{Clock, OperationContext, SystemClock};
use crate::error::ProvisioningResult;
use crate::repository::{Repository, RepositoryError};
use crate::version::ObjectVersion;
use chrono::{DateTime, Utc};
use log::{debug, trace, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Arc<ResourceDefinition>,
    source_version: ObjectVersion,
    ancestor_versions: BTreeMap<String, ObjectVersion>,
    inserted_at: DateTime<Utc>,
}

impl CacheEntry {
    fn hand_out(&self, readonly: bool) -> Arc<ResourceDefinition> {
        if readonly {
            Arc::clone(&self.value)
        } else {
            Arc::new((*self.value).clone())
        }
    }
}

/// Invalidation generation observed when a completion started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CacheTicket(u64);

#[derive(Debug, Default)]
struct Invalidations {
    generation: u64,
    cleared_at: u64,
    by_oid: HashMap<String, u64>,
}

impl Invalidations {
    fn bump(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Whether `oid` or one of its ancestors was invalidated after the ticket was taken.
    fn invalidated_since<'a>(
        &self,
        ticket: CacheTicket,
        mut oids: impl Iterator<Item = &'a String>,
    ) -> bool {
        self.cleared_at > ticket.0
            || oids.any(|oid| self.by_oid.get(oid).is_some_and(|g| *g > ticket.0))
    }
}

/// Thread-safe cache of completed resource definitions.
///
/// Readonly reads share the cached value; other reads get an independent copy.
#[derive(Clone)]
pub struct ResourceDefinitionCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    invalidations: Arc<RwLock<Invalidations>>,
    clock: Arc<dyn Clock>,
}

impl Default for ResourceDefinitionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceDefinitionCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            invalidations: Arc::new(RwLock::new(Invalidations::default())),
            clock,
        }
    }

    /// Cached definition, only if it was completed from `expected_version`.
    pub async fn get(
        &self,
        oid: &str,
        expected_version: ObjectVersion,
        readonly: bool,
    ) -> Option<Arc<ResourceDefinition>> {
        let entries = self.entries.read().await;
        match entries.get(oid) {
            Some(entry) if entry.source_version == expected_version => {
                trace!("Definition cache hit for {} at version {}", oid, expected_version);
                Some(entry.hand_out(readonly))
            }
            Some(entry) => {
                debug!(
                    "Definition cache version mismatch for {}: cached {}, expected {}",
                    oid, entry.source_version, expected_version
                );
                None
            }
            None => {
                trace!("Definition cache miss for {}", oid);
                None
            }
        }
    }

    /// Cached definition, only if neither the resource nor any ancestor changed since.
    ///
    /// Asks the repository for current versions. A stale entry is evicted. A
    /// resource that no longer exists in the repository yields `None`.
    pub async fn get_if_latest<R: Repository>(
        &self,
        repository: &R,
        oid: &str,
        readonly: bool,
        context: &OperationContext,
    ) -> ProvisioningResult<Option<Arc<ResourceDefinition>>> {
        let entry = {
            let entries = self.entries.read().await;
            match entries.get(oid) {
                Some(entry) => entry.clone(),
                None => {
                    trace!("Definition cache miss for {} (request: '{}')", oid, context.request_id);
                    return Ok(None);
                }
            }
        };

        let mut fresh = match current_version(repository, oid).await? {
            Some(version) => version == entry.source_version,
            None => false,
        };
        if fresh {
            for (ancestor, cached_version) in &entry.ancestor_versions {
                if current_version(repository, ancestor).await? != Some(*cached_version) {
                    debug!(
                        "Ancestor {} of {} changed since completion (request: '{}')",
                        ancestor, oid, context.request_id
                    );
                    fresh = false;
                    break;
                }
            }
        }

        if fresh {
            trace!("Definition cache hit for {} (request: '{}')", oid, context.request_id);
            Ok(Some(entry.hand_out(readonly)))
        } else {
            self.evict_if_version(oid, entry.source_version).await;
            debug!("Evicted stale definition of {} (request: '{}')", oid, context.request_id);
            Ok(None)
        }
    }

    /// Take a ticket before reading a definition that will later be cached.
    pub async fn ticket(&self) -> CacheTicket {
        CacheTicket(self.invalidations.read().await.generation)
    }

    /// Store a completed definition.
    ///
    /// Returns whether the cache slot was written. Definitions that are not
    /// fully completed are refused, as are definitions older than the cached one.
    pub async fn put(&self, definition: Arc<ResourceDefinition>) -> bool {
        self.store(definition, None).await
    }

    /// Like [`put`](Self::put), but also refused when the resource or any of
    /// its ancestors was invalidated after `ticket` was taken.
    pub async fn put_since(&self, definition: Arc<ResourceDefinition>, ticket: CacheTicket) -> bool {
        self.store(definition, Some(ticket)).await
    }

    async fn store(&self, definition: Arc<ResourceDefinition>, ticket: Option<CacheTicket>) -> bool {
        if !definition.is_completed() {
            warn!(
                "Refusing to cache resource {} with completion status {:?}",
                definition.oid, definition.completion_status
            );
            return false;
        }

        let mut entries = self.entries.write().await;
        if let Some(ticket) = ticket {
            let invalidations = self.invalidations.read().await;
            let oids = std::iter::once(&definition.oid).chain(definition.ancestor_versions.keys());
            if invalidations.invalidated_since(ticket, oids) {
                debug!(
                    "Not caching {} at version {}: invalidated while it was being completed",
                    definition.oid, definition.version
                );
                return false;
            }
        }
        if let Some(existing) = entries.get(&definition.oid) {
            if existing.source_version > definition.version {
                debug!(
                    "Not caching {} at version {}: version {} already cached",
                    definition.oid, definition.version, existing.source_version
                );
                return false;
            }
        }
        debug!(
            "Caching definition of {} at version {} ({} ancestors)",
            definition.oid,
            definition.version,
            definition.ancestor_versions.len()
        );
        entries.insert(
            definition.oid.clone(),
            CacheEntry {
                source_version: definition.version,
                ancestor_versions: definition.ancestor_versions.clone(),
                inserted_at: self.clock.now(),
                value: definition,
            },
        );
        true
    }

    /// Remove a definition and every definition that inherited from it.
    pub async fn invalidate_single(&self, oid: &str) {
        let mut entries = self.entries.write().await;
        {
            let mut invalidations = self.invalidations.write().await;
            let generation = invalidations.bump();
            invalidations.by_oid.insert(oid.to_string(), generation);
        }
        let removed = entries.remove(oid).is_some();
        let before = entries.len();
        entries.retain(|_, entry| !entry.ancestor_versions.contains_key(oid));
        let cascaded = before - entries.len();
        if removed || cascaded > 0 {
            debug!(
                "Invalidated definition of {} ({} dependent definition(s) cascaded)",
                oid, cascaded
            );
        }
    }

    pub async fn invalidate_all(&self) {
        let mut entries = self.entries.write().await;
        {
            let mut invalidations = self.invalidations.write().await;
            invalidations.cleared_at = invalidations.bump();
            invalidations.by_oid.clear();
        }
        debug!("Invalidating all {} cached definitions", entries.len());
        entries.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn contains(&self, oid: &str) -> bool {
        self.entries.read().await.contains_key(oid)
    }

    /// Version the cached definition was completed from.
    pub async fn cached_version(&self, oid: &str) -> Option<ObjectVersion> {
        self.entries.read().await.get(oid).map(|e| e.source_version)
    }

    /// When the cached definition was stored.
    pub async fn inserted_at(&self, oid: &str) -> Option<DateTime<Utc>> {
        self.entries.read().await.get(oid).map(|e| e.inserted_at)
    }

    /// Cached value without version check, for availability logging.
    pub(crate) async fn peek(&self, oid: &str) -> Option<Arc<ResourceDefinition>> {
        self.entries
            .read()
            .await
            .get(oid)
            .map(|e| Arc::clone(&e.value))
    }

    async fn evict_if_version(&self, oid: &str, version: ObjectVersion) {
        let mut entries = self.entries.write().await;
        if entries.get(oid).is_some_and(|e| e.source_version == version) {
            entries.remove(oid);
        }
    }
}

async fn current_version<R: Repository>(
    repository: &R,
    oid: &str,
) -> ProvisioningResult<Option<ObjectVersion>> {
    match repository.get_version(oid).await {
        Ok(version) => Ok(Some(version)),
        Err(RepositoryError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FixedClock;
    use crate::repository::InMemoryRepository;
    use crate::resource::definition::{CompletionStatus, ResourceConfiguration, ResourceModification};

    fn completed(oid: &str, version: ObjectVersion) -> Arc<ResourceDefinition> {
        let mut definition = ResourceDefinition::new(oid, oid, ResourceConfiguration::default());
        definition.version = version;
        definition.completion_status = CompletionStatus::Completed;
        Arc::new(definition)
    }

    fn v(n: u64) -> ObjectVersion {
        ObjectVersion::from_sequence(n)
    }

    #[tokio::test]
    async fn test_version_gating() {
        let cache = ResourceDefinitionCache::new();
        assert!(cache.put(completed("r-1", v(1))).await);

        assert!(cache.get("r-1", v(1), true).await.is_some());
        assert!(cache.get("r-1", v(2), true).await.is_none());
        assert!(cache.get("r-2", v(1), true).await.is_none());
    }

    #[tokio::test]
    async fn test_put_then_invalidate() {
        let cache = ResourceDefinitionCache::new();
        cache.put(completed("r-1", v(3))).await;
        cache.invalidate_single("r-1").await;
        assert!(cache.get("r-1", v(3), true).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_readonly_shares_and_writable_copies() {
        let cache = ResourceDefinitionCache::new();
        let original = completed("r-1", v(1));
        cache.put(Arc::clone(&original)).await;

        let shared = cache.get("r-1", v(1), true).await.unwrap();
        assert!(Arc::ptr_eq(&shared, &original));

        let mut copy = cache.get("r-1", v(1), false).await.unwrap();
        assert!(!Arc::ptr_eq(&copy, &original));
        Arc::make_mut(&mut copy).name = "mutated".to_string();
        assert_eq!(cache.get("r-1", v(1), true).await.unwrap().name, "r-1");
    }

    #[tokio::test]
    async fn test_refuses_incomplete_and_older() {
        let cache = ResourceDefinitionCache::new();
        let mut partial = (*completed("r-1", v(1))).clone();
        partial.completion_status = CompletionStatus::CompletedWithErrors;
        assert!(!cache.put(Arc::new(partial)).await);

        assert!(cache.put(completed("r-1", v(5))).await);
        assert!(!cache.put(completed("r-1", v(4))).await);
        assert_eq!(cache.cached_version("r-1").await, Some(v(5)));
        assert!(cache.put(completed("r-1", v(5))).await);
    }

    #[tokio::test]
    async fn test_completion_started_before_invalidation_is_not_cached() {
        let cache = ResourceDefinitionCache::new();
        let ticket = cache.ticket().await;
        cache.invalidate_single("r-1").await;
        assert!(!cache.put_since(completed("r-1", v(1)), ticket).await);
        assert!(!cache.contains("r-1").await);

        let mut child = (*completed("child", v(1))).clone();
        child.ancestor_versions.insert("r-1".to_string(), v(1));
        assert!(!cache.put_since(Arc::new(child), ticket).await);

        let fresh = cache.ticket().await;
        assert!(cache.put_since(completed("r-1", v(1)), fresh).await);
        assert!(cache.put_since(completed("other", v(1)), ticket).await);

        let before_clear = cache.ticket().await;
        cache.invalidate_all().await;
        assert!(!cache.put_since(completed("other", v(2)), before_clear).await);
    }

    #[tokio::test]
    async fn test_invalidation_cascades_to_descendants() {
        let cache = ResourceDefinitionCache::new();
        let mut child = (*completed("child", v(1))).clone();
        child.ancestor_versions.insert("template".to_string(), v(7));
        cache.put(Arc::new(child)).await;
        cache.put(completed("template", v(7))).await;
        cache.put(completed("unrelated", v(1))).await;

        cache.invalidate_single("template").await;
        assert!(!cache.contains("template").await);
        assert!(!cache.contains("child").await);
        assert!(cache.contains("unrelated").await);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_if_latest_checks_repository() {
        let repository = InMemoryRepository::new();
        let context = OperationContext::new("test");
        let template = ResourceDefinition::new("template", "T", ResourceConfiguration::default());
        let child = ResourceDefinition::new("child", "C", ResourceConfiguration::default());
        repository.add_object(template).await.unwrap();
        repository.add_object(child).await.unwrap();

        let cache = ResourceDefinitionCache::with_clock(Arc::new(FixedClock::new(Utc::now())));
        let mut definition = (*completed("child", ObjectVersion::initial())).clone();
        definition
            .ancestor_versions
            .insert("template".to_string(), ObjectVersion::initial());
        cache.put(Arc::new(definition)).await;

        let hit = cache
            .get_if_latest(&repository, "child", true, &context)
            .await
            .unwrap();
        assert!(hit.is_some());

        repository
            .modify_object("template", vec![ResourceModification::Rename("T2".into())])
            .await
            .unwrap();
        let stale = cache
            .get_if_latest(&repository, "child", true, &context)
            .await
            .unwrap();
        assert!(stale.is_none());
        assert!(!cache.contains("child").await);
    }

    #[tokio::test]
    async fn test_get_if_latest_after_repository_delete() {
        let repository = InMemoryRepository::new();
        let context = OperationContext::new("test");
        let cache = ResourceDefinitionCache::new();
        cache.put(completed("gone", ObjectVersion::initial())).await;

        let result = cache
            .get_if_latest(&repository, "gone", true, &context)
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(cache.is_empty().await);
    }
}
