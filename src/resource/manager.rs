//! Resource manager: the entry point of the provisioning core.
//!
//! Reads go through the definition cache and fall back to a repository read
//! followed by completion. Writes made here (availability transitions, deletes)
//! go straight to the repository; version gating in the cache makes sure no
//! stale definition is served afterwards.

use super::cache::{CacheTicket, ResourceDefinitionCache};
use super::capabilities::{CapabilityConfig, CapabilityType};
use super::completion::ResourceCompletionOperation;
use super::definition::{
    AvailabilityStatus, OperationalStateChange, ResourceDefinition, ResourceModification,
};
use crate::config::ProvisioningConfig;
use crate::connector::{ConnectorFramework, ConnectorReference, ScriptRequest, SuggestedProperty};
use crate::context::{Clock, OperationContext, ReadOptions, SystemClock};
use crate::error::{BuildError, BuildResult, ErrorKind, ProvisioningError, ProvisioningResult};
use crate::repository::{Repository, ResourceQuery};
use crate::schema::{
    ItemName, MatchingRuleRegistry, ResourceObjectTypeDefinition, StandardMatchingRules,
    TypeIdentification,
};
use crate::shadow::ShadowDeltaContext;
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Cache-backed access to completed resource definitions.
///
/// # Type Parameters
///
/// * `R` - Repository holding the raw definitions
/// * `C` - Connector framework used to reach the resources
///
/// # Examples
///
/// ```rust,no_run
/// use resource_provisioning::context::{OperationContext, ReadOptions};
/// use resource_provisioning::repository::InMemoryRepository;
/// use resource_provisioning::resource::ResourceManager;
/// # use resource_provisioning::connector::ConnectorFramework;
///
/// # async fn example<C: ConnectorFramework>(connectors: C) -> Result<(), Box<dyn std::error::Error>> {
/// let manager = ResourceManager::builder()
///     .with_repository(InMemoryRepository::new())
///     .with_connector_framework(connectors)
///     .build()?;
///
/// let context = OperationContext::with_generated_id();
/// let resource = manager
///     .get_resource("resource-oid", ReadOptions::new().with_readonly(true), &context)
///     .await?;
/// println!("{} is {:?}", resource.name, resource.completion_status);
/// # Ok(())
/// # }
/// ```
pub struct ResourceManager<R, C> {
    repository: Arc<R>,
    connectors: Arc<C>,
    cache: ResourceDefinitionCache,
    clock: Arc<dyn Clock>,
    matching_rules: Arc<dyn MatchingRuleRegistry>,
    config: ProvisioningConfig,
}

impl<R: Repository, C: ConnectorFramework> ResourceManager<R, C> {
    pub fn builder() -> ResourceManagerBuilder<R, C> {
        ResourceManagerBuilder::new()
    }

    /// Completed definition of a resource.
    ///
    /// Served from the cache when neither the resource nor any of its
    /// templates changed since it was cached; otherwise read from the
    /// repository and completed.
    pub async fn get_resource(
        &self,
        oid: &str,
        options: ReadOptions,
        context: &OperationContext,
    ) -> ProvisioningResult<Arc<ResourceDefinition>> {
        debug!("Getting resource {} (request: '{}')", oid, context.request_id);
        let ticket = self.cache.ticket().await;
        if self.config.cache_enabled {
            if let Some(cached) = self
                .cache
                .get_if_latest(self.repository.as_ref(), oid, options.readonly, context)
                .await?
            {
                return Ok(cached);
            }
        }
        let raw = self.repository.get_object(oid).await?;
        self.complete(raw, options, context, ticket).await
    }

    /// Complete a definition read from the repository.
    ///
    /// Only a fully successful completion is cached. A completion that failed
    /// because the resource could not be reached marks the resource DOWN
    /// before the error is returned.
    pub async fn complete_resource(
        &self,
        raw: ResourceDefinition,
        options: ReadOptions,
        context: &OperationContext,
    ) -> ProvisioningResult<Arc<ResourceDefinition>> {
        let ticket = self.cache.ticket().await;
        self.complete(raw, options, context, ticket).await
    }

    async fn complete(
        &self,
        raw: ResourceDefinition,
        options: ReadOptions,
        context: &OperationContext,
        ticket: CacheTicket,
    ) -> ProvisioningResult<Arc<ResourceDefinition>> {
        if self.config.cache_enabled {
            if let Some(cached) = self
                .cache
                .get_if_latest(self.repository.as_ref(), &raw.oid, options.readonly, context)
                .await?
                .filter(|cached| cached.version == raw.version)
            {
                return Ok(cached);
            }
        }

        let outcome = ResourceCompletionOperation::new(
            self.repository.as_ref(),
            self.connectors.as_ref(),
            options,
            context,
        )
        .execute(&raw)
        .await;
        let cacheable = outcome.is_cacheable();

        let definition = match outcome.into_result() {
            Ok(definition) => Arc::new(definition),
            Err(error) => {
                if error.kind() == ErrorKind::Communication && !options.no_fetch {
                    let previous = raw.availability_status();
                    let reason = error.to_string();
                    if let Err(e) = self
                        .record_availability(
                            &raw.oid,
                            previous,
                            AvailabilityStatus::Down,
                            Some(&reason),
                            context,
                        )
                        .await
                    {
                        warn!(
                            "Could not mark resource {} as DOWN: {} (request: '{}')",
                            raw.oid, e, context.request_id
                        );
                    }
                }
                return Err(error);
            }
        };

        if cacheable && self.config.cache_enabled {
            self.cache.put_since(Arc::clone(&definition), ticket).await;
            if !options.readonly {
                return Ok(Arc::new((*definition).clone()));
            }
        }
        Ok(definition)
    }

    /// Delete a resource. The cached definition (and any inheriting ones) go first.
    pub async fn delete_resource(
        &self,
        oid: &str,
        context: &OperationContext,
    ) -> ProvisioningResult<()> {
        info!("Deleting resource {} (request: '{}')", oid, context.request_id);
        self.cache.invalidate_single(oid).await;
        self.repository.delete_object(oid).await?;
        Ok(())
    }

    /// Record a new availability status.
    ///
    /// With `skip_fetch` the change is recorded unconditionally; this is what
    /// callers use when the resource itself may be unreachable. Otherwise the
    /// stored status is read first and nothing is written when it already
    /// matches. Returns whether a change was recorded.
    pub async fn modify_resource_availability_status(
        &self,
        oid: &str,
        status: AvailabilityStatus,
        reason: Option<&str>,
        skip_fetch: bool,
        context: &OperationContext,
    ) -> ProvisioningResult<bool> {
        let previous = if skip_fetch {
            self.cache
                .peek(oid)
                .await
                .and_then(|cached| cached.availability_status())
        } else {
            let stored = self.repository.get_object(oid).await?;
            let previous = stored.availability_status();
            if previous == Some(status) {
                debug!(
                    "Resource {} already {}, not recording (request: '{}')",
                    oid, status, context.request_id
                );
                return Ok(false);
            }
            previous
        };
        self.record_availability(oid, previous, status, reason, context)
            .await?;
        Ok(true)
    }

    async fn record_availability(
        &self,
        oid: &str,
        previous: Option<AvailabilityStatus>,
        status: AvailabilityStatus,
        reason: Option<&str>,
        context: &OperationContext,
    ) -> ProvisioningResult<()> {
        info!(
            "Availability of resource {} changed from {} to {}, reason: {} (request: '{}')",
            oid,
            previous.map_or_else(|| "unknown".to_string(), |s| s.to_string()),
            status,
            reason.unwrap_or("not given"),
            context.request_id
        );
        let change = OperationalStateChange {
            status,
            timestamp: self.clock.now(),
            reason: reason.map(str::to_string),
            task_id: context.task_id.clone(),
        };
        self.repository
            .modify_object(
                oid,
                vec![ResourceModification::RecordAvailability {
                    change,
                    history_limit: self.config.operational_state_history_size,
                }],
            )
            .await?;
        Ok(())
    }

    /// Test the connection to a stored resource and record the result.
    ///
    /// Success marks the resource UP. Failure marks it DOWN without a
    /// consistency read and returns the connector's error. The cache is not
    /// touched.
    pub async fn test_connection(
        &self,
        oid: &str,
        context: &OperationContext,
    ) -> ProvisioningResult<()> {
        info!(
            "Testing connection of resource {} (request: '{}')",
            oid, context.request_id
        );
        let raw = self.repository.get_object(oid).await?;
        let merged = self.merged_without_fetch(&raw, context).await?;
        let (connector, settings) = connector_of(&merged)?;

        match self.connectors.test_connection(connector, settings).await {
            Ok(()) => {
                self.modify_resource_availability_status(
                    oid,
                    AvailabilityStatus::Up,
                    Some("connection test succeeded"),
                    false,
                    context,
                )
                .await?;
                Ok(())
            }
            Err(e) => {
                let error = ProvisioningError::from(e);
                warn!(
                    "Connection test of resource {} failed: {} (request: '{}')",
                    oid, error, context.request_id
                );
                let reason = error.to_string();
                if let Err(e) = self
                    .modify_resource_availability_status(
                        oid,
                        AvailabilityStatus::Down,
                        Some(&reason),
                        true,
                        context,
                    )
                    .await
                {
                    warn!(
                        "Could not mark resource {} as DOWN: {} (request: '{}')",
                        oid, e, context.request_id
                    );
                }
                Err(error)
            }
        }
    }

    /// Test a configuration that may not be stored (or complete) yet.
    pub async fn test_partial_configuration(
        &self,
        resource: &ResourceDefinition,
        context: &OperationContext,
    ) -> ProvisioningResult<()> {
        debug!(
            "Testing partial configuration of resource {} (request: '{}')",
            resource.oid, context.request_id
        );
        let merged = self.merged_without_fetch(resource, context).await?;
        let (connector, settings) = connector_of(&merged)?;
        self.connectors
            .test_partial_configuration(connector, settings)
            .await?;
        Ok(())
    }

    /// Configuration values suggested by the connector. Nothing is cached.
    pub async fn discover_configuration(
        &self,
        resource: &ResourceDefinition,
        context: &OperationContext,
    ) -> ProvisioningResult<Vec<SuggestedProperty>> {
        debug!(
            "Discovering configuration of resource {} (request: '{}')",
            resource.oid, context.request_id
        );
        let merged = self.merged_without_fetch(resource, context).await?;
        let (connector, settings) = connector_of(&merged)?;
        let suggestions = self
            .connectors
            .discover_configuration(connector, settings)
            .await?;
        Ok(suggestions)
    }

    /// Run a script on the resource. Requires the `script` capability.
    pub async fn execute_script(
        &self,
        oid: &str,
        script: &ScriptRequest,
        context: &OperationContext,
    ) -> ProvisioningResult<Value> {
        let resource = self
            .get_resource(oid, ReadOptions::new().with_readonly(true), context)
            .await?;
        if self
            .get_capability(&resource, None, CapabilityType::Script)
            .is_none()
        {
            return Err(ProvisioningError::misconfiguration(format!(
                "Resource {} does not support script execution",
                oid
            )));
        }
        info!(
            "Executing {} script on resource {} (request: '{}')",
            script.language.as_deref().unwrap_or("default"),
            oid,
            context.request_id
        );
        let (connector, settings) = connector_of(&resource)?;
        let result = self
            .connectors
            .execute_script(connector, settings, script)
            .await?;
        Ok(result)
    }

    /// Effective capability of a resource, or of one of its object types.
    ///
    /// Returns `None` when the capability is absent or disabled.
    pub fn get_capability(
        &self,
        resource: &ResourceDefinition,
        object_type: Option<&ResourceObjectTypeDefinition>,
        capability: CapabilityType,
    ) -> Option<CapabilityConfig> {
        object_type
            .and_then(|t| t.capabilities.as_ref())
            .unwrap_or(&resource.capabilities)
            .get(capability)
            .cloned()
    }

    /// Completed definitions of matching resources.
    ///
    /// A resource whose completion fails is returned in its partial form
    /// rather than failing the whole search.
    pub async fn search_resources(
        &self,
        query: &ResourceQuery,
        options: ReadOptions,
        context: &OperationContext,
    ) -> ProvisioningResult<Vec<Arc<ResourceDefinition>>> {
        let found = self.repository.search_objects(query).await?;
        debug!(
            "Search matched {} resource(s) (request: '{}')",
            found.len(),
            context.request_id
        );
        let mut results = Vec::with_capacity(found.len());
        for raw in found {
            match self.complete_resource(raw, options, context).await {
                Ok(definition) => results.push(definition),
                Err(ProvisioningError::CompletionFailed {
                    oid,
                    source,
                    partial: Some(partial),
                }) => {
                    warn!(
                        "Returning partial definition of resource {}: {} (request: '{}')",
                        oid, source, context.request_id
                    );
                    results.push(Arc::new(*partial));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }

    pub async fn count_resources(&self, query: &ResourceQuery) -> ProvisioningResult<usize> {
        Ok(self.repository.count_objects(query).await?)
    }

    /// Context for computing shadow deltas of objects of a completed resource.
    ///
    /// The caching strategy comes from the object type, then the resource,
    /// then the configured default.
    pub fn shadow_delta_context(
        &self,
        resource: &ResourceDefinition,
        object_class: &ItemName,
        type_identification: Option<&TypeIdentification>,
        auxiliary_object_classes: &BTreeSet<ItemName>,
    ) -> ProvisioningResult<ShadowDeltaContext> {
        let schema = resource.schema.as_ref().ok_or_else(|| {
            ProvisioningError::schema_violation(format!(
                "Resource {} has no schema; it must be completed first",
                resource.oid
            ))
        })?;
        let definition = schema.composite_definition(
            object_class,
            type_identification,
            auxiliary_object_classes,
        )?;
        let strategy = definition
            .structural
            .caching_policy()
            .and_then(|policy| policy.caching_strategy.clone())
            .or_else(|| resource.configuration.caching_strategy().cloned())
            .unwrap_or_else(|| self.config.default_caching_strategy.clone());

        Ok(
            ShadowDeltaContext::new(strategy, definition, Arc::clone(&self.matching_rules))
                .with_clock(Arc::clone(&self.clock))
                .with_large_value_set_threshold(self.config.large_value_set_threshold),
        )
    }

    pub fn cache(&self) -> &ResourceDefinitionCache {
        &self.cache
    }

    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Template chain merged into the definition, without contacting the connector.
    async fn merged_without_fetch(
        &self,
        resource: &ResourceDefinition,
        context: &OperationContext,
    ) -> ProvisioningResult<ResourceDefinition> {
        ResourceCompletionOperation::new(
            self.repository.as_ref(),
            self.connectors.as_ref(),
            ReadOptions::no_fetch(),
            context,
        )
        .execute(resource)
        .await
        .into_result()
    }
}

fn connector_of(
    resource: &ResourceDefinition,
) -> ProvisioningResult<(&ConnectorReference, &Map<String, Value>)> {
    let connector = resource.configuration.connector_ref.as_ref().ok_or_else(|| {
        ProvisioningError::misconfiguration(format!(
            "Resource {} has no connector reference",
            resource.oid
        ))
    })?;
    Ok((connector, &resource.configuration.connector_configuration))
}

/// Builder for [`ResourceManager`].
///
/// Repository and connector framework are required; everything else has a
/// default.
pub struct ResourceManagerBuilder<R, C> {
    repository: Option<R>,
    connectors: Option<C>,
    cache: Option<ResourceDefinitionCache>,
    clock: Option<Arc<dyn Clock>>,
    matching_rules: Option<Arc<dyn MatchingRuleRegistry>>,
    config: ProvisioningConfig,
}

impl<R: Repository, C: ConnectorFramework> ResourceManagerBuilder<R, C> {
    pub fn new() -> Self {
        Self {
            repository: None,
            connectors: None,
            cache: None,
            clock: None,
            matching_rules: None,
            config: ProvisioningConfig::default(),
        }
    }

    pub fn with_repository(mut self, repository: R) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_connector_framework(mut self, connectors: C) -> Self {
        self.connectors = Some(connectors);
        self
    }

    /// Share a cache with other managers. By default each manager owns one.
    pub fn with_cache(mut self, cache: ResourceDefinitionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_matching_rules(mut self, matching_rules: Arc<dyn MatchingRuleRegistry>) -> Self {
        self.matching_rules = Some(matching_rules);
        self
    }

    pub fn with_config(mut self, config: ProvisioningConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the manager.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if the repository or connector framework is
    /// missing or the configuration is invalid.
    pub fn build(self) -> BuildResult<ResourceManager<R, C>> {
        let repository = self.repository.ok_or(BuildError::MissingRepository)?;
        let connectors = self
            .connectors
            .ok_or(BuildError::MissingConnectorFramework)?;
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let cache = self
            .cache
            .unwrap_or_else(|| ResourceDefinitionCache::with_clock(Arc::clone(&clock)));
        let matching_rules = self
            .matching_rules
            .unwrap_or_else(|| Arc::new(StandardMatchingRules::new()));

        Ok(ResourceManager {
            repository: Arc::new(repository),
            connectors: Arc::new(connectors),
            cache,
            clock,
            matching_rules,
            config: self.config,
        })
    }
}

impl<R: Repository, C: ConnectorFramework> Default for ResourceManagerBuilder<R, C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use crate::resource::capabilities::CapabilitySet;
    use crate::resource::definition::ResourceConfiguration;
    use crate::connector::{ConnectorResult, NativeAttribute, NativeObjectClass, NativeSchema};
    use crate::schema::{ObjectTypeConfig, ResourceSchema, ShadowKind};
    use serde_json::json;

    struct NoConnectors;

    impl ConnectorFramework for NoConnectors {
        async fn fetch_native_schema(
            &self,
            _: &ConnectorReference,
            _: &Map<String, Value>,
        ) -> ConnectorResult<NativeSchema> {
            Ok(NativeSchema::new(vec![]))
        }

        async fn fetch_native_capabilities(
            &self,
            _: &ConnectorReference,
            _: &Map<String, Value>,
        ) -> ConnectorResult<CapabilitySet> {
            Ok(CapabilitySet::new())
        }

        async fn test_connection(
            &self,
            _: &ConnectorReference,
            _: &Map<String, Value>,
        ) -> ConnectorResult<()> {
            Ok(())
        }

        async fn test_partial_configuration(
            &self,
            _: &ConnectorReference,
            _: &Map<String, Value>,
        ) -> ConnectorResult<()> {
            Ok(())
        }

        async fn discover_configuration(
            &self,
            _: &ConnectorReference,
            _: &Map<String, Value>,
        ) -> ConnectorResult<Vec<SuggestedProperty>> {
            Ok(vec![])
        }

        async fn execute_script(
            &self,
            _: &ConnectorReference,
            _: &Map<String, Value>,
            _: &ScriptRequest,
        ) -> ConnectorResult<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let missing_repo = ResourceManagerBuilder::<InMemoryRepository, NoConnectors>::new()
            .with_connector_framework(NoConnectors)
            .build();
        assert!(matches!(missing_repo, Err(BuildError::MissingRepository)));

        let missing_connectors = ResourceManagerBuilder::<InMemoryRepository, NoConnectors>::new()
            .with_repository(InMemoryRepository::new())
            .build();
        assert!(matches!(
            missing_connectors,
            Err(BuildError::MissingConnectorFramework)
        ));
    }

    #[test]
    fn test_builder_validates_config() {
        let config = ProvisioningConfig {
            large_value_set_threshold: 0,
            ..Default::default()
        };
        let result = ResourceManager::builder()
            .with_repository(InMemoryRepository::new())
            .with_connector_framework(NoConnectors)
            .with_config(config)
            .build();
        assert!(matches!(
            result,
            Err(BuildError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_capability_of_object_type_wins() {
        let manager = ResourceManager::builder()
            .with_repository(InMemoryRepository::new())
            .with_connector_framework(NoConnectors)
            .build()
            .unwrap();
        let mut resource = ResourceDefinition::new("r-1", "R", ResourceConfiguration::default());
        resource.capabilities = CapabilitySet::new()
            .with_enabled(CapabilityType::Script)
            .with_enabled(CapabilityType::Read);

        let mut account = ObjectTypeConfig::new(
            ShadowKind::Account,
            "default",
            ItemName::ri("AccountObjectClass"),
        );
        account.capabilities.insert("script".to_string(), json!(false));
        let native = NativeSchema::new(vec![
            NativeObjectClass::new(ItemName::ri("AccountObjectClass"))
                .with_attribute(NativeAttribute::new(ItemName::icfs("uid")))
                .with_primary_identifier(ItemName::icfs("uid")),
        ]);
        let outcome = ResourceSchema::build(&native, &[account], &resource.capabilities);
        assert!(outcome.errors.is_empty());
        let account_type = outcome
            .schema
            .find_object_type(ShadowKind::Account, "default")
            .unwrap();

        assert!(
            manager
                .get_capability(&resource, Some(account_type.as_ref()), CapabilityType::Script)
                .is_none()
        );
        assert!(
            manager
                .get_capability(&resource, None, CapabilityType::Script)
                .is_some()
        );
        assert!(
            manager
                .get_capability(&resource, Some(account_type.as_ref()), CapabilityType::Read)
                .is_some()
        );
        assert!(
            manager
                .get_capability(&resource, None, CapabilityType::LiveSync)
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_context_requires_schema() {
        let manager = ResourceManager::builder()
            .with_repository(InMemoryRepository::new())
            .with_connector_framework(NoConnectors)
            .build()
            .unwrap();
        let resource = ResourceDefinition::new("r-1", "R", ResourceConfiguration::default());
        let result = manager.shadow_delta_context(
            &resource,
            &ItemName::ri("AccountObjectClass"),
            None,
            &BTreeSet::new(),
        );
        assert_eq!(result.err().map(|e| e.kind()), Some(ErrorKind::SchemaViolation));
    }
}
