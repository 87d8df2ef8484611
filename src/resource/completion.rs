//! Resource completion.
//!
//! Turns a raw repository definition into a usable one: walks the template
//! chain and merges inherited configuration, obtains the connector schema and
//! capabilities, applies capability overrides and builds the layered resource
//! schema. The overall [`OperationResultStatus`] is the worst status of any step
//! and decides whether the result may be cached.

use super::capabilities::CapabilitySet;
use super::definition::{CompletionStatus, ResourceConfiguration, ResourceDefinition};
use crate::connector::{ConnectorFramework, NativeSchema};
use crate::context::{OperationContext, ReadOptions};
use crate::error::{ProvisioningError, ProvisioningResult};
use crate::repository::Repository;
use crate::schema::ResourceSchema;
use crate::version::ObjectVersion;
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Outcome of one processing step, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationResultStatus {
    NotApplicable,
    Success,
    Warning,
    PartialError,
    FatalError,
}

impl OperationResultStatus {
    /// The worse of two statuses.
    pub fn worst(self, other: OperationResultStatus) -> OperationResultStatus {
        self.max(other)
    }

    pub fn is_fatal(self) -> bool {
        self == OperationResultStatus::FatalError
    }

    fn completion_status(self) -> CompletionStatus {
        match self {
            OperationResultStatus::Success | OperationResultStatus::NotApplicable => {
                CompletionStatus::Completed
            }
            OperationResultStatus::Warning | OperationResultStatus::PartialError => {
                CompletionStatus::CompletedWithErrors
            }
            OperationResultStatus::FatalError => CompletionStatus::NotCompleted,
        }
    }
}

/// Result of completing one resource.
#[derive(Debug)]
pub struct CompletionOutcome {
    /// Completed definition, or the partial one when completion failed.
    pub definition: ResourceDefinition,
    pub status: OperationResultStatus,
    /// Problems found along the way, worst first.
    pub problems: Vec<(OperationResultStatus, ProvisioningError)>,
}

impl CompletionOutcome {
    /// Only a fully successful completion may be cached.
    pub fn is_cacheable(&self) -> bool {
        self.status == OperationResultStatus::Success && self.definition.is_completed()
    }

    /// Convert into the completed definition, or a [`ProvisioningError::CompletionFailed`].
    pub fn into_result(self) -> ProvisioningResult<ResourceDefinition> {
        if !self.status.is_fatal() {
            return Ok(self.definition);
        }
        let oid = self.definition.oid.clone();
        let source = self
            .problems
            .into_iter()
            .find(|(status, _)| status.is_fatal())
            .map(|(_, e)| e)
            .unwrap_or_else(|| ProvisioningError::internal("completion failed without a cause"));
        Err(ProvisioningError::CompletionFailed {
            oid,
            source: Box::new(source),
            partial: Some(Box::new(self.definition)),
        })
    }
}

/// Single completion run over a raw definition.
pub struct ResourceCompletionOperation<'a, R, C> {
    repository: &'a R,
    connectors: &'a C,
    options: ReadOptions,
    context: &'a OperationContext,
    status: OperationResultStatus,
    problems: Vec<(OperationResultStatus, ProvisioningError)>,
}

impl<'a, R: Repository, C: ConnectorFramework> ResourceCompletionOperation<'a, R, C> {
    pub fn new(
        repository: &'a R,
        connectors: &'a C,
        options: ReadOptions,
        context: &'a OperationContext,
    ) -> Self {
        Self {
            repository,
            connectors,
            options,
            context,
            status: OperationResultStatus::Success,
            problems: Vec::new(),
        }
    }

    pub async fn execute(mut self, raw: &ResourceDefinition) -> CompletionOutcome {
        if raw.is_completed() {
            return CompletionOutcome {
                definition: raw.clone(),
                status: OperationResultStatus::Success,
                problems: Vec::new(),
            };
        }
        info!(
            "Completing resource {} at version {}{} (request: '{}')",
            raw.oid,
            raw.version,
            if self.options.no_fetch { " without fetch" } else { "" },
            self.context.request_id
        );

        let mut definition = raw.clone();
        definition.completion_status = CompletionStatus::NotCompleted;

        match self.resolve_ancestors(raw).await {
            Ok((configuration, ancestors)) => {
                definition.configuration = configuration;
                definition.ancestor_versions = ancestors;
            }
            Err(e) => {
                self.record(OperationResultStatus::FatalError, e);
                return self.finish(definition);
            }
        }

        let configuration = definition.configuration.clone();
        let (native_schema, native_capabilities) = match self.native_data(&configuration).await {
            Ok(native) => native,
            Err(e) => {
                self.record(OperationResultStatus::FatalError, e);
                return self.finish(definition);
            }
        };

        let capabilities = match &native_capabilities {
            Some(native) => native.with_overrides(&definition.configuration.capabilities),
            None => CapabilitySet::new().with_overrides(&definition.configuration.capabilities),
        };
        match capabilities {
            Ok(capabilities) => definition.capabilities = capabilities,
            Err(e) => {
                self.record(OperationResultStatus::FatalError, e);
                return self.finish(definition);
            }
        }

        if let Some(native) = native_schema {
            let outcome = ResourceSchema::build(
                &native,
                &definition.configuration.schema_handling,
                &definition.capabilities,
            );
            for error in outcome.errors {
                self.record(OperationResultStatus::FatalError, error);
            }
            definition.schema = Some(Arc::new(outcome.schema));
            definition.configuration.native_schema = Some(native);
        }
        if let Some(native) = native_capabilities {
            definition.configuration.native_capabilities = Some(native);
        }

        self.finish(definition)
    }

    /// Merge the template chain, root first. Records the version of every ancestor.
    async fn resolve_ancestors(
        &self,
        raw: &ResourceDefinition,
    ) -> ProvisioningResult<(ResourceConfiguration, BTreeMap<String, ObjectVersion>)> {
        let mut visited = BTreeSet::from([raw.oid.clone()]);
        let mut ancestors = BTreeMap::new();
        let mut chain = Vec::new();
        let mut next = raw.configuration.super_ref.clone();

        while let Some(parent_oid) = next {
            if !visited.insert(parent_oid.clone()) {
                return Err(ProvisioningError::misconfiguration(format!(
                    "Template cycle detected at {} while completing {}",
                    parent_oid, raw.oid
                )));
            }
            let parent = self.repository.get_object(&parent_oid).await?;
            debug!(
                "Resource {} inherits from {} (version {}) (request: '{}')",
                raw.oid, parent_oid, parent.version, self.context.request_id
            );
            ancestors.insert(parent_oid, parent.version);
            next = parent.configuration.super_ref.clone();
            chain.push(parent.configuration);
        }

        let configuration = chain
            .iter()
            .rev()
            .fold(None::<ResourceConfiguration>, |merged, ancestor| {
                Some(match merged {
                    Some(parent) => ancestor.merged_over(&parent),
                    None => ancestor.clone(),
                })
            })
            .map(|inherited| raw.configuration.merged_over(&inherited))
            .unwrap_or_else(|| raw.configuration.clone());
        Ok((configuration, ancestors))
    }

    async fn native_data(
        &mut self,
        configuration: &ResourceConfiguration,
    ) -> ProvisioningResult<(Option<NativeSchema>, Option<CapabilitySet>)> {
        if self.options.no_fetch {
            // Never authoritative enough to cache.
            self.status = self.status.worst(OperationResultStatus::Warning);
            if configuration.native_schema.is_none() {
                self.record(
                    OperationResultStatus::PartialError,
                    ProvisioningError::schema_violation("no stored schema available without fetch"),
                );
            }
            return Ok((
                configuration.native_schema.clone(),
                configuration.native_capabilities.clone(),
            ));
        }

        let connector = configuration.connector_ref.as_ref().ok_or_else(|| {
            ProvisioningError::misconfiguration("resource has no connector reference")
        })?;
        let settings = &configuration.connector_configuration;
        let schema = self.connectors.fetch_native_schema(connector, settings).await?;
        let capabilities = self
            .connectors
            .fetch_native_capabilities(connector, settings)
            .await?;
        debug!(
            "Fetched native schema ({} object classes) from {} connector (request: '{}')",
            schema.object_classes.len(),
            connector.connector_type,
            self.context.request_id
        );
        Ok((Some(schema), Some(capabilities)))
    }

    fn record(&mut self, status: OperationResultStatus, error: ProvisioningError) {
        self.status = self.status.worst(status);
        self.problems.push((status, error));
    }

    fn finish(mut self, mut definition: ResourceDefinition) -> CompletionOutcome {
        definition.completion_status = self.status.completion_status();
        self.problems.sort_by(|a, b| b.0.cmp(&a.0));
        match self.status {
            OperationResultStatus::FatalError => {
                let cause = self
                    .problems
                    .first()
                    .map(|(_, e)| e.to_string())
                    .unwrap_or_default();
                warn!(
                    "Completion of resource {} failed: {} (request: '{}')",
                    definition.oid, cause, self.context.request_id
                );
            }
            status => debug!(
                "Completion of resource {} finished with {:?} (request: '{}')",
                definition.oid, status, self.context.request_id
            ),
        }
        CompletionOutcome {
            definition,
            status: self.status,
            problems: self.problems,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_order() {
        use OperationResultStatus::*;
        assert_eq!(Success.worst(Warning), Warning);
        assert_eq!(PartialError.worst(Success), PartialError);
        assert_eq!(Warning.worst(FatalError), FatalError);
        assert_eq!(NotApplicable.worst(Success), Success);
    }

    #[test]
    fn test_completion_status_mapping() {
        assert_eq!(
            OperationResultStatus::Success.completion_status(),
            CompletionStatus::Completed
        );
        assert_eq!(
            OperationResultStatus::Warning.completion_status(),
            CompletionStatus::CompletedWithErrors
        );
        assert_eq!(
            OperationResultStatus::FatalError.completion_status(),
            CompletionStatus::NotCompleted
        );
    }

    #[test]
    fn test_fatal_outcome_carries_partial_definition() {
        let outcome = CompletionOutcome {
            definition: ResourceDefinition::new("r-1", "R", ResourceConfiguration::default()),
            status: OperationResultStatus::FatalError,
            problems: vec![
                (
                    OperationResultStatus::FatalError,
                    ProvisioningError::connector_unreachable("refused"),
                ),
                (
                    OperationResultStatus::Warning,
                    ProvisioningError::internal("minor"),
                ),
            ],
        };
        assert!(!outcome.is_cacheable());
        let err = outcome.into_result().unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.partial_definition().map(|d| d.oid.as_str()), Some("r-1"));
    }
}
