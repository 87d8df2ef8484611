//! Shared helpers for integration tests.
//!
//! Provides a scripted connector framework that counts calls and can be
//! switched into failure modes, plus fixtures for typical resources.

#![allow(dead_code)]

use resource_provisioning::connector::{
    ConnectorError, ConnectorFramework, ConnectorReference, ConnectorResult, NativeAttribute,
    NativeObjectClass, NativeSchema, ScriptRequest, SuggestedProperty,
};
use resource_provisioning::repository::InMemoryRepository;
use resource_provisioning::resource::{
    CachingPolicy, CachingStrategy, CapabilitySet, CapabilityType, ResourceConfiguration,
    ResourceDefinition, ResourceManager,
};
use resource_provisioning::schema::{ItemName, ObjectTypeConfig, ShadowKind};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Initialize logging once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Connector framework double.
///
/// Clones share counters and switches, so a test can keep a handle after
/// moving one into the manager.
#[derive(Clone, Default)]
pub struct MockConnectorFramework {
    schema_fetches: Arc<AtomicUsize>,
    capability_fetches: Arc<AtomicUsize>,
    connection_tests: Arc<AtomicUsize>,
    scripts_run: Arc<AtomicUsize>,
    unreachable: Arc<AtomicBool>,
    held: Arc<AtomicBool>,
    fetch_started: Arc<Notify>,
    fetch_released: Arc<Notify>,
}

impl MockConnectorFramework {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Make schema fetches wait for [`release_schema_fetch`](Self::release_schema_fetch).
    pub fn hold_schema_fetches(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    /// Wait until a held schema fetch has started.
    pub async fn schema_fetch_started(&self) {
        self.fetch_started.notified().await;
    }

    pub fn release_schema_fetch(&self) {
        self.fetch_released.notify_one();
    }

    pub fn schema_fetches(&self) -> usize {
        self.schema_fetches.load(Ordering::SeqCst)
    }

    pub fn capability_fetches(&self) -> usize {
        self.capability_fetches.load(Ordering::SeqCst)
    }

    pub fn connection_tests(&self) -> usize {
        self.connection_tests.load(Ordering::SeqCst)
    }

    pub fn scripts_run(&self) -> usize {
        self.scripts_run.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> ConnectorResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(ConnectorError::Unreachable {
                message: "connection refused".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl ConnectorFramework for MockConnectorFramework {
    async fn fetch_native_schema(
        &self,
        _connector: &ConnectorReference,
        _configuration: &Map<String, Value>,
    ) -> ConnectorResult<NativeSchema> {
        self.schema_fetches.fetch_add(1, Ordering::SeqCst);
        if self.held.load(Ordering::SeqCst) {
            self.fetch_started.notify_one();
            self.fetch_released.notified().await;
        }
        self.check_reachable()?;
        // Give racing completions a chance to interleave.
        tokio::task::yield_now().await;
        Ok(native_schema())
    }

    async fn fetch_native_capabilities(
        &self,
        _connector: &ConnectorReference,
        _configuration: &Map<String, Value>,
    ) -> ConnectorResult<CapabilitySet> {
        self.capability_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        Ok(native_capabilities())
    }

    async fn test_connection(
        &self,
        _connector: &ConnectorReference,
        _configuration: &Map<String, Value>,
    ) -> ConnectorResult<()> {
        self.connection_tests.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()
    }

    async fn test_partial_configuration(
        &self,
        _connector: &ConnectorReference,
        configuration: &Map<String, Value>,
    ) -> ConnectorResult<()> {
        if configuration.contains_key("host") {
            Ok(())
        } else {
            Err(ConnectorError::InvalidConfiguration {
                message: "host is required".to_string(),
            })
        }
    }

    async fn discover_configuration(
        &self,
        _connector: &ConnectorReference,
        configuration: &Map<String, Value>,
    ) -> ConnectorResult<Vec<SuggestedProperty>> {
        self.check_reachable()?;
        let host = configuration
            .get("host")
            .cloned()
            .unwrap_or_else(|| json!("localhost"));
        Ok(vec![
            SuggestedProperty {
                name: "port".to_string(),
                values: vec![json!(389), json!(636)],
            },
            SuggestedProperty {
                name: "baseContext".to_string(),
                values: vec![json!(format!("dc={}", host.as_str().unwrap_or("local")))],
            },
        ])
    }

    async fn execute_script(
        &self,
        _connector: &ConnectorReference,
        _configuration: &Map<String, Value>,
        script: &ScriptRequest,
    ) -> ConnectorResult<Value> {
        self.scripts_run.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        Ok(json!({ "echo": script.code }))
    }
}

pub fn account_class_name() -> ItemName {
    ItemName::ri("AccountObjectClass")
}

pub fn group_class_name() -> ItemName {
    ItemName::ri("GroupObjectClass")
}

/// Schema of a small directory: accounts, groups and one auxiliary class.
pub fn native_schema() -> NativeSchema {
    NativeSchema::new(vec![
        NativeObjectClass::new(account_class_name())
            .with_attribute(NativeAttribute::new(ItemName::icfs("uid")).read_only())
            .with_attribute(NativeAttribute::new(ItemName::icfs("name")))
            .with_attribute(
                NativeAttribute::new(ItemName::ri("mail")).with_matching_rule("stringIgnoreCase"),
            )
            .with_attribute(NativeAttribute::new(ItemName::ri("roles")).multi_valued())
            .with_attribute(NativeAttribute::new(ItemName::ri("fax")))
            .with_attribute(NativeAttribute::new(ItemName::ri("password")).write_only())
            .with_primary_identifier(ItemName::icfs("uid"))
            .with_secondary_identifier(ItemName::icfs("name")),
        NativeObjectClass::new(group_class_name())
            .with_attribute(NativeAttribute::new(ItemName::icfs("uid")).read_only())
            .with_attribute(NativeAttribute::new(ItemName::icfs("name")))
            .with_attribute(NativeAttribute::new(ItemName::ri("member")).multi_valued())
            .with_primary_identifier(ItemName::icfs("uid"))
            .with_secondary_identifier(ItemName::icfs("name")),
        NativeObjectClass::new(ItemName::ri("posixAccount"))
            .with_attribute(NativeAttribute::new(ItemName::ri("uidNumber")))
            .auxiliary(),
    ])
}

pub fn native_capabilities() -> CapabilitySet {
    CapabilitySet::new()
        .with_enabled(CapabilityType::Read)
        .with_enabled(CapabilityType::Create)
        .with_enabled(CapabilityType::Update)
        .with_enabled(CapabilityType::Delete)
        .with_enabled(CapabilityType::TestConnection)
}

pub fn connector_ref() -> ConnectorReference {
    ConnectorReference::new("ldap").with_version("3.7")
}

/// Raw resource with one default account type.
pub fn resource(oid: &str) -> ResourceDefinition {
    let mut configuration = ResourceConfiguration::new(connector_ref());
    configuration
        .connector_configuration
        .insert("host".to_string(), json!("ldap.example.com"));
    configuration.schema_handling = vec![
        ObjectTypeConfig::new(ShadowKind::Account, "default", account_class_name()).as_default(),
        ObjectTypeConfig::new(ShadowKind::Entitlement, "group", group_class_name()),
    ];
    ResourceDefinition::new(oid, format!("Resource {}", oid), configuration)
}

/// Template holding the connector settings shared by its children.
pub fn template(oid: &str) -> ResourceDefinition {
    let mut configuration = ResourceConfiguration::new(connector_ref());
    configuration
        .connector_configuration
        .insert("host".to_string(), json!("template.example.com"));
    configuration.connector_configuration.insert(
        "connection".to_string(),
        json!({ "port": 389, "ssl": false }),
    );
    configuration.caching = Some(CachingPolicy::new(CachingStrategy::Passive));
    configuration.is_template = true;
    configuration.schema_handling =
        vec![ObjectTypeConfig::new(ShadowKind::Account, "default", account_class_name()).as_default()];
    ResourceDefinition::new(oid, format!("Template {}", oid), configuration)
}

/// Resource inheriting everything but the host from `parent`.
pub fn child_of(oid: &str, parent: &str) -> ResourceDefinition {
    let mut configuration = ResourceConfiguration::default();
    configuration.super_ref = Some(parent.to_string());
    configuration
        .connector_configuration
        .insert("host".to_string(), json!("child.example.com"));
    configuration
        .connector_configuration
        .insert("connection".to_string(), json!({ "ssl": true }));
    ResourceDefinition::new(oid, format!("Resource {}", oid), configuration)
}

pub type TestManager = ResourceManager<InMemoryRepository, MockConnectorFramework>;

pub fn manager(repository: &InMemoryRepository, connectors: &MockConnectorFramework) -> TestManager {
    init_logging();
    ResourceManager::builder()
        .with_repository(repository.clone())
        .with_connector_framework(connectors.clone())
        .build()
        .expect("manager should build")
}
