//! Connector framework collaborator.
//!
//! The connector framework performs the actual network calls to managed
//! systems. This crate only consumes it through [`ConnectorFramework`]; timeouts
//! and cancellation are the framework's business.
//!
//! # Example Implementation
//!
//! ```rust,no_run
//! use resource_provisioning::connector::*;
//! use resource_provisioning::resource::capabilities::CapabilitySet;
//! use serde_json::{Map, Value};
//! use std::future::Future;
//!
//! struct Offline;
//!
//! impl ConnectorFramework for Offline {
//!     fn fetch_native_schema(
//!         &self,
//!         _connector: &ConnectorReference,
//!         _configuration: &Map<String, Value>,
//!     ) -> impl Future<Output = ConnectorResult<NativeSchema>> + Send {
//!         async { Err(ConnectorError::Unreachable { message: "offline".into() }) }
//!     }
//!     // ... remaining operations
//! #   fn fetch_native_capabilities(&self, _: &ConnectorReference, _: &Map<String, Value>)
//! #       -> impl Future<Output = ConnectorResult<CapabilitySet>> + Send { async { Ok(CapabilitySet::new()) } }
//! #   fn test_connection(&self, _: &ConnectorReference, _: &Map<String, Value>)
//! #       -> impl Future<Output = ConnectorResult<()>> + Send { async { Ok(()) } }
//! #   fn test_partial_configuration(&self, _: &ConnectorReference, _: &Map<String, Value>)
//! #       -> impl Future<Output = ConnectorResult<()>> + Send { async { Ok(()) } }
//! #   fn discover_configuration(&self, _: &ConnectorReference, _: &Map<String, Value>)
//! #       -> impl Future<Output = ConnectorResult<Vec<SuggestedProperty>>> + Send { async { Ok(vec![]) } }
//! #   fn execute_script(&self, _: &ConnectorReference, _: &Map<String, Value>, _: &ScriptRequest)
//! #       -> impl Future<Output = ConnectorResult<Value>> + Send { async { Ok(Value::Null) } }
//! }
//! ```

use crate::error::ErrorKind;
use crate::resource::capabilities::CapabilitySet;
use crate::schema::{ItemName, ValueType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use thiserror::Error;

/// Reference from a resource to the connector that serves it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorReference {
    /// Connector type, e.g. `ldap` or `csv`.
    pub connector_type: String,
    pub version: Option<String>,
}

impl ConnectorReference {
    pub fn new(connector_type: impl Into<String>) -> Self {
        Self {
            connector_type: connector_type.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// Attribute as reported by the connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeAttribute {
    pub name: ItemName,
    #[serde(default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub min_occurs: u32,
    /// `None` means unbounded.
    #[serde(default = "single")]
    pub max_occurs: Option<u32>,
    #[serde(default = "yes")]
    pub can_create: bool,
    #[serde(default = "yes")]
    pub can_read: bool,
    #[serde(default = "yes")]
    pub can_update: bool,
    #[serde(default)]
    pub matching_rule: Option<String>,
}

fn yes() -> bool {
    true
}

fn single() -> Option<u32> {
    Some(1)
}

impl NativeAttribute {
    pub fn new(name: ItemName) -> Self {
        Self {
            name,
            value_type: ValueType::String,
            min_occurs: 0,
            max_occurs: Some(1),
            can_create: true,
            can_read: true,
            can_update: true,
            matching_rule: None,
        }
    }

    pub fn multi_valued(mut self) -> Self {
        self.max_occurs = None;
        self
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn with_matching_rule(mut self, rule: impl Into<String>) -> Self {
        self.matching_rule = Some(rule.into());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.can_create = false;
        self.can_update = false;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.can_read = false;
        self
    }
}

/// Object class as reported by the connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeObjectClass {
    pub name: ItemName,
    #[serde(default)]
    pub auxiliary: bool,
    #[serde(default)]
    pub attributes: Vec<NativeAttribute>,
    #[serde(default)]
    pub primary_identifiers: Vec<ItemName>,
    #[serde(default)]
    pub secondary_identifiers: Vec<ItemName>,
    #[serde(default)]
    pub display_name_attribute: Option<ItemName>,
    #[serde(default)]
    pub naming_attribute: Option<ItemName>,
}

impl NativeObjectClass {
    pub fn new(name: ItemName) -> Self {
        Self {
            name,
            auxiliary: false,
            attributes: Vec::new(),
            primary_identifiers: Vec::new(),
            secondary_identifiers: Vec::new(),
            display_name_attribute: None,
            naming_attribute: None,
        }
    }

    pub fn with_attribute(mut self, attribute: NativeAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_primary_identifier(mut self, name: ItemName) -> Self {
        self.primary_identifiers.push(name);
        self
    }

    pub fn with_secondary_identifier(mut self, name: ItemName) -> Self {
        self.secondary_identifiers.push(name);
        self
    }

    pub fn with_naming_attribute(mut self, name: ItemName) -> Self {
        self.naming_attribute = Some(name);
        self
    }

    pub fn with_display_name_attribute(mut self, name: ItemName) -> Self {
        self.display_name_attribute = Some(name);
        self
    }

    pub fn auxiliary(mut self) -> Self {
        self.auxiliary = true;
        self
    }
}

/// Native schema as reported by the connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeSchema {
    pub object_classes: Vec<NativeObjectClass>,
}

impl NativeSchema {
    pub fn new(object_classes: Vec<NativeObjectClass>) -> Self {
        Self { object_classes }
    }

    pub fn find_object_class(&self, name: &ItemName) -> Option<&NativeObjectClass> {
        self.object_classes.iter().find(|oc| oc.name.matches(name))
    }
}

/// A configuration property proposed by connector discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedProperty {
    pub name: String,
    pub values: Vec<Value>,
}

/// Script to run on the resource through the connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRequest {
    pub language: Option<String>,
    pub code: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// Errors reported by the connector framework.
#[derive(Debug, Clone, Error)]
pub enum ConnectorError {
    /// The external system could not be reached.
    #[error("target system unreachable: {message}")]
    Unreachable { message: String },

    /// Operation exceeded the framework's timeout.
    #[error("{operation} timed out after {seconds} seconds")]
    Timeout { operation: String, seconds: u64 },

    /// Connector configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// No connector of this type is installed.
    #[error("connector not found: {connector_type}")]
    ConnectorNotFound { connector_type: String },

    /// The connector does not support the operation.
    #[error("operation '{operation}' not supported by connector")]
    Unsupported { operation: String },

    /// Anything the connector reported that does not fit above.
    #[error("connector failure: {message}")]
    Generic { message: String },
}

impl ConnectorError {
    /// Classification used by [`ProvisioningError::kind`](crate::error::ProvisioningError::kind).
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectorError::Unreachable { .. } | ConnectorError::Timeout { .. } => {
                ErrorKind::Communication
            }
            ConnectorError::InvalidConfiguration { .. }
            | ConnectorError::ConnectorNotFound { .. }
            | ConnectorError::Unsupported { .. } => ErrorKind::Configuration,
            ConnectorError::Generic { .. } => ErrorKind::Internal,
        }
    }
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Operations the provisioning core needs from the connector framework.
///
/// Every call receives the connector reference and the merged connector
/// configuration of the (completed) resource. All calls may block on network
/// I/O.
pub trait ConnectorFramework: Send + Sync {
    /// Fetch the native schema of the resource.
    fn fetch_native_schema(
        &self,
        connector: &ConnectorReference,
        configuration: &Map<String, Value>,
    ) -> impl Future<Output = ConnectorResult<NativeSchema>> + Send;

    /// Fetch the capabilities the connector natively supports for the resource.
    fn fetch_native_capabilities(
        &self,
        connector: &ConnectorReference,
        configuration: &Map<String, Value>,
    ) -> impl Future<Output = ConnectorResult<CapabilitySet>> + Send;

    /// Full connection test.
    fn test_connection(
        &self,
        connector: &ConnectorReference,
        configuration: &Map<String, Value>,
    ) -> impl Future<Output = ConnectorResult<()>> + Send;

    /// Test of a configuration that is not (yet) complete, e.g. during a wizard.
    fn test_partial_configuration(
        &self,
        connector: &ConnectorReference,
        configuration: &Map<String, Value>,
    ) -> impl Future<Output = ConnectorResult<()>> + Send;

    /// Ask the connector to suggest configuration property values.
    fn discover_configuration(
        &self,
        connector: &ConnectorReference,
        configuration: &Map<String, Value>,
    ) -> impl Future<Output = ConnectorResult<Vec<SuggestedProperty>>> + Send;

    /// Execute a script on the resource.
    fn execute_script(
        &self,
        connector: &ConnectorReference,
        configuration: &Map<String, Value>,
        script: &ScriptRequest,
    ) -> impl Future<Output = ConnectorResult<Value>> + Send;
}
