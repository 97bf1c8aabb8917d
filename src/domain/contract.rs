use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::schema::SchemaNode;
use super::{HttpMethod, MockError};

/// How the `request` of an instance is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Any body is accepted
    Any,
    /// The body is validated against a schema
    Schema,
    /// A concrete example body used to pick this instance
    Example,
}

impl RequestKind {
    pub fn classify(request: &Value) -> Self {
        match request {
            Value::Null => RequestKind::Any,
            Value::Object(map) if map.is_empty() => RequestKind::Any,
            other if SchemaNode::looks_like_schema(other) => RequestKind::Schema,
            _ => RequestKind::Example,
        }
    }
}

/// How the `response` of an instance is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// A value is synthesized from the schema on every call
    Schema,
    /// Returned verbatim
    Literal,
}

impl ResponseKind {
    pub fn classify(response: &Value) -> Self {
        if SchemaNode::looks_like_schema(response) {
            ResponseKind::Schema
        } else {
            ResponseKind::Literal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceOrigin {
    /// Declared through registration; takes part in response selection
    Registered,
    /// Captured from handled traffic
    Recorded,
}

/// One request/response pair stored under a contract
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: Uuid,
    pub origin: InstanceOrigin,
    #[serde(default)]
    pub request: Value,
    #[serde(default)]
    pub response: Value,
    pub request_kind: RequestKind,
    pub response_kind: ResponseKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Extra document keys `$ref` pointers may reach (e.g. `definitions`, `components`)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub definitions: Map<String, Value>,
    /// Path bindings and query parameters of a recorded request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Instance {
    /// Byte-level identity of the (request, response) pair
    pub fn same_content(&self, request: &Value, response: &Value) -> bool {
        self.request.to_string() == request.to_string()
            && self.response.to_string() == response.to_string()
    }

    /// Root against which `#/...` references inside this instance resolve
    pub fn document_root(&self) -> Value {
        let mut root = self.definitions.clone();
        root.insert("request".to_string(), self.request.clone());
        root.insert("response".to_string(), self.response.clone());
        Value::Object(root)
    }

    pub fn is_registered(&self) -> bool {
        self.origin == InstanceOrigin::Registered
    }
}

/// All instances registered for one (path template, method) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    /// Normalized path template, e.g. `/users/{id}`
    pub path: String,
    pub method: HttpMethod,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub instances: Vec<Instance>,
}

impl Contract {
    pub fn new(path: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            path: path.into(),
            method,
            created_at: Utc::now(),
            updated_at: None,
            instances: Vec::new(),
        }
    }

    pub fn find_instance(&self, id: &Uuid) -> Option<&Instance> {
        self.instances.iter().find(|i| &i.id == id)
    }

    pub fn registered(&self) -> impl Iterator<Item = &Instance> {
        self.instances.iter().filter(|i| i.is_registered())
    }

    pub fn recorded_count(&self) -> usize {
        self.instances.iter().filter(|i| !i.is_registered()).count()
    }

    pub fn summary(&self) -> ContractSummary {
        let recorded = self.recorded_count();
        ContractSummary {
            path: self.path.clone(),
            method: self.method,
            registered: self.instances.len() - recorded,
            recorded,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractSummary {
    pub path: String,
    pub method: HttpMethod,
    pub registered: usize,
    pub recorded: usize,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Serializable form of the whole registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryState {
    #[serde(default)]
    pub contracts: Vec<Contract>,
}

/// Input of a registration
#[derive(Debug, Clone)]
pub struct RegisterCommand {
    pub path: String,
    pub method: HttpMethod,
    pub request: Value,
    pub response: Value,
    pub request_kind: Option<RequestKind>,
    pub response_kind: Option<ResponseKind>,
    pub status: Option<u16>,
    pub definitions: Map<String, Value>,
}

impl RegisterCommand {
    pub fn new(path: impl Into<String>, method: HttpMethod, request: Value, response: Value) -> Self {
        Self {
            path: path.into(),
            method,
            request,
            response,
            request_kind: None,
            response_kind: None,
            status: None,
            definitions: Map::new(),
        }
    }

    pub fn with_definitions(mut self, definitions: Map<String, Value>) -> Self {
        self.definitions = definitions;
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// Reject a configured response status outside `100..=599`.
pub fn check_status(status: Option<u16>) -> Result<(), MockError> {
    match status {
        Some(code) if !(100..=599).contains(&code) => {
            Err(MockError::MalformedInput(format!("invalid status code {}", code)))
        }
        _ => Ok(()),
    }
}

/// Partial update of an instance. `request` and `response` are applied as
/// JSON merge patches; the other fields replace stored values when present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstancePatch {
    #[serde(default)]
    pub request: Option<Value>,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub request_kind: Option<RequestKind>,
    #[serde(default)]
    pub response_kind: Option<ResponseKind>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub definitions: Option<Map<String, Value>>,
}

/// What a delete removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteScope {
    /// A single instance
    Instance(Uuid),
    /// Every contract at the path, with all their instances
    Path,
}
