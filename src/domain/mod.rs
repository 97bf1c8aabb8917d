use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub mod contract;
pub mod error;
pub mod schema;

pub use contract::{
    check_status, Contract, ContractSummary, DeleteScope, Instance, InstanceOrigin, InstancePatch,
    RegisterCommand, RegistryState, RequestKind, ResponseKind,
};
pub use error::{MockError, SchemaError, SchemaErrors, StoreError, ValidationError, ValidationErrorKind};
pub use schema::SchemaNode;

/// HTTP method a contract answers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Methods whose requests carry no meaningful payload when the body is absent.
    pub fn is_read_only(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Head | HttpMethod::Options)
    }

    /// Status answered by `handle` when the instance does not override it.
    pub fn default_status(&self) -> u16 {
        match self {
            HttpMethod::Post => 201,
            _ => 200,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = MockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            other => Err(MockError::MalformedInput(format!("unsupported HTTP method '{}'", other))),
        }
    }
}

/// A request as delivered by the transport layer.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl MockRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, query: BTreeMap<String, String>) -> Self {
        self.query = query;
        self
    }
}

/// Where the body of a handled response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Literal,
    Synthesized,
    Generated,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Literal => "literal",
            ResponseSource::Synthesized => "synthesized",
            ResponseSource::Generated => "generated",
        }
    }
}

/// The answer handed back to the transport layer.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: Value,
    pub source: ResponseSource,
}

/// Durable storage for the registry state.
///
/// `save` always receives the complete state; implementations replace whatever
/// they stored before.
#[async_trait]
pub trait ContractStore: Send + Sync {
    async fn load(&self) -> Result<RegistryState, StoreError>;
    async fn save(&self, state: &RegistryState) -> Result<(), StoreError>;
}

/// Optional capability that produces a value for a resolved schema, e.g. by
/// asking a language model. Output is checked against the schema by the caller.
#[async_trait]
pub trait ValueGenerator: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, schema: &SchemaNode) -> anyhow::Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!(" Patch ".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_method_serde_uppercase() {
        let json = serde_json::to_string(&HttpMethod::Delete).unwrap();
        assert_eq!(json, "\"DELETE\"");
        let method: HttpMethod = serde_json::from_str("\"POST\"").unwrap();
        assert_eq!(method, HttpMethod::Post);
    }

    #[test]
    fn test_default_status() {
        assert_eq!(HttpMethod::Post.default_status(), 201);
        assert_eq!(HttpMethod::Get.default_status(), 200);
        assert_eq!(HttpMethod::Delete.default_status(), 200);
    }
}
