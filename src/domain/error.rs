//! Error taxonomy of the mock engine

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::HttpMethod;

/// Kind of a single request validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    MissingField,
    TypeMismatch,
    ConstraintViolation,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidationErrorKind::MissingField => "MissingField",
            ValidationErrorKind::TypeMismatch => "TypeMismatch",
            ValidationErrorKind::ConstraintViolation => "ConstraintViolation",
        };
        f.write_str(name)
    }
}

/// One violation found while checking a payload against a schema.
///
/// `field` is a dotted path with `[n]` array indices; the empty string
/// denotes the payload root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl ValidationError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: ValidationErrorKind::MissingField,
            message: "required property is missing".to_string(),
        }
    }

    pub fn mismatch(field: impl Into<String>, expected: &str, found: &str) -> Self {
        Self {
            field: field.into(),
            kind: ValidationErrorKind::TypeMismatch,
            message: format!("expected {}, found {}", expected, found),
        }
    }

    pub fn constraint(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: ValidationErrorKind::ConstraintViolation,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = if self.field.is_empty() { "<root>" } else { &self.field };
        write!(f, "{}: {} ({})", self.kind, field, self.message)
    }
}

/// Failure to turn a schema document into a resolved schema tree
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("Invalid schema at '{at}': {reason}")]
    Malformed { at: String, reason: String },

    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("Cyclic reference: {}", .0.join(" -> "))]
    CyclicReference(Vec<String>),
}

impl SchemaError {
    pub fn malformed(at: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            at: at.into(),
            reason: reason.into(),
        }
    }
}

/// Every schema problem found in one resolution pass
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", join_errors(.0))]
pub struct SchemaErrors(pub Vec<SchemaError>);

impl SchemaErrors {
    pub fn is_cyclic(&self) -> bool {
        self.0
            .iter()
            .any(|e| matches!(e, SchemaError::CyclicReference(_)))
    }
}

impl From<SchemaError> for SchemaErrors {
    fn from(err: SchemaError) -> Self {
        SchemaErrors(vec![err])
    }
}

fn join_errors(errors: &[SchemaError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised by a durable contract store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors returned by the contract registry
#[derive(Debug, Error)]
pub enum MockError {
    /// Body or registration payload could not be understood
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// The request body violates the contract's request schema
    #[error("Request validation failed: {}", join_validation(.0))]
    Validation(Vec<ValidationError>),

    /// Reference resolution or schema parsing failed
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaErrors),

    #[error("Route {method} {path} is already registered")]
    DuplicateRoute { path: String, method: HttpMethod },

    #[error("An identical instance already exists for {method} {path} (id {existing})")]
    DuplicateInstance {
        path: String,
        method: HttpMethod,
        existing: Uuid,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Method {method} not allowed for {path}")]
    MethodNotAllowed {
        path: String,
        method: String,
        allowed: Vec<HttpMethod>,
    },

    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

fn join_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<SchemaError> for MockError {
    fn from(err: SchemaError) -> Self {
        MockError::Schema(err.into())
    }
}

impl MockError {
    /// Convert to HTTP status code for API responses
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedInput(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Schema(errors) if errors.is_cyclic() => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Schema(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateRoute { .. } => StatusCode::CONFLICT,
            Self::DuplicateInstance { .. } => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Validation errors carried by this error, if any
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            Self::Validation(errors) => errors,
            _ => &[],
        }
    }
}
