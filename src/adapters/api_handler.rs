//! HTTP surface of the mock server.
//!
//! Administrative routes live under a configurable prefix; every other request
//! is answered by the contract registry.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::adapters::health_handler::HealthHandler;
use crate::adapters::metrics_handler::{MetricsCollector, MetricsHandler};
use crate::application::{openapi, ContractRegistry};
use crate::domain::{
    check_status, DeleteScope, HttpMethod, InstancePatch, MockError, MockRequest, RegisterCommand,
    RequestKind, ResponseKind,
};

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ContractRegistry>,
    pub metrics: Arc<MetricsCollector>,
    pub health_handler: Arc<HealthHandler>,
    pub metrics_handler: Arc<MetricsHandler>,
}

impl AppState {
    pub fn new(registry: Arc<ContractRegistry>) -> anyhow::Result<Self> {
        let metrics = Arc::new(MetricsCollector::new()?);
        Ok(Self {
            health_handler: Arc::new(HealthHandler::new(registry.clone())),
            metrics_handler: Arc::new(MetricsHandler::new(metrics.clone())),
            registry,
            metrics,
        })
    }

    async fn refresh_contract_gauge(&self) {
        let count = self.registry.contract_count().await;
        self.metrics.contracts.set(count as i64);
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            details: None,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            details: None,
        }
    }
}

impl IntoResponse for MockError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let details = match &self {
            MockError::Validation(errors) => Some(json!(errors)),
            MockError::MethodNotAllowed { allowed, .. } if !allowed.is_empty() => Some(json!({ "allowed": allowed })),
            MockError::DuplicateInstance { existing, .. } => Some(json!({ "existing": existing })),
            _ => None,
        };
        let allow = match &self {
            MockError::MethodNotAllowed { allowed, .. } if !allowed.is_empty() => Some(
                allowed
                    .iter()
                    .map(HttpMethod::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            _ => None,
        };

        let mut body = ApiResponse::<()>::error(self.to_string());
        body.details = details;
        let mut response = (status, Json(body)).into_response();
        if let Some(value) = allow.and_then(|a| HeaderValue::from_str(&a).ok()) {
            response.headers_mut().insert(header::ALLOW, value);
        }
        response
    }
}

// ============================================================================
// Request Types
// ============================================================================

/// Body of a registration. Keys other than the named fields are kept as
/// definitions that `#/...` references may point into.
#[derive(Debug, Deserialize)]
pub struct RegistrationBody {
    #[serde(default)]
    pub path: Option<String>,
    pub method: String,
    #[serde(default)]
    pub request: Value,
    pub response: Value,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub request_kind: Option<RequestKind>,
    #[serde(default)]
    pub response_kind: Option<ResponseKind>,
    #[serde(flatten)]
    pub definitions: Map<String, Value>,
}

impl RegistrationBody {
    /// The path in the URL takes precedence over a `path` key in the body
    pub fn into_command(self, url_path: Option<String>) -> Result<RegisterCommand, MockError> {
        let path = url_path
            .or(self.path)
            .ok_or_else(|| MockError::MalformedInput("registration needs a path".to_string()))?;
        let method: HttpMethod = self.method.parse()?;
        check_status(self.status)?;

        let mut command = RegisterCommand::new(path, method, self.request, self.response)
            .with_definitions(self.definitions);
        command.status = self.status;
        command.request_kind = self.request_kind;
        command.response_kind = self.response_kind;
        Ok(command)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MethodFilter {
    #[serde(default)]
    pub method: Option<String>,
}

impl MethodFilter {
    fn parse(&self) -> Result<Option<HttpMethod>, MockError> {
        self.method.as_deref().map(str::parse).transpose()
    }
}

fn parse_body(bytes: &Bytes) -> Result<Option<Value>, MockError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(bytes)
        .map(Some)
        .map_err(|e| MockError::MalformedInput(format!("body is not valid JSON: {}", e)))
}

fn parse_json<T: serde::de::DeserializeOwned>(bytes: &Bytes) -> Result<T, MockError> {
    serde_json::from_slice(bytes).map_err(|e| MockError::MalformedInput(e.to_string()))
}

/// Percent-decode a request path so templates like `/pet/{id}` survive the URL
fn decode_path(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Contract path addressed by an administrative URL under `/contracts`
fn contract_path(uri: &Uri) -> String {
    let raw = uri.path();
    let suffix = raw.strip_prefix("/contracts").unwrap_or(raw);
    let decoded = decode_path(suffix);
    if decoded.is_empty() {
        "/".to_string()
    } else {
        decoded
    }
}

/// Split `/a/b/<uuid>` into (`/a/b`, uuid) when the last segment is an id
fn split_instance_id(path: &str) -> Option<(String, Uuid)> {
    let trimmed = path.trim_end_matches('/');
    let (parent, last) = trimmed.rsplit_once('/')?;
    let id = Uuid::parse_str(last).ok()?;
    let parent = if parent.is_empty() { "/" } else { parent };
    Some((parent.to_string(), id))
}

// ============================================================================
// Health & Metrics
// ============================================================================

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    state.health_handler.health().await
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics_handler.metrics().await
}

// ============================================================================
// Contracts
// ============================================================================

pub async fn list_contracts(State(state): State<AppState>) -> impl IntoResponse {
    let contracts = state.registry.list_contracts().await;
    (StatusCode::OK, Json(ApiResponse::success(contracts)))
}

/// `POST /contracts` with the path given in the body
pub async fn register_contract(State(state): State<AppState>, body: Bytes) -> Response {
    match register(&state, None, &body).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

/// Every method on `/contracts/{path...}`
pub async fn contract_route(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    Query(filter): Query<MethodFilter>,
    body: Bytes,
) -> Response {
    let path = contract_path(&uri);
    let result = match method {
        Method::POST => register(&state, Some(path), &body).await,
        Method::GET => get_contract(&state, &path, &filter).await,
        Method::PUT => update_instance(&state, &path, &filter, &body).await,
        Method::DELETE => delete_contract(&state, &path, &filter).await,
        other => Err(MockError::MethodNotAllowed {
            path,
            method: other.to_string(),
            allowed: vec![HttpMethod::Get, HttpMethod::Post, HttpMethod::Put, HttpMethod::Delete],
        }),
    };
    result.unwrap_or_else(IntoResponse::into_response)
}

async fn register(state: &AppState, url_path: Option<String>, body: &Bytes) -> Result<Response, MockError> {
    let command = parse_json::<RegistrationBody>(body)?.into_command(url_path)?;
    let instance = state.registry.register(command).await?;
    state.metrics.registrations_total.inc();
    state.refresh_contract_gauge().await;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(instance))).into_response())
}

async fn get_contract(state: &AppState, path: &str, filter: &MethodFilter) -> Result<Response, MockError> {
    let method = filter.parse()?;
    if let Some((parent, id)) = split_instance_id(path) {
        match state.registry.get_instance(&parent, method, id).await {
            Ok(instance) => return Ok((StatusCode::OK, Json(ApiResponse::success(instance))).into_response()),
            Err(MockError::NotFound(_)) => {
                debug!(path = %path, "No instance with that id, listing the full path");
            }
            Err(e) => return Err(e),
        }
    }
    let contracts = state.registry.list_instances(path, method).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(contracts))).into_response())
}

async fn update_instance(
    state: &AppState,
    path: &str,
    filter: &MethodFilter,
    body: &Bytes,
) -> Result<Response, MockError> {
    let method = filter.parse()?;
    let (parent, id) = split_instance_id(path)
        .ok_or_else(|| MockError::MalformedInput("update needs an instance id as the last segment".to_string()))?;
    let patch: InstancePatch = parse_json(body)?;
    let instance = state.registry.update(&parent, method, id, patch).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(instance))).into_response())
}

async fn delete_contract(state: &AppState, path: &str, filter: &MethodFilter) -> Result<Response, MockError> {
    let method = filter.parse()?;
    let outcome = match split_instance_id(path) {
        Some((parent, id)) => match state.registry.delete(&parent, method, DeleteScope::Instance(id)).await {
            Err(MockError::NotFound(_)) => state.registry.delete(path, method, DeleteScope::Path).await?,
            other => other?,
        },
        None => state.registry.delete(path, method, DeleteScope::Path).await?,
    };
    state.refresh_contract_gauge().await;
    Ok((StatusCode::OK, Json(ApiResponse::success(outcome))).into_response())
}

// ============================================================================
// Import
// ============================================================================

pub async fn import_openapi(State(state): State<AppState>, body: Bytes) -> Response {
    let result = async {
        let document = openapi::parse_document(&body)?;
        let report = state.registry.import_openapi(&document).await?;
        state
            .metrics
            .registrations_total
            .inc_by(report.registered.len() as u64);
        state.refresh_contract_gauge().await;
        Ok::<_, MockError>(report)
    }
    .await;

    match result {
        Ok(report) => (StatusCode::OK, Json(ApiResponse::success(report))).into_response(),
        Err(e) => e.into_response(),
    }
}

// ============================================================================
// Mocked endpoints
// ============================================================================

/// Fallback for everything outside the administrative prefix
pub async fn handle_mock(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    Query(query): Query<BTreeMap<String, String>>,
    body: Bytes,
) -> Response {
    let path = decode_path(uri.path());
    let result = async {
        let parsed: HttpMethod = method.as_str().parse().map_err(|_| MockError::MethodNotAllowed {
            path: path.clone(),
            method: method.to_string(),
            allowed: Vec::new(),
        })?;
        let mut request = MockRequest::new(parsed, path.clone()).with_query(query);
        request.body = parse_body(&body)?;
        state.registry.handle(request).await
    }
    .await;

    match result {
        Ok(response) => {
            let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
            state
                .metrics
                .requests_total
                .with_label_values(&[method.as_str(), status.as_str()])
                .inc();
            state
                .metrics
                .responses_total
                .with_label_values(&[response.source.as_str()])
                .inc();
            (status, Json(response.body)).into_response()
        }
        Err(e) => {
            if matches!(e, MockError::Validation(_)) {
                state.metrics.validation_rejections.inc();
            }
            state
                .metrics
                .requests_total
                .with_label_values(&[method.as_str(), e.status_code().as_str()])
                .inc();
            e.into_response()
        }
    }
}
