//! # Proteus - schema-driven mock API server
//!
//! Proteus exposes HTTP endpoints from declared contracts. A contract names a
//! path template, a method, a request shape and a response shape. Incoming
//! requests are validated against the request shape and answered with a stored
//! example or a value synthesized from the response schema.
//!
//! ## Features
//!
//! - **Contracts**: register, patch and delete request/response pairs at runtime
//! - **References**: `$ref` pointers into the registration document or a named schema catalog
//! - **Synthesis**: random values that always satisfy the response schema
//! - **Validation**: every violation reported with its field path
//! - **OpenAPI import**: turn an OpenAPI 3 document into contracts
//! - **Persistence**: YAML or JSON contract store, flushed on every change
//! - **Metrics**: Prometheus metrics for monitoring
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use proteus::config::Settings;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load configuration
//!     let settings = Settings::new()?;
//!
//!     // Server will start on configured host:port
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! Proteus follows Hexagonal Architecture:
//! - **Domain**: Contract types, ports and errors
//! - **Application**: Resolver, synthesizer, validator, matcher and registry
//! - **Adapters**: HTTP surface, contract stores, metrics, LLM generation
//! - **Config**: Configuration management

pub mod adapters;
pub mod application;
pub mod cli;
pub mod config;
pub mod domain;

use crate::adapters::api_handler::{self, AppState};
use axum::{
    routing::{any, get, post},
    Router,
};

/// Creates the Axum application router.
///
/// # Arguments
///
/// * `state` - Shared registry, metrics and health handlers
/// * `admin_prefix` - Path under which administrative routes are mounted, e.g. `/__admin`
///
/// # Returns
///
/// Configured Axum Router; requests outside the prefix are answered from contracts
pub fn create_app(state: AppState, admin_prefix: &str) -> Router {
    let admin_router = Router::new()
        .route("/health", get(api_handler::health))
        .route("/metrics", get(api_handler::metrics))
        // Contracts
        .route("/contracts", get(api_handler::list_contracts).post(api_handler::register_contract))
        .route("/contracts/*path", any(api_handler::contract_route))
        // Import
        .route("/import/openapi", post(api_handler::import_openapi));

    let prefix = format!("/{}", admin_prefix.trim_matches('/'));

    Router::new()
        .nest(&prefix, admin_router)
        .fallback(api_handler::handle_mock)
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}
