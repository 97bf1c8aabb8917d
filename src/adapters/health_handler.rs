use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::application::ContractRegistry;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub contracts: usize,
}

pub struct HealthHandler {
    registry: Arc<ContractRegistry>,
    start_time: std::time::Instant,
}

impl HealthHandler {
    pub fn new(registry: Arc<ContractRegistry>) -> Self {
        Self {
            registry,
            start_time: std::time::Instant::now(),
        }
    }

    /// Returns 200 while the server is running
    pub async fn health(&self) -> impl IntoResponse {
        let status = HealthStatus {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            contracts: self.registry.contract_count().await,
        };

        (StatusCode::OK, Json(status))
    }
}
