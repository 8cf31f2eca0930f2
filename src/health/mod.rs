/*!
 * # Health Check Module
 *
 * - Basic health check (`/health`): simple up/down status
 * - Readiness check (`/health/ready`): database reachable, SAP breaker state
 * - Liveness check (`/health/live`): process is alive
 *
 * SAP is never called from here; readiness reports whether it is configured
 * and what the circuit breaker currently thinks of it.
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::circuit_breaker::{CircuitBreaker, CircuitState};

/// Basic health status
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
    Degraded,
}

/// Health check detail
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct HealthDetail {
    pub status: HealthStatus,
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub details: BTreeMap<String, HealthDetail>,
}

/// Health check state
#[derive(Clone)]
pub struct HealthState {
    pub db_pool: Arc<DatabaseConnection>,
    pub sap_configured: bool,
    pub sap_breaker: CircuitBreaker,
    pub start_time: SystemTime,
}

impl HealthState {
    pub fn new(db_pool: Arc<DatabaseConnection>, sap_configured: bool, sap_breaker: CircuitBreaker) -> Self {
        Self {
            db_pool,
            sap_configured,
            sap_breaker,
            start_time: SystemTime::now(),
        }
    }

    /// Calculate system uptime
    pub fn uptime(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or(Duration::from_secs(0))
            .as_secs()
    }

    fn sap_detail(&self) -> HealthDetail {
        if !self.sap_configured {
            return HealthDetail {
                status: HealthStatus::Degraded,
                message: Some("SAP Service Layer is not configured".to_string()),
            };
        }
        let state = self.sap_breaker.state();
        HealthDetail {
            status: match state {
                CircuitState::Closed => HealthStatus::Up,
                CircuitState::HalfOpen | CircuitState::Open => HealthStatus::Degraded,
            },
            message: Some(format!("circuit {}", state.as_str())),
        }
    }

    pub async fn check(&self) -> HealthInfo {
        let mut details = BTreeMap::new();

        details.insert(
            "database".to_string(),
            match crate::db::check_connection(&self.db_pool).await {
                Ok(_) => HealthDetail {
                    status: HealthStatus::Up,
                    message: None,
                },
                Err(e) => {
                    error!("Database health check failed: {}", e);
                    HealthDetail {
                        status: HealthStatus::Down,
                        message: Some("database unreachable".to_string()),
                    }
                }
            },
        );
        details.insert("sap".to_string(), self.sap_detail());

        let status = if details.values().any(|d| d.status == HealthStatus::Down) {
            HealthStatus::Down
        } else if details.values().any(|d| d.status == HealthStatus::Degraded) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Up
        };

        HealthInfo {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            uptime_seconds: self.uptime(),
            details,
        }
    }
}

fn status_code(status: HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Up | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Basic health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up")),
    tag = "health"
)]
pub async fn health_check() -> impl IntoResponse {
    debug!("Health check endpoint called");
    (
        StatusCode::OK,
        Json(json!({
            "status": HealthStatus::Up,
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/health/ready",
    responses(
        (status = 200, description = "Ready to serve", body = HealthInfo),
        (status = 503, description = "A dependency is down", body = HealthInfo)
    ),
    tag = "health"
)]
pub async fn readiness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let health = state.check().await;
    (status_code(health.status), Json(health))
}

/// Liveness check endpoint
#[utoipa::path(
    get,
    path = "/health/live",
    responses((status = 200, description = "Process is alive")),
    tag = "health"
)]
pub async fn liveness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "alive": true,
            "uptime_seconds": state.uptime(),
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}

/// Returns build and version information
pub async fn version_info() -> impl IntoResponse {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "commit": option_env!("GIT_HASH").unwrap_or("unknown"),
    }))
}

/// Creates router with health check endpoints
pub fn health_routes(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
        .route("/version", get(version_info))
        .with_state(state)
}
