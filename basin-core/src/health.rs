//! Liveness/readiness probes.
//!
//! | Path               | Description                               |
//! |--------------------|--------------------------------------------|
//! | `GET /health`      | Aggregated status — 200 if UP, 503 if DOWN |
//! | `GET /health/live` | Liveness probe — always 200                |
//! | `GET /health/ready`| Readiness probe — 200 if all checks pass   |

use std::sync::Arc;
use std::time::Instant;

use axum::response::IntoResponse;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down(String),
}

/// A named health indicator registered with the health plugin.
pub trait HealthIndicator: Send + Sync + 'static {
    fn name(&self) -> &str;
    fn check(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = HealthStatus> + Send + '_>>;

    /// Whether this check affects readiness (default `true`).
    fn affects_readiness(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthCheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthCheckStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthCheckStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<HealthCheck>,
    pub uptime_seconds: u64,
}

#[doc(hidden)]
pub struct HealthState {
    pub checks: Vec<Box<dyn HealthIndicator>>,
    pub start_time: Instant,
}

impl HealthState {
    pub async fn aggregate(&self, readiness_only: bool) -> HealthResponse {
        let mut checks = Vec::new();
        let mut all_up = true;
        for indicator in &self.checks {
            if readiness_only && !indicator.affects_readiness() {
                continue;
            }
            let status = indicator.check().await;
            let (check_status, reason) = match status {
                HealthStatus::Up => (HealthCheckStatus::Up, None),
                HealthStatus::Down(reason) => {
                    all_up = false;
                    (HealthCheckStatus::Down, Some(reason))
                }
            };
            checks.push(HealthCheck {
                name: indicator.name().to_string(),
                status: check_status,
                reason,
            });
        }
        HealthResponse {
            status: if all_up { HealthCheckStatus::Up } else { HealthCheckStatus::Down },
            checks,
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

pub(crate) async fn health_handler(
    state: axum::extract::Extension<Arc<HealthState>>,
) -> impl IntoResponse {
    let response = state.aggregate(false).await;
    let code = if response.status == HealthCheckStatus::Up {
        http::StatusCode::OK
    } else {
        http::StatusCode::SERVICE_UNAVAILABLE
    };
    (code, axum::Json(response))
}

pub(crate) async fn liveness_handler() -> impl IntoResponse {
    (http::StatusCode::OK, "OK")
}

pub(crate) async fn readiness_handler(
    state: axum::extract::Extension<Arc<HealthState>>,
) -> impl IntoResponse {
    let response = state.aggregate(true).await;
    let code = if response.status == HealthCheckStatus::Up {
        http::StatusCode::OK
    } else {
        http::StatusCode::SERVICE_UNAVAILABLE
    };
    (code, axum::Json(response))
}
