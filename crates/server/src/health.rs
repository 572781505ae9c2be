use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use quickpick_core::config::PlatformDriver;
use quickpick_core::orchestrator::OrderOrchestrator;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    orchestrator: Arc<OrderOrchestrator>,
    driver: PlatformDriver,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub platforms: HealthCheck,
    pub driver: PlatformDriver,
    pub checked_at: String,
}

pub fn router(orchestrator: Arc<OrderOrchestrator>, driver: PlatformDriver) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { orchestrator, driver })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let platforms = platform_check(&state.orchestrator);
    let ready = platforms.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "quickpick-server runtime initialized".to_string(),
        },
        platforms,
        driver: state.driver,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

// Registry construction already rejects an empty platform list; this guards later wiring.
fn platform_check(orchestrator: &OrderOrchestrator) -> HealthCheck {
    let ids = orchestrator.registry().ids();
    if ids.is_empty() {
        return HealthCheck { status: "degraded", detail: "no platforms configured".to_string() };
    }
    let names: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
    HealthCheck { status: "ready", detail: format!("platforms enabled: {}", names.join(", ")) }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use quickpick_core::config::{AppConfig, PlatformDriver};

    use crate::bootstrap::bootstrap_with_config;
    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_reports_enabled_platforms() {
        let mut config = AppConfig::default();
        config.platforms.driver = PlatformDriver::Simulated;
        let app = bootstrap_with_config(config).expect("simulated bootstrap");

        let (status, Json(payload)) = health(State(HealthState {
            orchestrator: app.orchestrator.clone(),
            driver: app.config.platforms.driver,
        }))
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.driver, PlatformDriver::Simulated);
        assert_eq!(
            payload.platforms.detail,
            "platforms enabled: zepto, blinkit, instamart, bigbasket"
        );
    }
}
