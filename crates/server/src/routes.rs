//! JSON API for comparisons and orders.
//!
//! - `POST /v1/comparisons`                 compare a basket and decide the order path
//! - `GET  /v1/orders?user_id=`             list a user's orders, newest first
//! - `GET  /v1/orders/{order_id}?user_id=`  refresh and return order status
//! - `POST /v1/orders/{order_id}/approval`  approve or reject a pending order

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use quickpick_core::domain::order::{Order, OrderId};
use quickpick_core::domain::preference::{DeliveryPriority, PreferencePolicy};
use quickpick_core::domain::recommendation::{PlatformBreakdown, Recommendation};
use quickpick_core::errors::{ApplicationError, InterfaceError};
use quickpick_core::orchestrator::{
    ApprovalOutcome, CompareRequest, OrderDecision, OrderOrchestrator,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{error, info, warn};
use uuid::Uuid;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    orchestrator: Arc<OrderOrchestrator>,
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ComparisonRequest {
    pub items: Vec<String>,
    #[serde(default)]
    pub preferences: Option<PreferencePolicy>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub auto_approve: bool,
}

#[derive(Debug, Serialize)]
pub struct ComparisonResponse {
    pub action: &'static str,
    pub correlation_id: String,
    pub recommendation: RecommendationBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationBody {
    /// Keyed by platform, in configuration order.
    #[serde(serialize_with = "ordered_map")]
    pub platform_breakdown: Vec<(String, BreakdownBody)>,
    pub best_platform: String,
    pub priority: DeliveryPriority,
    pub savings: Decimal,
    pub summary: String,
    pub partial: bool,
    pub filters_relaxed: bool,
}

#[derive(Debug, Serialize)]
pub struct BreakdownBody {
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub delivery_time: u32,
    pub total: Decimal,
    pub average_rating: Decimal,
    pub items: Vec<LineBody>,
    pub complete: bool,
    pub eligible: bool,
    pub excluded_reason: Option<String>,
    pub issue: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LineBody {
    pub item: String,
    pub product: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

#[derive(Debug, Serialize)]
pub struct OrderBody {
    pub order_id: String,
    pub platform: String,
    pub items: Vec<LineBody>,
    pub total_amount: Decimal,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub tracking_url: Option<String>,
    pub status: &'static str,
    pub platform_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub order_id: String,
    pub status: &'static str,
    pub estimated_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_person: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApprovalRequest {
    pub approved: bool,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ApprovalResponse {
    Order(OrderBody),
    Rejected { order_id: String, status: &'static str },
}

#[derive(Debug, Serialize)]
pub struct OrdersResponse {
    pub orders: Vec<OrderBody>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: &'static str,
    pub message: String,
    pub correlation_id: String,
}

pub struct ApiError(InterfaceError);

impl ApiError {
    fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        Self(error.into_interface(correlation_id))
    }

    fn bad_request(message: impl Into<String>, correlation_id: &str) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: correlation_id.to_owned(),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.0 {
            InterfaceError::BadRequest { message, .. } => {
                (StatusCode::BAD_REQUEST, "bad_request", message.clone())
            }
            InterfaceError::NotFound { message, .. } => {
                (StatusCode::NOT_FOUND, "not_found", message.clone())
            }
            InterfaceError::ServiceUnavailable { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                self.0.user_message().to_owned(),
            ),
            InterfaceError::Internal { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", self.0.user_message().to_owned())
            }
        };

        if status.is_server_error() {
            error!(
                event_name = "api.request_failed",
                correlation_id = %self.0.correlation_id(),
                status = status.as_u16(),
                error = %self.0,
                "request failed"
            );
        } else {
            warn!(
                event_name = "api.request_rejected",
                correlation_id = %self.0.correlation_id(),
                status = status.as_u16(),
                error = %self.0,
                "request rejected"
            );
        }

        let body = ApiErrorBody {
            error: code,
            message,
            correlation_id: self.0.correlation_id().to_owned(),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(orchestrator: Arc<OrderOrchestrator>) -> Router {
    Router::new()
        .route("/v1/comparisons", post(create_comparison))
        .route("/v1/orders", get(list_orders))
        .route("/v1/orders/{order_id}", get(order_status))
        .route("/v1/orders/{order_id}/approval", post(resolve_approval))
        .with_state(ApiState { orchestrator })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn create_comparison(
    State(state): State<ApiState>,
    headers: HeaderMap,
    payload: Result<Json<ComparisonRequest>, JsonRejection>,
) -> Result<Json<ComparisonResponse>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let Json(body) = json_body(payload, &correlation_id)?;
    let request = CompareRequest {
        items: body.items,
        preferences: body.preferences,
        user_id: required_user(body.user_id, &correlation_id)?,
        auto_approve: body.auto_approve,
    };

    let outcome = state
        .orchestrator
        .compare_and_decide(request, &correlation_id)
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;

    let (action, reason) = match &outcome.decision {
        OrderDecision::AwaitingApproval(_) => ("awaiting_approval", None),
        OrderDecision::Placed(_) => ("order_placed", None),
        OrderDecision::Failed { .. } => ("order_failed", None),
        OrderDecision::NotPlaced { reason } => ("not_placed", Some(reason.clone())),
    };
    let order = outcome.decision.order();
    info!(
        event_name = "api.comparison_served",
        correlation_id = %correlation_id,
        action,
        order_id = order.map(|order| order.id.0.as_str()).unwrap_or("-"),
        "comparison served"
    );

    Ok(Json(ComparisonResponse {
        action,
        recommendation: recommendation_body(&outcome.recommendation),
        order: order.map(order_body),
        reason,
        correlation_id,
    }))
}

async fn list_orders(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<UserQuery>,
) -> Result<Json<OrdersResponse>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let user_id = required_user(query.user_id, &correlation_id)?;
    let orders = state.orchestrator.orders_for_user(&user_id).await;
    Ok(Json(OrdersResponse { orders: orders.iter().map(order_body).collect() }))
}

async fn order_status(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<StatusBody>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let user_id = required_user(query.user_id, &correlation_id)?;

    let order = state
        .orchestrator
        .get_order_status(&OrderId(order_id), &user_id, &correlation_id)
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;

    Ok(Json(StatusBody {
        order_id: order.id.0.clone(),
        status: order.status.as_str(),
        estimated_time: order.estimated_delivery,
        delivery_person: order.delivery_person.clone(),
    }))
}

async fn resolve_approval(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
    payload: Result<Json<ApprovalRequest>, JsonRejection>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let Json(body) = json_body(payload, &correlation_id)?;
    let user_id = required_user(body.user_id, &correlation_id)?;

    let outcome = state
        .orchestrator
        .approve(&OrderId(order_id), &user_id, body.approved, &correlation_id)
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;

    Ok(Json(match outcome {
        ApprovalOutcome::Rejected(order) => {
            ApprovalResponse::Rejected { order_id: order.id.0, status: order.status.as_str() }
        }
        ApprovalOutcome::Placed(order) | ApprovalOutcome::Failed { order, .. } => {
            ApprovalResponse::Order(order_body(&order))
        }
    }))
}

// ---------------------------------------------------------------------------
// Mapping helpers
// ---------------------------------------------------------------------------

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("req-{}", Uuid::new_v4().simple()))
}

fn required_user(user_id: Option<String>, correlation_id: &str) -> Result<String, ApiError> {
    match user_id.map(|user_id| user_id.trim().to_owned()) {
        Some(user_id) if !user_id.is_empty() => Ok(user_id),
        _ => Err(ApiError::bad_request("user_id is required", correlation_id)),
    }
}

fn json_body<T>(
    payload: Result<Json<T>, JsonRejection>,
    correlation_id: &str,
) -> Result<Json<T>, ApiError> {
    payload.map_err(|rejection| ApiError::bad_request(rejection.body_text(), correlation_id))
}

fn ordered_map<S: Serializer>(
    entries: &[(String, BreakdownBody)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(entries.iter().map(|(platform, body)| (platform, body)))
}

fn recommendation_body(recommendation: &Recommendation) -> RecommendationBody {
    RecommendationBody {
        platform_breakdown: recommendation
            .breakdown
            .iter()
            .map(|entry| (entry.platform.as_str().to_owned(), breakdown_body(entry)))
            .collect(),
        best_platform: recommendation.best_platform.as_str().to_owned(),
        priority: recommendation.priority,
        savings: recommendation.savings,
        summary: recommendation.summary.clone(),
        partial: recommendation.partial,
        filters_relaxed: recommendation.filters_relaxed,
    }
}

fn breakdown_body(entry: &PlatformBreakdown) -> BreakdownBody {
    BreakdownBody {
        subtotal: entry.subtotal,
        delivery_fee: entry.delivery_fee,
        delivery_time: entry.delivery_time_minutes,
        total: entry.total,
        average_rating: entry.average_rating,
        items: entry
            .items
            .iter()
            .map(|quoted| LineBody {
                item: quoted.item.name.clone(),
                product: quoted.candidate.name.clone(),
                quantity: quoted.item.quantity,
                unit_price: quoted.candidate.unit_price,
            })
            .collect(),
        complete: entry.complete,
        eligible: entry.eligible,
        excluded_reason: entry.excluded_reason.clone(),
        issue: entry.issue.clone(),
    }
}

fn order_body(order: &Order) -> OrderBody {
    OrderBody {
        order_id: order.id.0.clone(),
        platform: order.platform.as_str().to_owned(),
        items: order
            .lines
            .iter()
            .map(|line| LineBody {
                item: line.item.name.clone(),
                product: line.product_name.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect(),
        total_amount: order.total_amount,
        estimated_delivery: order.estimated_delivery,
        tracking_url: order.tracking_handle.clone(),
        status: order.status.as_str(),
        platform_order_id: order.platform_order_id.clone(),
        error: order.last_error.as_ref().map(|failure| failure.message.clone()),
    }
}
