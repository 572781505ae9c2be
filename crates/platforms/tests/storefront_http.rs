use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use quickpick_core::config::PlatformEndpoint;
use quickpick_core::domain::catalog::{Item, PlatformId};
use quickpick_core::domain::order::{FulfilmentState, OrderLine};
use quickpick_core::platform::{PlatformClient, PlatformError};
use quickpick_platforms::{Blinkit, StorefrontClient};
use rust_decimal::Decimal;
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct MockStore {
    order_posts: Arc<AtomicUsize>,
}

async fn search(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let query = params.get("q").cloned().unwrap_or_default();
    if query != "milk" {
        return Json(json!({ "products": [] }));
    }
    Json(json!({
        "products": [
            {"name": "Amul Gold Milk", "price": "₹34", "unit": "500 ml",
             "rating": "4.6 (3k)", "inventory": 40},
            {"name": "Amul Taaza Milk", "price": "₹29", "unit": "500 ml",
             "rating": "4.4", "inventory": 0}
        ]
    }))
}

async fn place(
    State(store): State<MockStore>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let attempt = store.order_posts.fetch_add(1, Ordering::SeqCst) + 1;
    if attempt == 1 {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "checkout busy" })));
    }
    if body["items"].as_array().map_or(true, Vec::is_empty) {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "error": "empty cart" })));
    }
    (
        StatusCode::CREATED,
        Json(json!({
            "order_id": "BLK-778",
            "estimated_delivery": "2026-10-18T10:15:00Z"
        })),
    )
}

async fn status(Path(order_id): Path<String>) -> (StatusCode, Json<Value>) {
    if order_id != "BLK-778" {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown order" })));
    }
    (
        StatusCode::OK,
        Json(json!({ "status": "Out for delivery", "delivery_person": "Ravi" })),
    )
}

async fn spawn_store() -> (String, MockStore) {
    let store = MockStore::default();
    let router = Router::new()
        .route("/search", get(search))
        .route("/api/orders", post(place))
        .route("/api/orders/{order_id}", get(status))
        .with_state(store.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind mock store");
    let address = listener.local_addr().expect("mock store address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    (format!("http://{address}"), store)
}

fn client(base_url: &str) -> StorefrontClient<Blinkit> {
    let endpoint = PlatformEndpoint {
        base_url: base_url.to_owned(),
        delivery_fee: Decimal::ZERO,
        eta_minutes: 10,
        api_token: Some("mock-token".to_owned().into()),
    };
    StorefrontClient::new(PlatformId::new("blinkit"), Blinkit, &endpoint, reqwest::Client::new())
}

fn milk_line() -> OrderLine {
    OrderLine {
        item: Item::new("milk"),
        product_name: "Amul Gold Milk".to_owned(),
        quantity: 2,
        unit_price: Decimal::from(34),
    }
}

#[tokio::test]
async fn search_round_trip_parses_storefront_payload() {
    let (base_url, _store) = spawn_store().await;
    let client = client(&base_url);

    let candidates = client.search(&Item::new("milk")).await.expect("search succeeds");
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].unit_price, Decimal::from(34));
    assert!(!candidates[1].available);

    let misses = client.search(&Item::new("saffron")).await.expect("search succeeds");
    assert!(misses.is_empty());
    assert_eq!(client.sessions().active(), 0);
    assert_eq!(client.sessions().opened(), 2);
}

#[tokio::test]
async fn placement_classifies_transient_failures_then_confirms() {
    let (base_url, store) = spawn_store().await;
    let client = client(&base_url);

    let first = client.place_order(&[milk_line()], "user-1").await.expect_err("503 first");
    assert!(first.is_retryable());

    let confirmation = client.place_order(&[milk_line()], "user-1").await.expect("confirmed");
    assert_eq!(confirmation.platform_order_id, "BLK-778");
    assert_eq!(confirmation.tracking_handle, format!("{base_url}/api/orders/BLK-778"));

    let rejected = client.place_order(&[], "user-1").await.expect_err("empty cart");
    assert!(!rejected.is_retryable());
    assert_eq!(store.order_posts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn status_maps_platform_vocabulary_and_missing_orders() {
    let (base_url, _store) = spawn_store().await;
    let client = client(&base_url);

    let status = client.get_status("BLK-778").await.expect("status");
    assert_eq!(status.state, FulfilmentState::OutForDelivery);
    assert_eq!(status.delivery_person.as_deref(), Some("Ravi"));

    let missing = client.get_status("BLK-000").await.expect_err("unknown order");
    assert!(matches!(missing, PlatformError::OrderNotFound { .. }));
}

#[tokio::test]
async fn unreachable_storefront_is_unavailable() {
    let client = client("http://127.0.0.1:9");
    let error = client.search(&Item::new("milk")).await.expect_err("connection refused");
    assert!(matches!(error, PlatformError::Unavailable { .. }));
    assert_eq!(client.sessions().active(), 0);
}
