use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::catalog::{DeliveryTerms, Item, PlatformId, ProductCandidate};
use crate::domain::order::{FulfilmentState, OrderConfirmation, OrderLine, PlatformOrderStatus};
use crate::platform::session::SessionTracker;
use crate::platform::{PlatformClient, PlatformError};

/// Outcome consumed by one `place_order` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptedPlacement {
    Confirm,
    RetryableFailure(String),
    PermanentFailure(String),
}

#[derive(Clone, Debug)]
struct PlacedOrder {
    estimated_delivery: DateTime<Utc>,
    polls: usize,
}

/// Deterministic platform used by tests, the smoke command and the simulated driver.
///
/// Catalog lookups match item names case-insensitively. Placement outcomes are
/// consumed in order and default to `Confirm` once the script runs out. Status
/// polls walk the status script per order and stay on its last entry.
pub struct InMemoryPlatformClient {
    id: PlatformId,
    terms: DeliveryTerms,
    catalog: HashMap<String, Vec<ProductCandidate>>,
    search_latency: Duration,
    search_failure: Option<String>,
    placement_script: Mutex<VecDeque<ScriptedPlacement>>,
    status_script: Vec<FulfilmentState>,
    placed: Mutex<HashMap<String, PlacedOrder>>,
    place_calls: AtomicUsize,
    sessions: SessionTracker,
}

impl InMemoryPlatformClient {
    pub fn new(id: PlatformId, terms: DeliveryTerms) -> Self {
        Self {
            sessions: SessionTracker::new(id.clone()),
            id,
            terms,
            catalog: HashMap::new(),
            search_latency: Duration::ZERO,
            search_failure: None,
            placement_script: Mutex::new(VecDeque::new()),
            status_script: vec![
                FulfilmentState::Confirmed,
                FulfilmentState::OutForDelivery,
                FulfilmentState::Delivered,
            ],
            placed: Mutex::new(HashMap::new()),
            place_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_product(
        self,
        item: &str,
        name: &str,
        unit_price: Decimal,
        rating: Decimal,
    ) -> Self {
        let candidate = ProductCandidate {
            platform: self.id.clone(),
            name: name.to_owned(),
            unit_price,
            unit: None,
            available: true,
            rating: ProductCandidate::clamp_rating(rating),
            product_url: None,
        };
        self.with_candidate(item, candidate)
    }

    pub fn with_candidate(mut self, item: &str, candidate: ProductCandidate) -> Self {
        self.catalog.entry(catalog_key(item)).or_default().push(candidate);
        self
    }

    pub fn with_search_latency(mut self, latency: Duration) -> Self {
        self.search_latency = latency;
        self
    }

    pub fn with_failing_search(mut self, reason: impl Into<String>) -> Self {
        self.search_failure = Some(reason.into());
        self
    }

    pub fn with_placement_script(self, script: Vec<ScriptedPlacement>) -> Self {
        Self { placement_script: Mutex::new(script.into()), ..self }
    }

    pub fn with_status_script(mut self, script: Vec<FulfilmentState>) -> Self {
        self.status_script = script;
        self
    }

    pub fn place_order_calls(&self) -> usize {
        self.place_calls.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    fn next_placement(&self) -> ScriptedPlacement {
        match self.placement_script.lock() {
            Ok(mut script) => script.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        }
        .unwrap_or(ScriptedPlacement::Confirm)
    }
}

fn catalog_key(item: &str) -> String {
    item.trim().to_lowercase()
}

#[async_trait]
impl PlatformClient for InMemoryPlatformClient {
    fn id(&self) -> &PlatformId {
        &self.id
    }

    fn delivery_terms(&self) -> DeliveryTerms {
        self.terms
    }

    async fn search(&self, item: &Item) -> Result<Vec<ProductCandidate>, PlatformError> {
        let _session = self.sessions.open("search");
        if !self.search_latency.is_zero() {
            tokio::time::sleep(self.search_latency).await;
        }
        if let Some(reason) = &self.search_failure {
            return Err(PlatformError::Unavailable {
                platform: self.id.clone(),
                reason: reason.clone(),
            });
        }

        Ok(self.catalog.get(&catalog_key(&item.name)).cloned().unwrap_or_default())
    }

    async fn place_order(
        &self,
        lines: &[OrderLine],
        user_id: &str,
    ) -> Result<OrderConfirmation, PlatformError> {
        let _session = self.sessions.open("place_order");
        let call = self.place_calls.fetch_add(1, Ordering::SeqCst) + 1;

        match self.next_placement() {
            ScriptedPlacement::Confirm => {}
            ScriptedPlacement::RetryableFailure(reason) => {
                return Err(PlatformError::OrderPlacementFailed {
                    platform: self.id.clone(),
                    retryable: true,
                    reason,
                });
            }
            ScriptedPlacement::PermanentFailure(reason) => {
                return Err(PlatformError::OrderPlacementFailed {
                    platform: self.id.clone(),
                    retryable: false,
                    reason,
                });
            }
        }

        let platform_order_id = format!("{}-{call:04}", self.id.as_str().to_uppercase());
        let estimated_delivery =
            Utc::now() + chrono::Duration::minutes(i64::from(self.terms.eta_minutes));
        match self.placed.lock() {
            Ok(mut placed) => placed.insert(
                platform_order_id.clone(),
                PlacedOrder { estimated_delivery, polls: 0 },
            ),
            Err(poisoned) => poisoned.into_inner().insert(
                platform_order_id.clone(),
                PlacedOrder { estimated_delivery, polls: 0 },
            ),
        };

        tracing::debug!(
            event_name = "platform.simulated_order_placed",
            platform = %self.id,
            platform_order_id = %platform_order_id,
            user_id,
            line_count = lines.len(),
            "simulated order placed"
        );

        let tracking_handle =
            format!("https://track.quickpick.local/{}/{platform_order_id}", self.id);
        Ok(OrderConfirmation {
            tracking_handle,
            platform_order_id,
            estimated_delivery,
        })
    }

    async fn get_status(
        &self,
        platform_order_id: &str,
    ) -> Result<PlatformOrderStatus, PlatformError> {
        let _session = self.sessions.open("get_status");
        let mut placed = match self.placed.lock() {
            Ok(placed) => placed,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(order) = placed.get_mut(platform_order_id) else {
            return Err(PlatformError::OrderNotFound {
                platform: self.id.clone(),
                order_id: platform_order_id.to_owned(),
            });
        };

        let state = self
            .status_script
            .get(order.polls)
            .or_else(|| self.status_script.last())
            .copied()
            .unwrap_or(FulfilmentState::Confirmed);
        order.polls += 1;

        let delivery_person = matches!(state, FulfilmentState::OutForDelivery)
            .then(|| format!("{} rider", self.id.as_str()));

        Ok(PlatformOrderStatus {
            state,
            estimated_delivery: Some(order.estimated_delivery),
            delivery_person,
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::catalog::{DeliveryTerms, Item, PlatformId};
    use crate::domain::order::FulfilmentState;
    use crate::platform::{PlatformClient, PlatformError};

    use super::{InMemoryPlatformClient, ScriptedPlacement};

    fn zepto() -> InMemoryPlatformClient {
        InMemoryPlatformClient::new(
            PlatformId::new("zepto"),
            DeliveryTerms { fee: Decimal::ZERO, eta_minutes: 10 },
        )
        .with_product("Milk", "Amul Taaza 500ml", Decimal::new(2900, 2), Decimal::new(45, 1))
    }

    #[tokio::test]
    async fn search_matches_case_insensitively_and_misses_return_empty() {
        let client = zepto();

        let hits = client.search(&Item::new("milk")).await.expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].platform, PlatformId::new("zepto"));

        let misses = client.search(&Item::new("saffron")).await.expect("search");
        assert!(misses.is_empty());
        assert_eq!(client.sessions().active(), 0);
        assert_eq!(client.sessions().opened(), 2);
    }

    #[tokio::test]
    async fn failing_search_reports_unavailable() {
        let client = zepto().with_failing_search("storefront returned 503");
        let error = client.search(&Item::new("milk")).await.expect_err("unavailable");
        assert!(matches!(error, PlatformError::Unavailable { .. }));
        assert_eq!(client.sessions().active(), 0);
    }

    #[tokio::test]
    async fn placement_script_is_consumed_in_order() {
        let client = zepto().with_placement_script(vec![
            ScriptedPlacement::RetryableFailure("timeout".to_owned()),
            ScriptedPlacement::PermanentFailure("out of stock".to_owned()),
        ]);

        let first = client.place_order(&[], "user-1").await.expect_err("first");
        assert!(first.is_retryable());
        let second = client.place_order(&[], "user-1").await.expect_err("second");
        assert!(!second.is_retryable());
        let third = client.place_order(&[], "user-1").await.expect("third confirms");
        assert_eq!(third.platform_order_id, "ZEPTO-0003");
        assert_eq!(client.place_order_calls(), 3);
    }

    #[tokio::test]
    async fn status_polls_walk_the_script_and_stay_on_last_state() {
        let client = zepto();
        let confirmation = client.place_order(&[], "user-1").await.expect("placed");

        let mut states = Vec::new();
        for _ in 0..4 {
            states.push(
                client.get_status(&confirmation.platform_order_id).await.expect("status").state,
            );
        }
        assert_eq!(
            states,
            vec![
                FulfilmentState::Confirmed,
                FulfilmentState::OutForDelivery,
                FulfilmentState::Delivered,
                FulfilmentState::Delivered,
            ]
        );

        let missing = client.get_status("ZEPTO-9999").await.expect_err("unknown order");
        assert!(matches!(missing, PlatformError::OrderNotFound { .. }));
    }
}
