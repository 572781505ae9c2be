//! Order lifecycle driver: compare, decide, place, track.
//!
//! Orders live in an in-process table. The table lock is only held for lookups
//! and inserts, never across an await; each order carries its own mutex that is
//! held across a whole approval or status refresh, so one order is never placed
//! twice while unrelated orders proceed in parallel. Lock order is always order
//! mutex before table lock, never the reverse.
//!
//! Finished orders stay queryable until the retention limit pushes them out,
//! oldest first.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::aggregator::CatalogAggregator;
use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::catalog::Item;
use crate::domain::order::{
    FulfilmentState, Order, OrderFailure, OrderId, OrderLine, OrderStatus, PlatformOrderStatus,
};
use crate::domain::preference::PreferencePolicy;
use crate::domain::recommendation::Recommendation;
use crate::errors::{ApplicationError, DomainError};
use crate::flows::{FlowEngine, FlowEvent, OrderFlow, TransitionOutcome};
use crate::optimizer::DealOptimizer;
use crate::platform::{PlatformError, PlatformRegistry};

const ACTOR: &str = "order-orchestrator";

/// Finished orders kept for lookups unless configured otherwise.
pub const DEFAULT_TERMINAL_RETENTION: usize = 100;

/// Placement retry schedule. Attempts count the first call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            backoff_multiplier: 2,
            max_delay: Duration::from_millis(2_000),
        }
    }
}

impl RetrySettings {
    /// Delay after the `failed_attempt`-th failure (1-based).
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.saturating_pow(failed_attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompareRequest {
    pub items: Vec<String>,
    pub preferences: Option<PreferencePolicy>,
    pub user_id: String,
    pub auto_approve: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderDecision {
    AwaitingApproval(Order),
    Placed(Order),
    Failed { order: Order, error: PlatformError },
    /// The recommendation resolved nothing orderable; no order was created.
    NotPlaced { reason: String },
}

impl OrderDecision {
    pub fn order(&self) -> Option<&Order> {
        match self {
            Self::AwaitingApproval(order) | Self::Placed(order) | Self::Failed { order, .. } => {
                Some(order)
            }
            Self::NotPlaced { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompareOutcome {
    pub recommendation: Recommendation,
    pub decision: OrderDecision,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Placed(Order),
    Rejected(Order),
    Failed { order: Order, error: PlatformError },
}

impl ApprovalOutcome {
    pub fn order(&self) -> &Order {
        match self {
            Self::Placed(order) | Self::Rejected(order) | Self::Failed { order, .. } => order,
        }
    }
}

enum Placement {
    Confirmed,
    Failed(PlatformError),
}

#[derive(Default)]
struct OrderTable {
    orders: HashMap<OrderId, Arc<Mutex<Order>>>,
    aliases: HashMap<String, OrderId>,
    finished: VecDeque<(OrderId, Option<String>)>,
}

impl OrderTable {
    fn resolve(&self, order_id: &OrderId) -> Option<Arc<Mutex<Order>>> {
        let local_id = self.aliases.get(&order_id.0).unwrap_or(order_id);
        self.orders.get(local_id).cloned()
    }

    /// Records a finished order and drops the oldest finished ones beyond `limit`.
    fn retire(&mut self, order: &Order, limit: usize) -> Vec<OrderId> {
        self.finished.push_back((order.id.clone(), order.platform_order_id.clone()));
        let mut evicted = Vec::new();
        while self.finished.len() > limit {
            let Some((id, alias)) = self.finished.pop_front() else {
                break;
            };
            self.orders.remove(&id);
            if let Some(alias) = alias {
                self.aliases.remove(&alias);
            }
            evicted.push(id);
        }
        evicted
    }
}

/// Exclusive hold on an order while its placement runs.
///
/// Dropped without [`PlacementGuard::settle`] means the caller went away mid
/// placement: the order is failed instead of being left pending.
struct PlacementGuard<'a> {
    orchestrator: &'a OrderOrchestrator,
    order: OwnedMutexGuard<Order>,
    audit: AuditContext,
    settled: bool,
}

impl PlacementGuard<'_> {
    fn settle(mut self) -> Order {
        self.settled = true;
        self.order.clone()
    }
}

impl Drop for PlacementGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.orchestrator.abandon_placement(&mut self.order, &self.audit);
        }
    }
}

pub struct OrderOrchestrator {
    aggregator: CatalogAggregator,
    optimizer: DealOptimizer,
    flow: FlowEngine<OrderFlow>,
    default_policy: PreferencePolicy,
    retry: RetrySettings,
    retention: usize,
    audit: Arc<dyn AuditSink>,
    table: RwLock<OrderTable>,
}

impl OrderOrchestrator {
    pub fn new(
        aggregator: CatalogAggregator,
        default_policy: PreferencePolicy,
        retry: RetrySettings,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            aggregator,
            optimizer: DealOptimizer::new(),
            flow: FlowEngine::default(),
            default_policy,
            retry,
            retention: DEFAULT_TERMINAL_RETENTION,
            audit,
            table: RwLock::new(OrderTable::default()),
        }
    }

    /// Caps how many delivered, failed or rejected orders stay queryable.
    pub fn with_terminal_retention(mut self, limit: usize) -> Self {
        self.retention = limit.max(1);
        self
    }

    pub fn registry(&self) -> &PlatformRegistry {
        self.aggregator.registry()
    }

    pub fn default_policy(&self) -> &PreferencePolicy {
        &self.default_policy
    }

    pub fn terminal_retention(&self) -> usize {
        self.retention
    }

    /// Runs a comparison, records the draft order and either routes it for approval
    /// or places it straight away.
    ///
    /// When the winning quote resolved none of the items the recommendation is still
    /// returned, with [`OrderDecision::NotPlaced`] and no order recorded.
    pub async fn compare_and_decide(
        &self,
        request: CompareRequest,
        correlation_id: &str,
    ) -> Result<CompareOutcome, ApplicationError> {
        let user_id = request.user_id.trim();
        if user_id.is_empty() {
            return Err(ApplicationError::InvalidRequest("user_id must not be blank".to_owned()));
        }
        if request.items.is_empty() {
            return Err(ApplicationError::InvalidRequest(
                "at least one item is required".to_owned(),
            ));
        }
        let policy = request.preferences.unwrap_or_else(|| self.default_policy.clone());
        policy.validate()?;
        let items =
            request.items.iter().map(|raw| Item::parse(raw)).collect::<Result<Vec<_>, _>>()?;

        let quotes =
            self.aggregator.collect_quotes(&items, policy.delivery_priority, correlation_id).await;
        let recommendation = self.optimizer.recommend(&quotes, &policy)?;
        let winner = quotes.get(&recommendation.best_platform).ok_or_else(|| {
            DomainError::InvariantViolation(format!(
                "recommended platform `{}` has no quote",
                recommendation.best_platform
            ))
        })?;
        if winner.items.is_empty() {
            warn!(
                event_name = "orchestrator.nothing_resolved",
                correlation_id,
                platforms = quotes.len(),
                "no platform resolved any requested item"
            );
            return Ok(CompareOutcome {
                recommendation,
                decision: OrderDecision::NotPlaced {
                    reason: "no platform resolved any requested item".to_owned(),
                },
            });
        }

        let mut order = Order::draft(
            user_id,
            winner.platform.clone(),
            winner.items.iter().map(OrderLine::from).collect(),
            winner.delivery_fee,
        );
        let audit = AuditContext::new(
            Some(order.id.clone()),
            Some(order.user_id.clone()),
            correlation_id,
            ACTOR,
        );
        self.advance(&mut order, FlowEvent::QuotesCompared, &audit)?;

        let blockers = auto_order_blockers(
            request.auto_approve,
            recommendation.savings,
            &policy,
            recommendation.partial,
        );
        self.audit.emit(
            AuditEvent::new(
                &audit,
                "comparison.completed",
                AuditCategory::Comparison,
                AuditOutcome::Success,
            )
            .with_metadata("best_platform", recommendation.best_platform.as_str())
            .with_metadata("savings", recommendation.savings.to_string())
            .with_metadata("partial", recommendation.partial.to_string())
            .with_metadata("auto_order_blockers", blockers.join("; ")),
        );
        info!(
            event_name = "orchestrator.comparison_completed",
            correlation_id,
            order_id = %order.id,
            best_platform = %recommendation.best_platform,
            savings = %recommendation.savings,
            auto_order = blockers.is_empty(),
            "comparison completed"
        );

        if !blockers.is_empty() {
            self.advance(&mut order, FlowEvent::ApprovalRequired, &audit)?;
            self.insert(order.clone());
            return Ok(CompareOutcome {
                recommendation,
                decision: OrderDecision::AwaitingApproval(order),
            });
        }

        self.advance(&mut order, FlowEvent::AutoOrderQualified, &audit)?;
        let handle = self.insert(order);
        let mut placement = PlacementGuard {
            orchestrator: self,
            order: handle.lock_owned().await,
            audit,
            settled: false,
        };
        let placed = self.place(&mut placement.order, &placement.audit).await;
        let order = placement.settle();
        let decision = match placed? {
            Placement::Confirmed => OrderDecision::Placed(order),
            Placement::Failed(error) => OrderDecision::Failed { order, error },
        };

        Ok(CompareOutcome { recommendation, decision })
    }

    /// Resolves an order waiting for approval. Rejection never reaches the platform.
    pub async fn approve(
        &self,
        order_id: &OrderId,
        user_id: &str,
        approved: bool,
        correlation_id: &str,
    ) -> Result<ApprovalOutcome, ApplicationError> {
        let handle = self.owned_order(order_id, user_id).await?;
        let mut order = handle.lock_owned().await;
        let audit = AuditContext::new(
            Some(order.id.clone()),
            Some(order.user_id.clone()),
            correlation_id,
            ACTOR,
        );

        if !approved {
            self.advance(&mut order, FlowEvent::ApprovalDenied, &audit)?;
            info!(
                event_name = "orchestrator.order_rejected",
                correlation_id,
                order_id = %order.id,
                "order rejected by user"
            );
            return Ok(ApprovalOutcome::Rejected(order.clone()));
        }

        self.advance(&mut order, FlowEvent::ApprovalGranted, &audit)?;
        let mut placement = PlacementGuard { orchestrator: self, order, audit, settled: false };
        let placed = self.place(&mut placement.order, &placement.audit).await;
        let order = placement.settle();
        match placed? {
            Placement::Confirmed => Ok(ApprovalOutcome::Placed(order)),
            Placement::Failed(error) => Ok(ApprovalOutcome::Failed { order, error }),
        }
    }

    /// Current view of an order, refreshed from the platform while it is in transit.
    ///
    /// Accepts the local id or the platform-issued id. A failed platform poll is
    /// logged and the last known state is returned.
    pub async fn get_order_status(
        &self,
        order_id: &OrderId,
        user_id: &str,
        correlation_id: &str,
    ) -> Result<Order, ApplicationError> {
        let handle = self.owned_order(order_id, user_id).await?;
        let mut order = handle.lock().await;
        if !order.status.is_tracking() {
            return Ok(order.clone());
        }

        let (Some(client), Some(platform_order_id)) =
            (self.registry().get(&order.platform), order.platform_order_id.clone())
        else {
            return Ok(order.clone());
        };

        match client.get_status(&platform_order_id).await {
            Ok(status) => {
                let audit = AuditContext::new(
                    Some(order.id.clone()),
                    Some(order.user_id.clone()),
                    correlation_id,
                    ACTOR,
                );
                self.apply_tracking(&mut order, &status, &audit)?;
            }
            Err(error) => warn!(
                event_name = "orchestrator.status_poll_failed",
                correlation_id,
                order_id = %order.id,
                platform = %order.platform,
                error = %error,
                "status poll failed; returning last known state"
            ),
        }

        Ok(order.clone())
    }

    /// Orders owned by `user_id`, newest first.
    pub async fn orders_for_user(&self, user_id: &str) -> Vec<Order> {
        let handles: Vec<_> = self.read_table().orders.values().cloned().collect();
        let mut orders = Vec::new();
        for handle in handles {
            let order = handle.lock().await;
            if order.user_id == user_id {
                orders.push(order.clone());
            }
        }
        orders.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| left.id.0.cmp(&right.id.0))
        });
        orders
    }

    fn read_table(&self) -> RwLockReadGuard<'_, OrderTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, OrderTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, order: Order) -> Arc<Mutex<Order>> {
        let id = order.id.clone();
        let handle = Arc::new(Mutex::new(order));
        self.write_table().orders.insert(id, Arc::clone(&handle));
        handle
    }

    async fn owned_order(
        &self,
        order_id: &OrderId,
        user_id: &str,
    ) -> Result<Arc<Mutex<Order>>, ApplicationError> {
        let handle = self
            .read_table()
            .resolve(order_id)
            .ok_or_else(|| ApplicationError::OrderNotFound(order_id.clone()))?;

        if handle.lock().await.user_id != user_id {
            return Err(ApplicationError::OrderNotFound(order_id.clone()));
        }
        Ok(handle)
    }

    async fn place(
        &self,
        order: &mut Order,
        audit: &AuditContext,
    ) -> Result<Placement, ApplicationError> {
        let Some(client) = self.registry().get(&order.platform) else {
            let error = PlatformError::Unavailable {
                platform: order.platform.clone(),
                reason: "platform is not configured".to_owned(),
            };
            return self.fail_placement(order, error, audit);
        };

        let max_attempts = self.retry.max_attempts.max(1);
        loop {
            order.placement_attempts += 1;
            let attempt = order.placement_attempts;
            match client.place_order(&order.lines, &order.user_id).await {
                Ok(confirmation) => {
                    let platform_order_id = confirmation.platform_order_id.clone();
                    order.record_confirmation(confirmation);
                    self.write_table()
                        .aliases
                        .insert(platform_order_id.clone(), order.id.clone());
                    self.advance(order, FlowEvent::PlacementConfirmed, audit)?;

                    info!(
                        event_name = "orchestrator.order_placed",
                        correlation_id = %audit.correlation_id,
                        order_id = %order.id,
                        platform = %order.platform,
                        platform_order_id = %platform_order_id,
                        attempts = attempt,
                        "order placed"
                    );
                    self.audit.emit(
                        AuditEvent::new(
                            audit,
                            "order.placed",
                            AuditCategory::Placement,
                            AuditOutcome::Success,
                        )
                        .with_metadata("platform_order_id", platform_order_id)
                        .with_metadata("attempts", attempt.to_string()),
                    );
                    return Ok(Placement::Confirmed);
                }
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        event_name = "orchestrator.placement_retry",
                        correlation_id = %audit.correlation_id,
                        order_id = %order.id,
                        platform = %order.platform,
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "retrying order placement"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return self.fail_placement(order, error, audit),
            }
        }
    }

    fn fail_placement(
        &self,
        order: &mut Order,
        error: PlatformError,
        audit: &AuditContext,
    ) -> Result<Placement, ApplicationError> {
        order.last_error = Some(OrderFailure {
            message: error.to_string(),
            retryable: error.is_retryable(),
            attempts: order.placement_attempts,
        });
        self.advance(order, FlowEvent::PlacementFailed, audit)?;

        warn!(
            event_name = "orchestrator.order_failed",
            correlation_id = %audit.correlation_id,
            order_id = %order.id,
            platform = %order.platform,
            attempts = order.placement_attempts,
            error = %error,
            "order placement failed"
        );
        self.audit.emit(
            AuditEvent::new(
                audit,
                "order.placement_failed",
                AuditCategory::Placement,
                AuditOutcome::Failed,
            )
            .with_metadata("error", error.to_string())
            .with_metadata("attempts", order.placement_attempts.to_string()),
        );
        Ok(Placement::Failed(error))
    }

    /// Fails an order whose placement was interrupted before it settled. The platform
    /// may or may not have accepted the in-flight call; the failure says so.
    fn abandon_placement(&self, order: &mut Order, audit: &AuditContext) {
        if !matches!(order.status, OrderStatus::AutoOrdered | OrderStatus::AwaitingApproval) {
            return;
        }
        let message = format!(
            "placement on `{}` was cancelled after {} attempt(s) before the platform confirmed",
            order.platform, order.placement_attempts
        );
        order.last_error = Some(OrderFailure {
            message: message.clone(),
            retryable: false,
            attempts: order.placement_attempts,
        });
        if let Err(error) = self.advance(order, FlowEvent::PlacementFailed, audit) {
            warn!(
                event_name = "orchestrator.abandon_rejected",
                correlation_id = %audit.correlation_id,
                order_id = %order.id,
                error = %error,
                "could not fail interrupted order"
            );
            return;
        }

        warn!(
            event_name = "orchestrator.placement_cancelled",
            correlation_id = %audit.correlation_id,
            order_id = %order.id,
            platform = %order.platform,
            attempts = order.placement_attempts,
            "order placement cancelled"
        );
        self.audit.emit(
            AuditEvent::new(
                audit,
                "order.placement_cancelled",
                AuditCategory::Placement,
                AuditOutcome::Failed,
            )
            .with_metadata("error", message)
            .with_metadata("attempts", order.placement_attempts.to_string()),
        );
    }

    fn apply_tracking(
        &self,
        order: &mut Order,
        status: &PlatformOrderStatus,
        audit: &AuditContext,
    ) -> Result<(), ApplicationError> {
        order.record_tracking(status);

        match status.state {
            FulfilmentState::Confirmed => {}
            FulfilmentState::OutForDelivery => {
                if order.status == OrderStatus::Placed {
                    self.advance(order, FlowEvent::DispatchReported, audit)?;
                }
            }
            FulfilmentState::Delivered => {
                if order.status == OrderStatus::Placed {
                    self.advance(order, FlowEvent::DispatchReported, audit)?;
                }
                self.advance(order, FlowEvent::DeliveryConfirmed, audit)?;
            }
            FulfilmentState::Cancelled => {
                order.last_error = Some(OrderFailure {
                    message: format!("platform `{}` cancelled the order", order.platform),
                    retryable: false,
                    attempts: order.placement_attempts,
                });
                self.advance(order, FlowEvent::CancellationReported, audit)?;
            }
        }

        self.audit.emit(
            AuditEvent::new(
                audit,
                "order.status_polled",
                AuditCategory::Tracking,
                AuditOutcome::Success,
            )
            .with_metadata("platform_state", format!("{:?}", status.state))
            .with_metadata("status", order.status.as_str()),
        );
        Ok(())
    }

    fn advance(
        &self,
        order: &mut Order,
        event: FlowEvent,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, ApplicationError> {
        let outcome = self
            .flow
            .apply_with_audit(&order.status, &event, self.audit.as_ref(), audit)
            .map_err(DomainError::from)?;
        if outcome.to != order.status {
            order.transition_to(outcome.to)?;
        }
        if order.status.is_terminal() {
            let evicted = self.write_table().retire(order, self.retention);
            if !evicted.is_empty() {
                debug!(
                    event_name = "orchestrator.orders_evicted",
                    correlation_id = %audit.correlation_id,
                    evicted = evicted.len(),
                    retention = self.retention,
                    "finished orders evicted"
                );
            }
        }
        Ok(outcome)
    }
}

fn auto_order_blockers(
    auto_approve: bool,
    savings: Decimal,
    policy: &PreferencePolicy,
    partial: bool,
) -> Vec<String> {
    let mut blockers = Vec::new();
    if !auto_approve {
        blockers.push("auto-approval was not requested".to_owned());
    }
    if savings < policy.auto_approve_savings_threshold {
        blockers.push(format!(
            "savings {savings} below auto-approve threshold {}",
            policy.auto_approve_savings_threshold
        ));
    }
    if partial {
        blockers.push("recommendation only covers part of the list".to_owned());
    }
    blockers
}
