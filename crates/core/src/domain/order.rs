use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::catalog::{Item, PlatformId};
use crate::domain::quote::QuotedItem;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    /// Locally generated id used while the platform has not issued one.
    pub fn pending() -> Self {
        Self(format!("QP-{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    Compared,
    AwaitingApproval,
    AutoOrdered,
    Placed,
    OutForDelivery,
    Delivered,
    Rejected,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Compared => "compared",
            Self::AwaitingApproval => "awaiting_approval",
            Self::AutoOrdered => "auto_ordered",
            Self::Placed => "placed",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Rejected | Self::Failed)
    }

    /// States whose progress is driven by polling the platform.
    pub fn is_tracking(&self) -> bool {
        matches!(self, Self::Placed | Self::OutForDelivery)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub item: Item,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl OrderLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price.saturating_mul(Decimal::from(self.quantity))
    }
}

impl From<&QuotedItem> for OrderLine {
    fn from(quoted: &QuotedItem) -> Self {
        Self {
            item: quoted.item.clone(),
            product_name: quoted.candidate.name.clone(),
            quantity: quoted.item.quantity,
            unit_price: quoted.candidate.unit_price,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub platform_order_id: String,
    pub tracking_handle: String,
    pub estimated_delivery: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfilmentState {
    Confirmed,
    OutForDelivery,
    Delivered,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformOrderStatus {
    pub state: FulfilmentState,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub delivery_person: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFailure {
    pub message: String,
    pub retryable: bool,
    pub attempts: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: String,
    pub platform: PlatformId,
    pub lines: Vec<OrderLine>,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub platform_order_id: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub tracking_handle: Option<String>,
    pub delivery_person: Option<String>,
    pub placement_attempts: u32,
    pub last_error: Option<OrderFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn draft(
        user_id: impl Into<String>,
        platform: PlatformId,
        lines: Vec<OrderLine>,
        delivery_fee: Decimal,
    ) -> Self {
        let now = Utc::now();
        let total_amount = lines
            .iter()
            .map(OrderLine::line_total)
            .fold(delivery_fee, |total, line| total.saturating_add(line));
        Self {
            id: OrderId::pending(),
            user_id: user_id.into(),
            platform,
            lines,
            total_amount,
            status: OrderStatus::Draft,
            platform_order_id: None,
            estimated_delivery: None,
            tracking_handle: None,
            delivery_person: None,
            placement_attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        matches!(
            (self.status, next),
            (Draft, Compared)
                | (Compared, AwaitingApproval)
                | (Compared, AutoOrdered)
                | (AwaitingApproval, Placed)
                | (AwaitingApproval, Rejected)
                | (AwaitingApproval, Failed)
                | (AutoOrdered, Placed)
                | (AutoOrdered, Failed)
                | (Placed, OutForDelivery)
                | (Placed, Failed)
                | (OutForDelivery, Delivered)
                | (OutForDelivery, Failed)
        )
    }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            self.updated_at = Utc::now();
            return Ok(());
        }

        Err(DomainError::InvalidOrderTransition { from: self.status, to: next })
    }

    pub fn record_confirmation(&mut self, confirmation: OrderConfirmation) {
        self.platform_order_id = Some(confirmation.platform_order_id);
        self.tracking_handle = Some(confirmation.tracking_handle);
        self.estimated_delivery = Some(confirmation.estimated_delivery);
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    pub fn record_tracking(&mut self, status: &PlatformOrderStatus) {
        if status.estimated_delivery.is_some() {
            self.estimated_delivery = status.estimated_delivery;
        }
        if status.delivery_person.is_some() {
            self.delivery_person = status.delivery_person.clone();
        }
        self.updated_at = Utc::now();
    }

    /// Minutes until the estimated delivery, floored at zero.
    pub fn minutes_until_delivery(&self, now: DateTime<Utc>) -> Option<i64> {
        self.estimated_delivery.map(|eta| (eta - now).num_minutes().max(0))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use crate::domain::catalog::{Item, PlatformId};
    use crate::errors::DomainError;

    use super::{Order, OrderLine, OrderStatus};

    fn order(status: OrderStatus) -> Order {
        let mut order = Order::draft(
            "user-1",
            PlatformId::new("zepto"),
            vec![OrderLine {
                item: Item::with_quantity("milk", 2),
                product_name: "Amul Taaza Toned Milk".to_owned(),
                quantity: 2,
                unit_price: Decimal::new(2850, 2),
            }],
            Decimal::from(15),
        );
        order.status = status;
        order
    }

    #[test]
    fn draft_total_includes_quantities_and_delivery_fee() {
        let order = order(OrderStatus::Draft);
        assert_eq!(order.total_amount, Decimal::new(7200, 2));
        assert!(order.id.0.starts_with("QP-"));
    }

    #[test]
    fn allows_approval_lifecycle() {
        let mut order = order(OrderStatus::Draft);
        for next in [
            OrderStatus::Compared,
            OrderStatus::AwaitingApproval,
            OrderStatus::Placed,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
        ] {
            order.transition_to(next).expect("valid lifecycle step");
        }
        assert_eq!(order.status, OrderStatus::Delivered);
    }

    #[test]
    fn terminal_states_never_transition() {
        for terminal in [OrderStatus::Delivered, OrderStatus::Failed, OrderStatus::Rejected] {
            let order = order(terminal);
            assert!(terminal.is_terminal());
            for next in [
                OrderStatus::Draft,
                OrderStatus::Compared,
                OrderStatus::AwaitingApproval,
                OrderStatus::AutoOrdered,
                OrderStatus::Placed,
                OrderStatus::OutForDelivery,
                OrderStatus::Delivered,
                OrderStatus::Rejected,
                OrderStatus::Failed,
            ] {
                assert!(!order.can_transition_to(next), "{terminal:?} -> {next:?} must be blocked");
            }
        }
    }

    #[test]
    fn blocks_skipping_delivery_dispatch() {
        let mut order = order(OrderStatus::Placed);
        let error = order.transition_to(OrderStatus::Delivered).expect_err("placed->delivered");
        assert!(matches!(
            error,
            DomainError::InvalidOrderTransition {
                from: OrderStatus::Placed,
                to: OrderStatus::Delivered
            }
        ));
    }

    #[test]
    fn minutes_until_delivery_never_negative() {
        let mut order = order(OrderStatus::Placed);
        let now = Utc::now();
        order.estimated_delivery = Some(now - Duration::minutes(3));
        assert_eq!(order.minutes_until_delivery(now), Some(0));
        order.estimated_delivery = Some(now + Duration::minutes(9));
        assert_eq!(order.minutes_until_delivery(now), Some(9));
    }
}
