use serde::{Deserialize, Serialize};

use crate::domain::order::OrderStatus;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    QuotesCompared,
    AutoOrderQualified,
    ApprovalRequired,
    ApprovalGranted,
    ApprovalDenied,
    PlacementConfirmed,
    PlacementFailed,
    DispatchReported,
    DeliveryConfirmed,
    CancellationReported,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub event: FlowEvent,
}
