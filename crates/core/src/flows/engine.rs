use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::order::OrderStatus;
use crate::flows::states::{FlowEvent, TransitionOutcome};

pub trait FlowDefinition {
    fn transition(
        &self,
        current: &OrderStatus,
        event: &FlowEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Debug, Default)]
pub struct OrderFlow;

impl FlowDefinition for OrderFlow {
    fn transition(
        &self,
        current: &OrderStatus,
        event: &FlowEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_quick_order(current, event)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn apply(
        &self,
        current: &OrderStatus,
        event: &FlowEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &OrderStatus,
        event: &FlowEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<OrderFlow> {
    fn default() -> Self {
        Self::new(OrderFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: OrderStatus, event: FlowEvent },
}

fn transition_quick_order(
    current: &OrderStatus,
    event: &FlowEvent,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowEvent::{
        ApprovalDenied, ApprovalGranted, ApprovalRequired, AutoOrderQualified,
        CancellationReported, DeliveryConfirmed, DispatchReported, PlacementConfirmed,
        PlacementFailed, QuotesCompared,
    };
    use OrderStatus::{
        AutoOrdered, AwaitingApproval, Compared, Delivered, Draft, Failed, OutForDelivery, Placed,
        Rejected,
    };

    let to = match (current, event) {
        (Draft, QuotesCompared) => Compared,
        (Compared, AutoOrderQualified) => AutoOrdered,
        (Compared, ApprovalRequired) => AwaitingApproval,
        // Placement is driven by the orchestrator; the order waits here until it settles.
        (AwaitingApproval, ApprovalGranted) => AwaitingApproval,
        (AwaitingApproval, ApprovalDenied) => Rejected,
        (AwaitingApproval, PlacementConfirmed) | (AutoOrdered, PlacementConfirmed) => Placed,
        (AwaitingApproval, PlacementFailed) | (AutoOrdered, PlacementFailed) => Failed,
        (Placed, DispatchReported) => OutForDelivery,
        (OutForDelivery, DeliveryConfirmed) => Delivered,
        (Placed, CancellationReported) | (OutForDelivery, CancellationReported) => Failed,
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: *current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone() })
}
