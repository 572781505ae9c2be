pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, OrderFlow};
pub use states::{FlowEvent, TransitionOutcome};
