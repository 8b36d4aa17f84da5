pub mod engine;
pub mod states;

pub use engine::{transition, transition_step, WorkflowStateError};
pub use states::{TransitionContext, TransitionOutcome, WorkflowEvent};
