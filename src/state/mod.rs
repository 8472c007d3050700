/// State management module
///
/// The line call owned by the pipeline and the lifecycle of the worker that
/// drives it.

pub mod call_state;
pub mod process_state;

// Re-export commonly used types
pub use call_state::{
    BounceCall, CallSettings, CallState, CallTransition, LineCallStateMachine, OutAlert,
};
pub use process_state::{ProcessState, ProcessStateMachine, TransitionError};
