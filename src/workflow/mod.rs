//! Workflow state tracking for the three-step analysis.

mod result;
mod state;
mod step;

pub use result::ProcessorResult;
pub use state::{WorkflowReport, WorkflowSnapshot, WorkflowState};
pub use step::Step;
