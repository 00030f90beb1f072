//! Three-step AI compliance analysis for digital asset images.
//!
//! An image (plus optional metadata) runs through DAM analysis, job-aid
//! assessment and findings transmission; each step feeds the next and the
//! [`engine::WorkflowEngine`] records progress so a failed run can resume
//! from the step that failed.

pub mod config;
pub mod engine;
pub mod error;
pub mod gemini;
pub mod processors;
pub mod prompts;
pub mod report;
pub mod schema;
pub mod workflow;

pub use config::AnalyzerConfig;
pub use engine::{WorkflowEngine, create_workflow_engine};
pub use error::{AnalyzerError, ProcessorError, WorkflowError};
pub use workflow::{ProcessorResult, Step, WorkflowReport, WorkflowSnapshot, WorkflowState};
