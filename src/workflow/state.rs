use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::result::ProcessorResult;
use super::step::Step;

/// Progress, results and terminal error of one workflow run.
///
/// Only the engine mutates a state while a run is in flight. Callers get an
/// owned copy back and may hand it to a later run to resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub current_step: Step,
    /// Steps that finished successfully, in completion order, without duplicates.
    pub completed_steps: Vec<Step>,
    /// Per-step results, indexed by [`Step::index`].
    results: [Option<ProcessorResult>; 3],
    pub error: Option<String>,
    pub error_step: Option<Step>,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::starting_at(Step::Step1)
    }
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh state positioned at `step`.
    pub fn starting_at(step: Step) -> Self {
        Self {
            current_step: step,
            completed_steps: Vec::new(),
            results: [None, None, None],
            error: None,
            error_step: None,
        }
    }

    /// Record `result` for `step` and advance to the following step.
    ///
    /// Recording the same step twice overwrites its result but never
    /// duplicates it in `completed_steps`. Advancing past the last step is
    /// a no-op.
    pub fn mark_step_complete(&mut self, step: Step, result: ProcessorResult) {
        self.results[step.index()] = Some(result);
        if !self.completed_steps.contains(&step) {
            self.completed_steps.push(step);
        }
        if let Some(next) = step.next() {
            self.current_step = next;
        }
    }

    /// Record the terminal error of a run. Completed steps are untouched.
    pub fn mark_step_failed(&mut self, step: Step, error_message: impl Into<String>) {
        self.error = Some(error_message.into());
        self.error_step = Some(step);
    }

    pub fn is_complete(&self) -> bool {
        self.is_step_completed(Step::LAST)
    }

    pub fn is_step_completed(&self, step: Step) -> bool {
        self.completed_steps.contains(&step)
    }

    /// Whether a run may start at `step` given what this state has completed.
    ///
    /// Each step consumes the previous step's output, so resuming requires
    /// the immediate predecessor to be completed.
    pub fn can_resume_from_step(&self, step: Step) -> bool {
        match step.previous() {
            None => true,
            Some(prev) => self.is_step_completed(prev),
        }
    }

    /// The data produced by the step before `step`, if that step succeeded.
    pub fn get_previous_step_result(&self, step: Step) -> Option<&Value> {
        let prev = step.previous()?;
        self.results[prev.index()]
            .as_ref()
            .and_then(ProcessorResult::data)
    }

    /// The stored result for `step`, if it completed.
    pub fn result(&self, step: Step) -> Option<&ProcessorResult> {
        self.results[step.index()].as_ref()
    }

    /// Prepare an adopted state for a resumed run starting at `step`.
    ///
    /// Drops everything recorded for `step` and later, clears the stale
    /// error and repositions `current_step`, so the run re-executes exactly
    /// the remaining steps.
    pub(crate) fn rewind_to(&mut self, step: Step) {
        self.completed_steps.retain(|s| *s < step);
        for later in step.remaining() {
            self.results[later.index()] = None;
        }
        self.error = None;
        self.error_step = None;
        self.current_step = step;
    }

    /// Serialization-friendly snapshot for display and logging.
    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            current_step: self.current_step,
            completed_steps: self.completed_steps.clone(),
            error: self.error.clone(),
            error_step: self.error_step,
            is_complete: self.is_complete(),
        }
    }

    /// Flat per-step report, the shape consumed by presentation layers.
    pub fn report(&self) -> WorkflowReport {
        let data_for = |step: Step| {
            if self.is_step_completed(step) {
                self.result(step).and_then(ProcessorResult::data).cloned()
            } else {
                None
            }
        };
        WorkflowReport {
            workflow_complete: self.is_complete(),
            error: self.error.clone(),
            step1_result: data_for(Step::Step1),
            step2_result: data_for(Step::Step2),
            step3_result: data_for(Step::Step3),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub current_step: Step,
    pub completed_steps: Vec<Step>,
    pub error: Option<String>,
    pub error_step: Option<Step>,
    pub is_complete: bool,
}

/// Combined results of a run. A `stepN_result` key is present only for
/// completed steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub workflow_complete: bool,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step1_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step2_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step3_result: Option<Value>,
}
