use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::config::AnalyzerConfig;
use crate::error::WorkflowError;
use crate::gemini::{AiClient, create_gemini_client};
use crate::processors::{Metadata, ProcessorSet};
use crate::workflow::{Step, WorkflowReport, WorkflowSnapshot, WorkflowState};

/// Drives an image through the three analysis steps.
///
/// The engine owns the state of the run it is executing. `execute_workflow`
/// takes `&mut self`, so one engine serves one run at a time; use separate
/// engines for concurrent runs.
pub struct WorkflowEngine {
    /// AI client shared by the processors; created from `config` on first use when absent.
    ai_client: Option<Arc<dyn AiClient>>,
    processors: Option<ProcessorSet>,
    config: AnalyzerConfig,
    state: WorkflowState,
}

/// A failed run: the error and, for step failures, the step it belongs to.
struct RunFailure {
    step: Option<Step>,
    error: WorkflowError,
}

impl RunFailure {
    fn at(step: Step, error: WorkflowError) -> Self {
        Self {
            step: Some(step),
            error,
        }
    }

    fn unattributed(error: WorkflowError) -> Self {
        Self { step: None, error }
    }
}

impl WorkflowEngine {
    /// Create an engine that builds the standard processors on first use.
    pub fn new(ai_client: Option<Arc<dyn AiClient>>, config: AnalyzerConfig) -> Self {
        Self {
            ai_client,
            processors: None,
            config,
            state: WorkflowState::new(),
        }
    }

    /// Create an engine around an explicit set of processors.
    pub fn with_processors(processors: ProcessorSet) -> Self {
        Self {
            ai_client: None,
            processors: Some(processors),
            config: AnalyzerConfig::default(),
            state: WorkflowState::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.processors.is_some()
    }

    /// Build the AI client (if none was supplied) and the step processors.
    /// Calling it again once initialized does nothing.
    pub fn initialize(&mut self) -> Result<(), WorkflowError> {
        if self.processors.is_some() {
            return Ok(());
        }

        let client = match &self.ai_client {
            Some(client) => Arc::clone(client),
            None => {
                info!("Creating new Gemini AI client");
                let client: Arc<dyn AiClient> =
                    Arc::new(create_gemini_client(&self.config).map_err(|e| {
                        WorkflowError::Initialization(format!(
                            "Failed to initialize workflow engine: {e}"
                        ))
                    })?);
                self.ai_client = Some(Arc::clone(&client));
                client
            }
        };

        self.processors = Some(ProcessorSet::for_client(client));
        info!("Workflow engine initialized successfully");
        Ok(())
    }

    /// Run the workflow from `start_step` through the last step.
    ///
    /// With `previous_state`, the run resumes that state: `start_step`'s
    /// predecessor must already be completed, and anything recorded for
    /// `start_step` or later is discarded before running. Execution stops at
    /// the first step that does not succeed.
    ///
    /// Never fails: every error is recorded in the returned state's `error`.
    /// `error_step` names the failed step for step failures and is cleared
    /// for validation and initialization errors.
    pub async fn execute_workflow(
        &mut self,
        image_bytes: &[u8],
        metadata: Option<Value>,
        start_step: Step,
        previous_state: Option<WorkflowState>,
    ) -> WorkflowState {
        let run_id = Uuid::new_v4();
        let span = info_span!("workflow", %run_id, %start_step);

        async move {
            let resuming = previous_state.is_some();
            self.state =
                previous_state.unwrap_or_else(|| WorkflowState::starting_at(start_step));
            info!(resuming, "Starting workflow");

            match self.run(image_bytes, metadata, start_step, resuming).await {
                Ok(()) => info!("Workflow completed successfully"),
                Err(RunFailure { step, error: err }) => {
                    let message = err.to_string();
                    error!("{message}");
                    match step {
                        Some(step) => self.state.mark_step_failed(step, message),
                        None => {
                            self.state.error = Some(message);
                            self.state.error_step = None;
                        }
                    }
                }
            }
            self.state.clone()
        }
        .instrument(span)
        .await
    }

    async fn run(
        &mut self,
        image_bytes: &[u8],
        metadata: Option<Value>,
        start_step: Step,
        resuming: bool,
    ) -> Result<(), RunFailure> {
        let metadata = validate_inputs(image_bytes, metadata).map_err(RunFailure::unattributed)?;
        self.initialize().map_err(RunFailure::unattributed)?;

        if resuming {
            if !self.state.can_resume_from_step(start_step) {
                return Err(RunFailure::unattributed(WorkflowError::Validation(format!(
                    "Cannot resume workflow from step {start_step} without required previous results"
                ))));
            }
            self.state.rewind_to(start_step);
        }

        for step in start_step.remaining() {
            self.execute_step(step, image_bytes, metadata.as_ref()).await?;
        }
        Ok(())
    }

    async fn execute_step(
        &mut self,
        step: Step,
        image_bytes: &[u8],
        metadata: Option<&Metadata>,
    ) -> Result<(), RunFailure> {
        let n = step.number();
        info!("Executing Step {n}: {}", step.title());

        let previous = match step.previous() {
            None => None,
            Some(prev) => match self.state.get_previous_step_result(step) {
                Some(data) => Some(data),
                None => {
                    return Err(RunFailure::at(
                        step,
                        WorkflowError::Execution(format!(
                            "Missing required results from Step {}",
                            prev.number()
                        )),
                    ));
                }
            },
        };

        let processors = self.processors.as_ref().ok_or_else(|| {
            RunFailure::at(
                step,
                WorkflowError::Initialization("processors are not initialized".into()),
            )
        })?;

        let outcome = AssertUnwindSafe(processors.get(step).process(image_bytes, metadata, previous))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                return Err(RunFailure::at(
                    step,
                    WorkflowError::Execution(format!("Step {n} processor error: {e}")),
                ));
            }
            Err(panic) => {
                return Err(RunFailure::at(
                    step,
                    WorkflowError::Unexpected(format!(
                        "Step {n} panicked: {}",
                        panic_message(panic.as_ref())
                    )),
                ));
            }
        };

        if let Some(message) = result.error_message() {
            let message = if message.trim().is_empty() {
                format!("Step {n} failed with no error message")
            } else {
                message.to_string()
            };
            return Err(RunFailure::at(
                step,
                WorkflowError::Execution(format!("Step {n} failed: {message}")),
            ));
        }

        self.state.mark_step_complete(step, result);
        info!("Step {n} completed successfully");
        Ok(())
    }

    /// Flat per-step view of the current run.
    pub fn get_workflow_results(&self) -> WorkflowReport {
        self.state.report()
    }

    /// Progress snapshot of the current run.
    pub fn get_workflow_state(&self) -> WorkflowSnapshot {
        self.state.snapshot()
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }
}

/// Create an engine and initialize it immediately.
pub async fn create_workflow_engine(
    ai_client: Option<Arc<dyn AiClient>>,
    config: AnalyzerConfig,
) -> Result<WorkflowEngine, WorkflowError> {
    let mut engine = WorkflowEngine::new(ai_client, config);
    engine.initialize()?;
    Ok(engine)
}

fn validate_inputs(
    image_bytes: &[u8],
    metadata: Option<Value>,
) -> Result<Option<Metadata>, WorkflowError> {
    if image_bytes.is_empty() {
        return Err(WorkflowError::Validation("Image bytes cannot be empty".into()));
    }
    match metadata {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(WorkflowError::Validation(
            "Metadata must be a JSON object".into(),
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
