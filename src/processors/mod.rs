//! The three step processors and the contract the engine drives them through.

mod common;
mod dam_analysis;
mod findings;
mod job_aid;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ProcessorError;
use crate::gemini::AiClient;
use crate::workflow::{ProcessorResult, Step};

pub use common::detect_mime_type;
pub use dam_analysis::DamAnalysisProcessor;
pub use findings::{FindingsProcessor, parse_findings};
pub use job_aid::JobAidProcessor;

/// Caller-supplied key/value metadata describing the asset.
pub type Metadata = Map<String, Value>;

/// One step of the pipeline: build a prompt, call the model, parse the reply.
///
/// Expected failures (bad model output, empty replies, API errors) come back
/// as a failed [`ProcessorResult`]. `Err` is reserved for conditions the
/// processor cannot describe as a step outcome.
#[async_trait]
pub trait StepProcessor: Send + Sync {
    async fn process(
        &self,
        image_bytes: &[u8],
        metadata: Option<&Metadata>,
        previous_step_data: Option<&Value>,
    ) -> Result<ProcessorResult, ProcessorError>;
}

/// The processors for all three steps, indexed by [`Step`].
pub struct ProcessorSet {
    processors: [Box<dyn StepProcessor>; 3],
}

impl ProcessorSet {
    pub fn new(
        step1: Box<dyn StepProcessor>,
        step2: Box<dyn StepProcessor>,
        step3: Box<dyn StepProcessor>,
    ) -> Self {
        Self {
            processors: [step1, step2, step3],
        }
    }

    /// The standard processors, all bound to the same AI client.
    pub fn for_client(client: Arc<dyn AiClient>) -> Self {
        Self::new(
            Box::new(DamAnalysisProcessor::new(Arc::clone(&client))),
            Box::new(JobAidProcessor::new(Arc::clone(&client))),
            Box::new(FindingsProcessor::new(client)),
        )
    }

    pub fn get(&self, step: Step) -> &dyn StepProcessor {
        self.processors[step.index()].as_ref()
    }
}
