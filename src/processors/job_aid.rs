use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::common::{finish, parse_json_reply, require_previous, send_request, validate_image};
use super::{Metadata, StepProcessor};
use crate::error::ProcessorError;
use crate::gemini::AiClient;
use crate::prompts::format_step2_prompt;
use crate::schema::{assessment_summary, job_aid_schema, validate_job_aid};
use crate::workflow::{ProcessorResult, Step};

/// Fields the step 1 output must carry.
const REQUIRED_PREVIOUS: [&str; 3] = ["notes", "job_aid_assessment", "human_readable_section"];

/// Keys that identify a bare `digital_component_analysis` body.
const INNER_KEYS: [&str; 3] = ["component_specifications", "component_qc", "overall_assessment"];

/// Step 2: complete the Digital Component Analysis job aid.
pub struct JobAidProcessor {
    client: Arc<dyn AiClient>,
}

impl JobAidProcessor {
    pub fn new(client: Arc<dyn AiClient>) -> Self {
        Self { client }
    }

    async fn run(
        &self,
        image_bytes: &[u8],
        metadata: Option<&Metadata>,
        previous: Option<&Value>,
    ) -> Result<(Value, String), ProcessorError> {
        validate_image(image_bytes)?;
        let step1 = require_previous(Step::Step2, previous, &REQUIRED_PREVIOUS)?;

        info!("Sending Step 2 Job Aid Assessment request to AI model");
        let prompt = format_step2_prompt(&job_aid_schema(), &Value::Object(step1.clone()), metadata);
        let response = send_request(self.client.as_ref(), image_bytes, prompt).await?;

        let parsed = parse_json_reply(self.client.as_ref(), &response, Step::Step2)?;
        let job_aid = normalize_job_aid(parsed)?;
        let summary = assessment_summary(&job_aid);

        Ok((
            json!({
                "completed_job_aid": job_aid,
                "assessment_summary": summary,
            }),
            response.text,
        ))
    }
}

#[async_trait]
impl StepProcessor for JobAidProcessor {
    async fn process(
        &self,
        image_bytes: &[u8],
        metadata: Option<&Metadata>,
        previous_step_data: Option<&Value>,
    ) -> Result<ProcessorResult, ProcessorError> {
        Ok(finish(
            Step::Step2,
            self.run(image_bytes, metadata, previous_step_data).await,
        ))
    }
}

/// Accept either the wrapped job aid or its bare inner object, returning the
/// wrapped form after validation.
fn normalize_job_aid(parsed: Value) -> Result<Value, ProcessorError> {
    let Some(object) = parsed.as_object().filter(|o| !o.is_empty()) else {
        return Err(ProcessorError::OutputParsing(
            "Job aid output must be a non-empty JSON object".into(),
        ));
    };

    let job_aid = if object.contains_key("digital_component_analysis") {
        parsed
    } else if INNER_KEYS.iter().any(|k| object.contains_key(*k)) {
        debug!("Wrapping bare job aid body in digital_component_analysis");
        json!({ "digital_component_analysis": parsed })
    } else {
        return Err(ProcessorError::OutputParsing(
            "Job aid output missing 'digital_component_analysis' key and does not appear to be a valid inner object".into(),
        ));
    };

    validate_job_aid(&job_aid)
        .map_err(|e| ProcessorError::OutputParsing(format!("Job aid validation failed: {e}")))?;
    Ok(job_aid)
}
