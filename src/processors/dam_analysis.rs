use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::common::{finish, missing_fields, parse_json_reply, send_request, validate_image};
use super::{Metadata, StepProcessor};
use crate::error::ProcessorError;
use crate::gemini::AiClient;
use crate::prompts::format_step1_prompt;
use crate::workflow::{ProcessorResult, Step};

const REQUIRED_FIELDS: [&str; 4] = [
    "notes",
    "job_aid_assessment",
    "human_readable_section",
    "next_steps",
];

/// Step 1: initial analysis of the image against DAM standards.
pub struct DamAnalysisProcessor {
    client: Arc<dyn AiClient>,
}

impl DamAnalysisProcessor {
    pub fn new(client: Arc<dyn AiClient>) -> Self {
        Self { client }
    }

    async fn run(
        &self,
        image_bytes: &[u8],
        metadata: Option<&Metadata>,
    ) -> Result<(Value, String), ProcessorError> {
        validate_image(image_bytes)?;

        info!("Sending Step 1 DAM Analysis request to AI model");
        let prompt = format_step1_prompt(metadata);
        let response = send_request(self.client.as_ref(), image_bytes, prompt).await?;

        let data = parse_json_reply(self.client.as_ref(), &response, Step::Step1)?;
        validate_output(&data)?;
        Ok((data, response.text))
    }
}

#[async_trait]
impl StepProcessor for DamAnalysisProcessor {
    async fn process(
        &self,
        image_bytes: &[u8],
        metadata: Option<&Metadata>,
        _previous_step_data: Option<&Value>,
    ) -> Result<ProcessorResult, ProcessorError> {
        Ok(finish(Step::Step1, self.run(image_bytes, metadata).await))
    }
}

fn validate_output(data: &Value) -> Result<(), ProcessorError> {
    let object = data.as_object().ok_or_else(|| {
        ProcessorError::OutputParsing("Step 1 output must be a JSON object".into())
    })?;

    let missing = missing_fields(object, &REQUIRED_FIELDS);
    if !missing.is_empty() {
        return Err(ProcessorError::OutputParsing(format!(
            "Step 1 output missing required fields: {}",
            missing.join(", ")
        )));
    }
    if !object["job_aid_assessment"].is_object() {
        return Err(ProcessorError::OutputParsing(
            "job_aid_assessment must be an object".into(),
        ));
    }
    if !object["next_steps"].is_array() {
        return Err(ProcessorError::OutputParsing(
            "next_steps must be a list".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::GeminiError;
    use crate::processors::common::testing::CannedClient;
    use serde_json::json;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    fn reply() -> String {
        format!(
            "Here is the analysis:\n```json\n{}\n```",
            json!({
                "notes": "Well lit product shot",
                "job_aid_assessment": {
                    "visual_quality": {"assessment": "PASS", "issues": []}
                },
                "human_readable_section": "The asset is in good shape.",
                "next_steps": ["Add alt text"]
            })
        )
    }

    fn processor(client: &Arc<CannedClient>) -> DamAnalysisProcessor {
        DamAnalysisProcessor::new(client.clone())
    }

    #[tokio::test]
    async fn parses_complete_analysis() {
        let client = Arc::new(CannedClient::ok(&reply()));
        let result = processor(&client).process(JPEG, None, None).await.unwrap();

        assert!(result.is_success());
        let data = result.data().unwrap();
        assert_eq!(data["notes"], "Well lit product shot");
        assert_eq!(data["next_steps"], json!(["Add alt text"]));
        assert!(result.raw_response().unwrap().starts_with("Here is the analysis"));
        assert_eq!(client.mime_types.lock().unwrap()[0], "image/jpeg");
    }

    #[tokio::test]
    async fn metadata_reaches_prompt() {
        let client = Arc::new(CannedClient::ok(&reply()));
        let metadata = json!({"asset_id": "A-17"}).as_object().cloned().unwrap();
        processor(&client)
            .process(JPEG, Some(&metadata), None)
            .await
            .unwrap();

        assert!(client.last_prompt().contains("\"asset_id\": \"A-17\""));
    }

    #[tokio::test]
    async fn empty_image_fails_without_calling_model() {
        let client = Arc::new(CannedClient::ok(&reply()));
        let result = processor(&client).process(&[], None, None).await.unwrap();

        assert_eq!(
            result.error_message(),
            Some("Step 1 validation error: Image bytes cannot be empty")
        );
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_fields_are_reported() {
        let client = Arc::new(CannedClient::ok(r#"{"notes": "only notes"}"#));
        let result = processor(&client).process(JPEG, None, None).await.unwrap();

        let message = result.error_message().unwrap();
        assert!(message.starts_with("Step 1 output parsing error: Step 1 output missing required fields"));
        assert!(message.contains("job_aid_assessment, human_readable_section, next_steps"));
    }

    #[tokio::test]
    async fn next_steps_must_be_a_list() {
        let client = Arc::new(CannedClient::ok(
            r#"{"notes": "n", "job_aid_assessment": {}, "human_readable_section": "h", "next_steps": "do it"}"#,
        ));
        let result = processor(&client).process(JPEG, None, None).await.unwrap();
        assert_eq!(
            result.error_message(),
            Some("Step 1 output parsing error: next_steps must be a list")
        );
    }

    #[tokio::test]
    async fn api_errors_become_processing_failures() {
        let client = Arc::new(CannedClient::err(GeminiError::ContentBlocked("SAFETY".into())));
        let result = processor(&client).process(JPEG, None, None).await.unwrap();

        let message = result.error_message().unwrap();
        assert!(message.starts_with("Step 1 processing error: AI request failed:"));
        assert!(message.contains("SAFETY"));
    }
}
