use serde_json::{Map, Value};
use tracing::{error, info};

use crate::error::ProcessorError;
use crate::gemini::parse::as_fallback_text;
use crate::gemini::{AiClient, AiResponse, MultimodalRequest, extract_json};
use crate::workflow::{ProcessorResult, Step};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// MIME type sent alongside the image: PNG when the signature matches,
/// JPEG otherwise.
pub fn detect_mime_type(image_bytes: &[u8]) -> &'static str {
    if image_bytes.starts_with(PNG_SIGNATURE) {
        "image/png"
    } else {
        "image/jpeg"
    }
}

pub(crate) fn validate_image(image_bytes: &[u8]) -> Result<(), ProcessorError> {
    if image_bytes.is_empty() {
        return Err(ProcessorError::Validation("Image bytes cannot be empty".into()));
    }
    Ok(())
}

/// The predecessor's output as an object carrying every field in `required`.
pub(crate) fn require_previous<'a>(
    step: Step,
    previous: Option<&'a Value>,
    required: &[&str],
) -> Result<&'a Map<String, Value>, ProcessorError> {
    let previous = previous.ok_or_else(|| {
        ProcessorError::Validation(format!(
            "Previous step result is required for Step {}",
            step.number()
        ))
    })?;
    let object = previous.as_object().ok_or_else(|| {
        ProcessorError::Validation("Previous step result must be a JSON object".into())
    })?;
    let missing = missing_fields(object, required);
    if !missing.is_empty() {
        return Err(ProcessorError::Validation(format!(
            "Previous step result missing required fields: {}",
            missing.join(", ")
        )));
    }
    Ok(object)
}

pub(crate) fn missing_fields<'f>(object: &Map<String, Value>, required: &[&'f str]) -> Vec<&'f str> {
    required
        .iter()
        .copied()
        .filter(|field| !object.contains_key(*field))
        .collect()
}

pub(crate) async fn send_request(
    client: &dyn AiClient,
    image_bytes: &[u8],
    prompt: String,
) -> Result<AiResponse, ProcessorError> {
    let request =
        MultimodalRequest::new(image_bytes, prompt).with_mime_type(detect_mime_type(image_bytes));
    Ok(client.process_multimodal_request(&request).await?)
}

/// Parse a reply that must contain a JSON object.
///
/// Uses the client's structured parse first and, when that only yields the
/// raw text, digs the object out of the text.
pub(crate) fn parse_json_reply(
    client: &dyn AiClient,
    response: &AiResponse,
    step: Step,
) -> Result<Value, ProcessorError> {
    let parsed = client.parse_structured_response(response);
    let Some(text) = as_fallback_text(&parsed).filter(|t| *t == response.text) else {
        return Ok(parsed);
    };

    let json = extract_json(text).ok_or_else(|| {
        ProcessorError::OutputParsing(format!(
            "No JSON object found in Step {} response",
            step.number()
        ))
    })?;
    serde_json::from_str(json).map_err(|e| {
        ProcessorError::OutputParsing(format!(
            "Failed to parse Step {} response as JSON: {e}",
            step.number()
        ))
    })
}

/// Convert the outcome of a processor run into the result reported to the
/// engine, logging either way.
pub(crate) fn finish(
    step: Step,
    outcome: Result<(Value, String), ProcessorError>,
) -> ProcessorResult {
    match outcome {
        Ok((data, raw)) => {
            info!("Step {} {} completed successfully", step.number(), step.title());
            ProcessorResult::success_with_raw(data, raw)
        }
        Err(e) => {
            let message = format!("Step {} {} error: {e}", step.number(), e.kind());
            error!("{message}");
            ProcessorResult::failure(message)
        }
    }
}
