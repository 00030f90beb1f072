use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::error::GeminiError;
use super::parse::parse_structured_response;
use super::retry::RetryConfig;
use super::types::{
    AiResponse, Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    InlineData, MultimodalRequest, Part, SafetySetting,
};
use crate::config::AnalyzerConfig;

const API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Persona given to the model on every request.
pub const SYSTEM_INSTRUCTION: &str = "You are a professional Digital Asset Management (DAM) analyst with expertise in compliance assessment and quality control.";

/// Finish reasons that mean the model refused to continue.
const STOPPED_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
];

/// A 1x1 transparent PNG, used as the image for health checks.
const HEALTH_CHECK_IMAGE: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Anything that can answer a multimodal prompt with text.
///
/// The step processors only depend on this trait, so tests can swap the
/// network client for a canned double.
#[async_trait]
pub trait AiClient: Send + Sync {
    /// Send an image + prompt and return the generated text, retrying
    /// transient failures.
    async fn process_multimodal_request(
        &self,
        request: &MultimodalRequest,
    ) -> Result<AiResponse, GeminiError>;

    /// Interpret the response text as structured JSON, falling back to
    /// `{"text": ...}`.
    fn parse_structured_response(&self, response: &AiResponse) -> Value {
        parse_structured_response(&response.text)
    }
}

/// REST client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
    retry: RetryConfig,
    generation_defaults: GenerationConfig,
}

impl GeminiClient {
    /// Create a client from the analyzer configuration.
    pub fn new(config: &AnalyzerConfig) -> Result<Self, GeminiError> {
        if config.api_key.trim().is_empty() {
            return Err(GeminiError::MissingApiKey);
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| API_URL.to_string()),
            client,
            retry: RetryConfig {
                max_retries: config.max_retries,
                base_delay_ms: config.base_delay_ms,
                max_delay_ms: config.max_delay_ms,
            },
            generation_defaults: config.generation_config(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a request, retrying up to `max_retries` times with exponential
    /// backoff. Non-retryable errors surface immediately.
    pub async fn process_with_retries(
        &self,
        request: &MultimodalRequest,
        max_retries: u32,
    ) -> Result<AiResponse, GeminiError> {
        let body = self.build_body(request);
        let mut attempt: u32 = 0;

        loop {
            info!(model = %self.model, attempt = attempt + 1, "Sending multimodal request");
            let err = match self.send_once(&body).await {
                Ok(response) => {
                    info!("Successfully processed multimodal request");
                    return Ok(response);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                error!("Gemini request failed: {err}");
                return Err(err);
            }
            if attempt >= max_retries {
                error!("Gemini request failed after {max_retries} retries: {err}");
                return Err(GeminiError::RetriesExhausted {
                    retries: max_retries,
                    last: err.to_string(),
                });
            }

            attempt += 1;
            let delay_ms = match &err {
                GeminiError::RateLimited { retry_after_ms } => self.retry.capped(*retry_after_ms),
                _ => self.retry.delay_for_attempt(attempt),
            };
            warn!("Request failed, waiting {delay_ms}ms before retry {attempt}/{max_retries}: {err}");
            sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    /// Send a one-word description request and report whether text came back.
    pub async fn health_check(&self) -> bool {
        let request = MultimodalRequest::new(HEALTH_CHECK_IMAGE, "Describe this image in one word.")
            .with_mime_type("image/png")
            .with_generation_config(GenerationConfig {
                max_output_tokens: Some(10),
                ..self.generation_defaults.clone()
            });

        match self.process_with_retries(&request, 1).await {
            Ok(response) => !response.text.is_empty(),
            Err(e) => {
                error!("Health check failed: {e}");
                false
            }
        }
    }

    fn build_body(&self, request: &MultimodalRequest) -> GenerateContentRequest {
        GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part::Text {
                    text: SYSTEM_INSTRUCTION.to_string(),
                }],
            },
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: request.mime_type.clone(),
                            data: BASE64.encode(&request.image_bytes),
                        },
                    },
                    Part::Text {
                        text: request.text_prompt.clone(),
                    },
                ],
            }],
            generation_config: request
                .generation_config
                .clone()
                .unwrap_or_else(|| self.generation_defaults.clone()),
            safety_settings: request
                .safety_settings
                .clone()
                .unwrap_or_else(SafetySetting::defaults),
        }
    }

    async fn send_once(&self, body: &GenerateContentRequest) -> Result<AiResponse, GeminiError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok());
            return Err(GeminiError::RateLimited {
                retry_after_ms: retry_after_ms(retry_after),
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(GeminiError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let raw = response.text().await?;
        let parsed: GenerateContentResponse =
            serde_json::from_str(&raw).map_err(|e| GeminiError::Parse(e.to_string()))?;
        into_ai_response(parsed)
    }
}

#[async_trait]
impl AiClient for GeminiClient {
    async fn process_multimodal_request(
        &self,
        request: &MultimodalRequest,
    ) -> Result<AiResponse, GeminiError> {
        self.process_with_retries(request, self.retry.max_retries)
            .await
    }
}

/// Build and validate a client from configuration.
pub fn create_gemini_client(config: &AnalyzerConfig) -> Result<GeminiClient, GeminiError> {
    let client = GeminiClient::new(config)?;
    info!(model = %client.model(), "Initialized Gemini API client");
    Ok(client)
}

/// `retry-after` seconds as milliseconds; 1s when absent or unparsable.
fn retry_after_ms(header: Option<&str>) -> u64 {
    header
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs.saturating_mul(1000))
        .unwrap_or(1000)
}

fn into_ai_response(body: GenerateContentResponse) -> Result<AiResponse, GeminiError> {
    if let Some(reason) = body.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GeminiError::ContentBlocked(reason));
    }

    let candidate = body
        .candidates
        .into_iter()
        .next()
        .ok_or(GeminiError::EmptyResponse)?;

    if let Some(reason) = candidate.finish_reason.as_deref()
        && STOPPED_FINISH_REASONS.contains(&reason)
    {
        return Err(GeminiError::GenerationStopped(reason.to_string()));
    }

    let text: String = candidate
        .content
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();

    if text.trim().is_empty() {
        return Err(GeminiError::EmptyResponse);
    }

    Ok(AiResponse {
        text,
        usage_metadata: body.usage_metadata,
        safety_ratings: candidate.safety_ratings,
        finish_reason: candidate.finish_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GENERATE_PATH: &str = "/models/gemini-test:generateContent";

    fn test_config(base_url: String) -> AnalyzerConfig {
        AnalyzerConfig {
            api_key: "test-key".into(),
            model: "gemini-test".into(),
            base_url: Some(base_url),
            max_retries: 2,
            base_delay_ms: 1,
            ..AnalyzerConfig::default()
        }
    }

    fn text_reply(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": text}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5}
        })
    }

    #[test]
    fn missing_api_key_fails_initialization() {
        let config = AnalyzerConfig::default();
        let result = create_gemini_client(&AnalyzerConfig {
            api_key: String::new(),
            ..config
        });
        assert!(matches!(result, Err(GeminiError::MissingApiKey)));
    }

    #[tokio::test]
    async fn successful_request_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("hello")))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(&test_config(server.uri())).unwrap();
        let response = client
            .process_multimodal_request(&MultimodalRequest::new(vec![1, 2, 3], "describe"))
            .await
            .unwrap();

        assert_eq!(response.text, "hello");
        assert_eq!(response.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(response.usage_metadata.unwrap().total_token_count, 5);
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(3)
            .mount(&server)
            .await;

        let client = GeminiClient::new(&test_config(server.uri())).unwrap();
        let err = client
            .process_multimodal_request(&MultimodalRequest::new(vec![1], "x"))
            .await
            .unwrap_err();

        match err {
            GeminiError::RetriesExhausted { retries, last } => {
                assert_eq!(retries, 2);
                assert!(last.contains("503"));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn recovers_after_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("second time")))
            .mount(&server)
            .await;

        let client = GeminiClient::new(&test_config(server.uri())).unwrap();
        let response = client
            .process_multimodal_request(&MultimodalRequest::new(vec![1], "x"))
            .await
            .unwrap();
        assert_eq!(response.text, "second time");
    }

    #[tokio::test]
    async fn blocked_prompt_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"promptFeedback": {"blockReason": "SAFETY"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(&test_config(server.uri())).unwrap();
        let err = client
            .process_multimodal_request(&MultimodalRequest::new(vec![1], "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, GeminiError::ContentBlocked(reason) if reason == "SAFETY"));
    }

    #[tokio::test]
    async fn safety_stop_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": []}, "finishReason": "SAFETY"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(&test_config(server.uri())).unwrap();
        let err = client
            .process_multimodal_request(&MultimodalRequest::new(vec![1], "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, GeminiError::GenerationStopped(_)));
    }

    #[tokio::test]
    async fn empty_text_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("   ")))
            .expect(3)
            .mount(&server)
            .await;

        let client = GeminiClient::new(&test_config(server.uri())).unwrap();
        let err = client
            .process_multimodal_request(&MultimodalRequest::new(vec![1], "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, GeminiError::RetriesExhausted { .. }));
    }

    #[tokio::test]
    async fn rate_limit_honours_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("ok")))
            .mount(&server)
            .await;

        let client = GeminiClient::new(&test_config(server.uri())).unwrap();
        let response = client
            .process_multimodal_request(&MultimodalRequest::new(vec![1], "x"))
            .await
            .unwrap();
        assert_eq!(response.text, "ok");
    }

    #[tokio::test]
    async fn oversized_retry_after_is_capped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(
                ResponseTemplate::new(429).insert_header("retry-after", "18446744073709552"),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("ok")))
            .mount(&server)
            .await;

        let config = AnalyzerConfig {
            max_retries: 1,
            max_delay_ms: 5,
            ..test_config(server.uri())
        };
        let client = GeminiClient::new(&config).unwrap();
        let response = tokio::time::timeout(
            Duration::from_secs(5),
            client.process_multimodal_request(&MultimodalRequest::new(vec![1], "x")),
        )
        .await
        .expect("retry wait should be capped")
        .unwrap();
        assert_eq!(response.text, "ok");
    }

    #[test]
    fn retry_after_header_parsing() {
        assert_eq!(retry_after_ms(Some("2")), 2000);
        assert_eq!(retry_after_ms(Some("18446744073709552")), u64::MAX);
        assert_eq!(retry_after_ms(Some("soon")), 1000);
        assert_eq!(retry_after_ms(None), 1000);
    }

    #[tokio::test]
    async fn client_errors_surface_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(&test_config(server.uri())).unwrap();
        let err = client
            .process_multimodal_request(&MultimodalRequest::new(vec![1], "x"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "API error (status 401): invalid key");
    }

    #[tokio::test]
    async fn health_check_reports_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("Pixel")))
            .mount(&server)
            .await;

        let client = GeminiClient::new(&test_config(server.uri())).unwrap();
        assert!(client.health_check().await);
    }

    #[test]
    fn body_carries_image_and_prompt() {
        let client = GeminiClient::new(&test_config("http://localhost".into())).unwrap();
        let body = client.build_body(&MultimodalRequest::new(vec![0xFF, 0xD8], "analyze"));
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["contents"][0]["parts"][0]["inlineData"]["data"], "/9g=");
        assert_eq!(json["contents"][0]["parts"][0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(json["contents"][0]["parts"][1]["text"], "analyze");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], SYSTEM_INSTRUCTION);
    }

    #[test]
    fn default_parse_falls_back_to_text() {
        let client = GeminiClient::new(&test_config("http://localhost".into())).unwrap();
        let value = client.parse_structured_response(&AiResponse::from_text("plain words"));
        assert_eq!(value, json!({"text": "plain words"}));
    }
}
