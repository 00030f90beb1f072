//! Error types for the Gemini generative-model client.
//!
//! [`GeminiError`] covers the failure taxonomy the workflow sees from the AI
//! side: missing credentials, safety blocks, stopped generations, exhausted
//! retries and empty responses, plus the transport-level failures that feed
//! the retry loop. Uses `thiserror` to derive `Display` and `Error`.

use thiserror::Error;

/// Errors that can occur while talking to the Gemini API.
#[derive(Debug, Error)]
pub enum GeminiError {
    /// No API key was configured, so the client could not be initialized.
    #[error("Gemini API key not found. Set GEMINI_API_KEY or configure `api_key`.")]
    MissingApiKey,

    /// The prompt was rejected by the safety filters. Never retried.
    #[error("content blocked by safety filters: {0}")]
    ContentBlocked(String),

    /// The model stopped generating for a non-recoverable reason. Never retried.
    #[error("generation stopped: {0}")]
    GenerationStopped(String),

    /// Every retry attempt failed; carries the last underlying error.
    #[error("request failed after {retries} retries: {last}")]
    RetriesExhausted { retries: u32, last: String },

    /// The model answered but produced no text.
    #[error("empty response from AI model")]
    EmptyResponse,

    /// The API returned HTTP 429.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Any other non-success HTTP status.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The response body did not match the expected shape.
    #[error("failed to parse API response: {0}")]
    Parse(String),

    /// Underlying network failure (DNS, connection refused, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl GeminiError {
    /// Whether the retry loop should try again after this error.
    ///
    /// Safety blocks, stopped generations and client-side (4xx) API errors
    /// surface immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            GeminiError::MissingApiKey
            | GeminiError::ContentBlocked(_)
            | GeminiError::GenerationStopped(_)
            | GeminiError::RetriesExhausted { .. } => false,
            GeminiError::ApiError { status, .. } => *status >= 500 || *status == 408,
            GeminiError::EmptyResponse
            | GeminiError::RateLimited { .. }
            | GeminiError::Parse(_)
            | GeminiError::Network(_) => true,
        }
    }
}
