pub mod client;
pub mod error;
pub mod parse;
pub mod retry;
pub mod types;

pub use client::{AiClient, GeminiClient, SYSTEM_INSTRUCTION, create_gemini_client};
pub use error::GeminiError;
pub use parse::{extract_json, parse_structured_response};
pub use retry::RetryConfig;
pub use types::{AiResponse, GenerationConfig, MultimodalRequest, SafetySetting, UsageMetadata};
