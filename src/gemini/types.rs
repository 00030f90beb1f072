//! Request and response types for the Gemini `generateContent` endpoint.
//!
//! [`MultimodalRequest`] and [`AiResponse`] are the boundary types the step
//! processors work with. The `GenerateContent*` structs mirror the REST wire
//! format (camelCase JSON) and stay private to the client.

use serde::{Deserialize, Serialize};

/// The MIME type assumed for images when none is given.
pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// An image plus a text prompt, sent to the model as a single user turn.
#[derive(Debug, Clone)]
pub struct MultimodalRequest {
    pub image_bytes: Vec<u8>,
    pub text_prompt: String,
    pub mime_type: String,
    /// Overrides the client's default generation parameters.
    pub generation_config: Option<GenerationConfig>,
    /// Overrides the client's default safety thresholds.
    pub safety_settings: Option<Vec<SafetySetting>>,
}

impl MultimodalRequest {
    pub fn new(image_bytes: impl Into<Vec<u8>>, text_prompt: impl Into<String>) -> Self {
        Self {
            image_bytes: image_bytes.into(),
            text_prompt: text_prompt.into(),
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            generation_config: None,
            safety_settings: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }
}

/// The model's answer to a [`MultimodalRequest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiResponse {
    pub text: String,
    pub usage_metadata: Option<UsageMetadata>,
    pub safety_ratings: Option<Vec<SafetyRating>>,
    pub finish_reason: Option<String>,
}

impl AiResponse {
    /// A bare text response, as produced by test doubles.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Sampling parameters for a generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: Some(8192),
            temperature: Some(0.1),
            top_p: Some(0.8),
            top_k: Some(40),
        }
    }
}

/// A harm category and the probability threshold at which it is blocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: String,
}

impl SafetySetting {
    pub fn new(category: &str, threshold: &str) -> Self {
        Self {
            category: category.to_string(),
            threshold: threshold.to_string(),
        }
    }

    /// Blocks medium-and-above for the four standard harm categories.
    pub fn defaults() -> Vec<SafetySetting> {
        [
            "HARM_CATEGORY_HATE_SPEECH",
            "HARM_CATEGORY_DANGEROUS_CONTENT",
            "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            "HARM_CATEGORY_HARASSMENT",
        ]
        .into_iter()
        .map(|category| SafetySetting::new(category, "BLOCK_MEDIUM_AND_ABOVE"))
        .collect()
    }
}

/// Token accounting reported by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyRating {
    pub category: String,
    pub probability: String,
}

// --- wire format ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest {
    pub system_instruction: Content,
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
    pub safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// One part of a content turn: either text or an inline base64 blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum Part {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
    /// Parts the client does not interpret (function calls, thoughts, ...).
    Other(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub usage_metadata: Option<UsageMetadata>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Candidate {
    #[serde(default)]
    pub content: Content,
    pub finish_reason: Option<String>,
    pub safety_ratings: Option<Vec<SafetyRating>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PromptFeedback {
    pub block_reason: Option<String>,
}
