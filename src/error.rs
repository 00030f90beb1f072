use thiserror::Error;

use crate::gemini::GeminiError;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Invalid metadata: {0}")]
    Metadata(String),

    #[error("Gemini API error: {0}")]
    Gemini(#[from] GeminiError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Failure inside a step processor.
///
/// Processors turn these into failed results; the kind only shapes the
/// message the workflow ends up reporting.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Processing(String),

    #[error("{0}")]
    OutputParsing(String),
}

impl ProcessorError {
    /// Lowercase label used in step failure messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessorError::Validation(_) => "validation",
            ProcessorError::Processing(_) => "processing",
            ProcessorError::OutputParsing(_) => "output parsing",
        }
    }
}

impl From<GeminiError> for ProcessorError {
    fn from(err: GeminiError) -> Self {
        ProcessorError::Processing(format!("AI request failed: {err}"))
    }
}

/// Failure of a workflow run. Its display text becomes the run's error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("Workflow validation error: {0}")]
    Validation(String),

    #[error("Workflow execution error: {0}")]
    Execution(String),

    #[error("Workflow initialization error: {0}")]
    Initialization(String),

    #[error("Unexpected workflow error: {0}")]
    Unexpected(String),
}
