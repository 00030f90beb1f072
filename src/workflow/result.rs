use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The outcome of running one step processor.
///
/// A success always carries parsed data and a failure always carries a
/// message; the enum makes the two mutually exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessorResult {
    Success {
        data: Value,
        /// The unparsed model reply, kept for display and debugging.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw_response: Option<String>,
    },
    Failure {
        error_message: String,
    },
}

impl ProcessorResult {
    pub fn success(data: Value) -> Self {
        ProcessorResult::Success {
            data,
            raw_response: None,
        }
    }

    pub fn success_with_raw(data: Value, raw_response: impl Into<String>) -> Self {
        ProcessorResult::Success {
            data,
            raw_response: Some(raw_response.into()),
        }
    }

    pub fn failure(error_message: impl Into<String>) -> Self {
        ProcessorResult::Failure {
            error_message: error_message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProcessorResult::Success { .. })
    }

    /// Parsed output, present only on success.
    pub fn data(&self) -> Option<&Value> {
        match self {
            ProcessorResult::Success { data, .. } => Some(data),
            ProcessorResult::Failure { .. } => None,
        }
    }

    /// Failure message, present only on failure.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            ProcessorResult::Success { .. } => None,
            ProcessorResult::Failure { error_message } => Some(error_message),
        }
    }

    pub fn raw_response(&self) -> Option<&str> {
        match self {
            ProcessorResult::Success { raw_response, .. } => raw_response.as_deref(),
            ProcessorResult::Failure { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_exposes_data_only() {
        let result = ProcessorResult::success(json!({"notes": "ok"}));
        assert!(result.is_success());
        assert_eq!(result.data(), Some(&json!({"notes": "ok"})));
        assert_eq!(result.error_message(), None);
    }

    #[test]
    fn failure_exposes_message_only() {
        let result = ProcessorResult::failure("model output unparsable");
        assert!(!result.is_success());
        assert_eq!(result.data(), None);
        assert_eq!(result.error_message(), Some("model output unparsable"));
        assert_eq!(result.raw_response(), None);
    }

    #[test]
    fn serialized_shape_is_tagged() {
        let ok = serde_json::to_value(ProcessorResult::success_with_raw(json!({"a": 1}), "raw")).unwrap();
        assert_eq!(ok, json!({"status": "success", "data": {"a": 1}, "raw_response": "raw"}));

        let failed = serde_json::to_value(ProcessorResult::failure("boom")).unwrap();
        assert_eq!(failed, json!({"status": "failure", "error_message": "boom"}));
    }
}
