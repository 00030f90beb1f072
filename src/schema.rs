//! Job aid and findings schemas, plus the typed findings record.
//!
//! The schemas are embedded verbatim in the step 2 and step 3 prompts. The
//! model output is only loosely held to them: [`validate_job_aid`] checks the
//! shape the rest of the pipeline relies on, and [`Findings::normalize`]
//! turns whatever came back into a complete findings record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Per-field verdict used throughout the job aid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Assessment {
    Pass,
    Fail,
    NeedsReview,
}

impl Assessment {
    pub const VALUES: [&'static str; 3] = ["PASS", "FAIL", "NEEDS_REVIEW"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Assessment::Pass => "PASS",
            Assessment::Fail => "FAIL",
            Assessment::NeedsReview => "NEEDS_REVIEW",
        }
    }
}

impl fmt::Display for Assessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Assessment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PASS" => Ok(Assessment::Pass),
            "FAIL" => Ok(Assessment::Fail),
            "NEEDS_REVIEW" => Ok(Assessment::NeedsReview),
            other => Err(format!("invalid assessment '{other}'")),
        }
    }
}

/// Overall outcome reported by the findings step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Passed,
    Failed,
    #[default]
    Partial,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Passed => "PASSED",
            CheckStatus::Failed => "FAILED",
            CheckStatus::Partial => "PARTIAL",
        }
    }

    /// Case-insensitive parse; anything unrecognised is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PASSED" => Some(CheckStatus::Passed),
            "FAILED" => Some(CheckStatus::Failed),
            "PARTIAL" => Some(CheckStatus::Partial),
            _ => None,
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub category: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingInfo {
    pub field: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// Machine-readable result of the findings step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Findings {
    pub component_id: String,
    pub component_name: String,
    pub check_status: CheckStatus,
    #[serde(default)]
    pub issues_detected: Vec<Issue>,
    #[serde(default)]
    pub missing_information: Vec<MissingInfo>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

pub const DEFAULT_COMPONENT_ID: &str = "UNKNOWN";
pub const DEFAULT_COMPONENT_NAME: &str = "Digital Component";

impl Findings {
    /// Build a complete record from loosely shaped model output.
    ///
    /// Missing or mistyped fields fall back to defaults, list entries that
    /// are plain strings become descriptions, and an unknown status is
    /// treated as `PARTIAL`.
    pub fn normalize(data: &Value) -> Self {
        let text = |key: &str, default: &str| {
            data.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(default)
                .to_string()
        };

        let check_status = data
            .get("check_status")
            .and_then(Value::as_str)
            .and_then(CheckStatus::parse)
            .unwrap_or_default();

        let issues_detected = list(data, "issues_detected")
            .map(|item| {
                let (category, description, action) =
                    entry(item, "category", "General");
                Issue {
                    category,
                    description,
                    action,
                }
            })
            .collect();

        let missing_information = list(data, "missing_information")
            .map(|item| {
                let (field, description, action) = entry(item, "field", "Unknown field");
                MissingInfo {
                    field,
                    description,
                    action,
                }
            })
            .collect();

        let recommendations = list(data, "recommendations")
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::String(_) | Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect();

        Self {
            component_id: text("component_id", DEFAULT_COMPONENT_ID),
            component_name: text("component_name", DEFAULT_COMPONENT_NAME),
            check_status,
            issues_detected,
            missing_information,
            recommendations,
        }
    }

    /// Whether the value carries the two fields the findings schema requires.
    pub fn looks_like_findings(data: &Value) -> bool {
        data.get("component_id").is_some() && data.get("check_status").is_some()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn list<'a>(data: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    data.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn entry(item: &Value, label_key: &str, label_default: &str) -> (String, String, Option<String>) {
    match item {
        Value::Object(map) => {
            let get = |k: &str| {
                map.get(k)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            };
            (
                get(label_key).unwrap_or_else(|| label_default.to_string()),
                get("description").unwrap_or_else(|| "No description provided".to_string()),
                get("action"),
            )
        }
        Value::String(s) => (label_default.to_string(), s.trim().to_string(), None),
        other => (label_default.to_string(), other.to_string(), None),
    }
}

fn assessment_field() -> Value {
    json!({"type": "string", "enum": Assessment::VALUES})
}

fn string_field() -> Value {
    json!({"type": "string"})
}

fn string_list() -> Value {
    json!({"type": "array", "items": {"type": "string"}})
}

/// An object schema with the given properties plus `assessment` and `notes`.
fn assessed(properties: &[(&str, Value)]) -> Value {
    let mut props: Map<String, Value> = properties
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    props.insert("assessment".into(), assessment_field());
    props.insert("notes".into(), string_field());
    json!({"type": "object", "properties": props})
}

/// A group of named checks, each a bare assessed object.
fn checks(names: &[&str]) -> Value {
    let props: Map<String, Value> = names
        .iter()
        .map(|name| (name.to_string(), assessed(&[])))
        .collect();
    json!({"type": "object", "properties": props})
}

/// The Digital Component Analysis job aid completed in step 2.
pub fn job_aid_schema() -> Value {
    let component_specifications = assessed(&[
        (
            "file_format_requirements",
            assessed(&[
                ("allowed_formats", string_list()),
                ("format_restrictions", string_field()),
            ]),
        ),
        (
            "resolution_requirements",
            assessed(&[
                ("minimum_resolution", string_field()),
                ("optimal_resolution", string_field()),
            ]),
        ),
        (
            "color_profile_requirements",
            assessed(&[
                ("required_profile", string_field()),
                ("color_space", string_field()),
            ]),
        ),
        (
            "naming_convention_requirements",
            assessed(&[("pattern", string_field()), ("examples", string_list())]),
        ),
    ]);

    let component_metadata = assessed(&[
        ("required_fields", string_list()),
        ("optional_fields", string_list()),
        (
            "validation_rules",
            json!({"type": "object", "additionalProperties": {"type": "string"}}),
        ),
    ]);

    let component_qc = assessed(&[
        (
            "visual_quality_checks",
            checks(&["clarity", "lighting", "composition", "color_accuracy"]),
        ),
        (
            "technical_quality_checks",
            checks(&["compression_artifacts", "noise_levels", "sharpness"]),
        ),
        (
            "compliance_checks",
            checks(&["brand_guidelines", "legal_requirements", "accessibility_standards"]),
        ),
    ]);

    let component_linking = assessed(&[
        (
            "relationship_requirements",
            assessed(&[("required_links", string_list())]),
        ),
        (
            "dependency_checks",
            assessed(&[("dependencies", string_list())]),
        ),
    ]);

    let material_distribution_package_qc = assessed(&[
        (
            "package_integrity_checks",
            checks(&["completeness", "consistency"]),
        ),
        (
            "distribution_readiness_checks",
            checks(&["channel_requirements", "delivery_specifications"]),
        ),
    ]);

    json!({
        "type": "object",
        "properties": {
            "digital_component_analysis": {
                "type": "object",
                "properties": {
                    "instructions": {
                        "type": "string",
                        "description": "General instructions for completing the job aid"
                    },
                    "component_specifications": component_specifications,
                    "component_metadata": component_metadata,
                    "component_qc": component_qc,
                    "component_linking": component_linking,
                    "material_distribution_package_qc": material_distribution_package_qc,
                    "overall_assessment": {
                        "type": "object",
                        "properties": {
                            "status": assessment_field(),
                            "summary": string_field(),
                            "critical_issues": string_list(),
                            "recommendations": string_list()
                        },
                        "required": ["status"]
                    }
                }
            }
        },
        "required": ["digital_component_analysis"]
    })
}

/// The findings record produced in step 3.
pub fn findings_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "component_id": {
                "type": "string",
                "description": "Unique identifier for the digital component"
            },
            "component_name": {
                "type": "string",
                "description": "Name of the digital component"
            },
            "check_status": {
                "type": "string",
                "enum": ["PASSED", "FAILED", "PARTIAL"],
                "description": "Overall status of the compliance check"
            },
            "issues_detected": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "category": {
                            "type": "string",
                            "description": "Category of the issue (e.g., 'Visual Quality', 'Technical Specifications')"
                        },
                        "description": {
                            "type": "string",
                            "description": "Detailed description of the issue"
                        },
                        "action": {
                            "type": "string",
                            "description": "Recommended action to resolve the issue"
                        }
                    },
                    "required": ["category", "description"]
                },
                "description": "List of compliance issues detected"
            },
            "missing_information": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "field": {
                            "type": "string",
                            "description": "Field or attribute with missing information"
                        },
                        "description": {
                            "type": "string",
                            "description": "Description of what information is missing"
                        },
                        "action": {
                            "type": "string",
                            "description": "Recommended action to provide the missing information"
                        }
                    },
                    "required": ["field", "description"]
                },
                "description": "List of missing information that prevented complete assessment"
            },
            "recommendations": {
                "type": "array",
                "items": {"type": "string"},
                "description": "List of recommendations for improving compliance"
            }
        },
        "required": ["component_id", "check_status"]
    })
}

/// Check a completed job aid against the shape the pipeline relies on.
///
/// Every `assessment` and `status` string anywhere below the root must be a
/// valid [`Assessment`]; the overall assessment, when present, must carry a
/// status.
pub fn validate_job_aid(data: &Value) -> Result<(), String> {
    let root = data
        .as_object()
        .ok_or_else(|| "job aid must be a JSON object".to_string())?;
    let analysis = root
        .get("digital_component_analysis")
        .ok_or_else(|| "missing 'digital_component_analysis'".to_string())?;
    if !analysis.is_object() {
        return Err("'digital_component_analysis' must be an object".into());
    }
    if let Some(overall) = analysis.get("overall_assessment") {
        if !overall.is_object() {
            return Err("'overall_assessment' must be an object".into());
        }
        if overall.get("status").is_none() {
            return Err("'overall_assessment' is missing 'status'".into());
        }
    }
    check_assessments(analysis, "digital_component_analysis")
}

fn check_assessments(value: &Value, path: &str) -> Result<(), String> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = format!("{path}.{key}");
                if key == "assessment" || key == "status" {
                    match child {
                        Value::String(s) if Assessment::from_str(s).is_ok() => {}
                        // Blank fields are allowed where the model lacked information.
                        Value::String(s) if s.is_empty() => {}
                        Value::Null => {}
                        other => {
                            return Err(format!(
                                "{child_path}: {other} is not one of {}",
                                Assessment::VALUES.join(", ")
                            ));
                        }
                    }
                } else {
                    check_assessments(child, &child_path)?;
                }
            }
            Ok(())
        }
        Value::Array(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| check_assessments(item, &format!("{path}[{i}]"))),
        _ => Ok(()),
    }
}

/// Human-readable summary of a job aid's overall assessment.
pub fn assessment_summary(job_aid: &Value) -> String {
    let analysis = job_aid
        .get("digital_component_analysis")
        .unwrap_or(job_aid);
    let overall = analysis.get("overall_assessment");
    let field = |key: &str| overall.and_then(|o| o.get(key));

    let status = field("status")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("NEEDS_REVIEW");
    let summary = match field("summary").and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => s.to_string(),
        _ => match status {
            "PASS" => "The digital component meets all compliance requirements.".into(),
            "FAIL" => {
                "The digital component has compliance issues that need to be addressed.".into()
            }
            _ => "The digital component requires further review.".into(),
        },
    };

    let mut out = format!("Assessment Status: {status}\n\n{summary}");
    for (title, key) in [
        ("Critical Issues", "critical_issues"),
        ("Recommendations", "recommendations"),
    ] {
        let items: Vec<String> = field(key)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect();
        if items.is_empty() {
            continue;
        }
        out.push_str(&format!("\n\n{title}:\n"));
        for (i, item) in items.iter().enumerate() {
            out.push_str(&format!("{}. {item}\n", i + 1));
        }
    }
    out
}
