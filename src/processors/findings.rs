//! Step 3: findings transmission.
//!
//! This is the last step, so a reply that cannot be read strictly still has
//! to produce something a person can act on. [`parse_findings`] therefore
//! never fails: it walks from the strictest interpretation of the reply down
//! to an emergency `PARTIAL` record that quotes the raw text.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::common::{finish, require_previous, send_request, validate_image};
use super::{Metadata, StepProcessor};
use crate::error::ProcessorError;
use crate::gemini::parse::as_fallback_text;
use crate::gemini::{AiClient, AiResponse, extract_json};
use crate::prompts::format_step3_prompt;
use crate::report::{compliance_report, emergency_report, interpreted_report, today};
use crate::schema::{CheckStatus, Findings, Issue, MissingInfo, findings_schema};
use crate::workflow::{ProcessorResult, Step};

const MAX_ISSUES: usize = 5;
const MAX_MISSING: usize = 3;
const MAX_RECOMMENDATIONS: usize = 5;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid findings regex")
}

static COMPONENT_FIELD: LazyLock<Regex> =
    LazyLock::new(|| re(r#"(?i)component[_\s]*(?:id|name)["\s]*:?\s*["']?([^"'\n,}]+)"#));
static STATUS_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    re(r#"(?i)(?:check[_\s]*)?status["\s]*:?\s*["']?(PASSED|FAILED|PARTIAL)["']?"#)
});
static LISTED_ISSUES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        re(r#"(?i)issues?["\s]*:?\s*\[([^\]]+)\]"#),
        re(r#"(?i)problems?["\s]*:?\s*([^.\n]+)"#),
        re(r#"(?i)errors?["\s]*:?\s*([^.\n]+)"#),
    ]
});

static PROSE_ISSUES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        re(r"(?i)(?:issue|problem|error|concern)s?[:\s]*([^.\n]{10,100})"),
        re(r"(?i)(?:not|doesn't|cannot|fails? to)[^.\n]{5,80}"),
        re(r"(?i)(?:poor|inadequate|insufficient|missing)[^.\n]{5,80}"),
    ]
});
static PROSE_RECOMMENDATIONS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        re(r"(?i)recommends?[:\s]*([^.\n]{10,150})"),
        re(r"(?i)suggests?[:\s]*([^.\n]{10,150})"),
        re(r"(?i)should[:\s]*([^.\n]{10,150})"),
        re(r"(?i)consider[:\s]*([^.\n]{10,150})"),
        re(r"(?i)(?:to improve|for better)[^.\n]{10,150}"),
    ]
});
static PROSE_MISSING: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        re(r"(?i)(?:missing|lacks?|absent|not provided)[:\s]*([^.\n]{10,100})"),
        re(r"(?i)(?:no|without)[^.\n]{5,80}(?:metadata|information|data)"),
        re(r"(?i)(?:incomplete|insufficient)[^.\n]{5,80}"),
    ]
});
static PROSE_COMPONENT: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        re(r"(?i)(?:component|image|file|asset)[_\s]*(?:id|name)[:\s]*(\S{3,50})"),
        re(r"(?i)(?:analyzing|processing)[:\s]*(\S{3,50})"),
    ]
});

static REPORT_SECTIONS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        re(r"(?is)HUMAN[- ]?READABLE[- ]?REPORT:\s*\n(.*?)(?:\n\n---|\z)"),
        re(r"(?is)\*\*DIGITAL ASSET COMPLIANCE ASSESSMENT REPORT\*\*(.*?)(?:\n\n---|\z)"),
        re(r"(?is)(?:FINDINGS|SUMMARY|ASSESSMENT)[- ]?REPORT:\s*\n(.*?)(?:\n\n|\z)"),
    ]
});
static EXTRA_BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| re(r"\n\s*\n\s*\n"));

const POSITIVE_WORDS: &[&str] = &[
    "passed",
    "compliant",
    "acceptable",
    "meets",
    "satisfies",
    "adequate",
    "good",
    "excellent",
];
const NEGATIVE_WORDS: &[&str] = &[
    "failed",
    "non-compliant",
    "unacceptable",
    "issues",
    "problems",
    "errors",
    "poor",
    "inadequate",
];
const REVIEW_WORDS: &[&str] = &[
    "needs review",
    "requires attention",
    "should be",
    "consider",
    "may need",
    "potential",
];

/// Step 3: turn the completed job aid into findings plus a stakeholder report.
pub struct FindingsProcessor {
    client: Arc<dyn AiClient>,
}

impl FindingsProcessor {
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
        let step2 = require_previous(Step::Step3, previous, &["completed_job_aid"])?;

        info!("Sending Step 3 Findings Transmission request to AI model");
        let prompt = format_step3_prompt(&findings_schema(), &Value::Object(step2.clone()), metadata);
        let response = send_request(self.client.as_ref(), image_bytes, prompt).await?;

        let data = parse_findings(self.client.as_ref(), &response, today());
        Ok((data, response.text))
    }
}

#[async_trait]
impl StepProcessor for FindingsProcessor {
    async fn process(
        &self,
        image_bytes: &[u8],
        metadata: Option<&Metadata>,
        previous_step_data: Option<&Value>,
    ) -> Result<ProcessorResult, ProcessorError> {
        Ok(finish(
            Step::Step3,
            self.run(image_bytes, metadata, previous_step_data).await,
        ))
    }
}

/// Interpret a findings reply as `{json_output, human_readable_report}`.
pub fn parse_findings(client: &dyn AiClient, response: &AiResponse, date: NaiveDate) -> Value {
    let text = response.text.as_str();
    let parsed = client.parse_structured_response(response);

    let outcome = if as_fallback_text(&parsed) == Some(text) {
        dual_format(text, date)
    } else {
        structured(&parsed, date)
    };

    if let Some(outcome) = outcome {
        return outcome;
    }
    warn!("Findings reply not in the expected format, falling back to text extraction");

    partial_fields(text, date)
        .or_else(|| text_analysis(text, date))
        .unwrap_or_else(|| {
            warn!("Using emergency findings response");
            emergency(text, date)
        })
}

fn output(findings: &Findings, report: String) -> Value {
    json!({
        "json_output": findings.to_value(),
        "human_readable_report": report,
    })
}

/// The client already found a JSON object in the reply.
fn structured(data: &Value, date: NaiveDate) -> Option<Value> {
    if let (Some(json_output), Some(report)) = (
        data.get("json_output"),
        data.get("human_readable_report").and_then(Value::as_str),
    ) {
        let findings = Findings::normalize(json_output);
        return Some(output(&findings, report.to_string()));
    }
    if Findings::looks_like_findings(data) {
        let findings = Findings::normalize(data);
        return Some(output(&findings, compliance_report(&findings, date)));
    }
    None
}

/// A JSON block somewhere in the text, optionally followed by a report.
fn dual_format(text: &str, date: NaiveDate) -> Option<Value> {
    let json = extract_json(text)?;
    let data: Value = match serde_json::from_str(json) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => return None,
        Err(e) => {
            warn!("Invalid JSON in findings reply: {e}");
            return None;
        }
    };

    if data.get("json_output").is_some() {
        return structured(&data, date);
    }
    let findings = Findings::normalize(&data);
    let report =
        report_section(text).unwrap_or_else(|| compliance_report(&findings, date));
    Some(output(&findings, report))
}

/// Find a human-readable report section in the reply.
fn report_section(text: &str) -> Option<String> {
    for pattern in REPORT_SECTIONS.iter() {
        if let Some(m) = pattern.captures(text).and_then(|c| c.get(1)) {
            let section = m.as_str().trim();
            if section.chars().count() > 50 {
                return Some(collapse_blank_lines(section));
            }
        }
    }

    let after_json = &text[text.rfind('}')? + 1..];
    let trailing = after_json.trim();
    let upper = trailing.to_uppercase();
    let report_like =
        trailing.contains("**") || upper.contains("DIGITAL ASSET") || upper.contains("COMPLIANCE");
    (report_like && trailing.chars().count() > 50).then(|| collapse_blank_lines(trailing))
}

fn collapse_blank_lines(text: &str) -> String {
    EXTRA_BLANK_LINES.replace_all(text, "\n\n").trim().to_string()
}

/// Loose `key: value` fragments of a findings record.
fn partial_fields(text: &str, date: NaiveDate) -> Option<Value> {
    let mut data = serde_json::Map::new();
    if let Some(id) = first_capture(&COMPONENT_FIELD, text) {
        data.insert("component_id".into(), Value::String(id.trim().to_string()));
    }
    if let Some(status) = first_capture(&STATUS_FIELD, text) {
        data.insert("check_status".into(), Value::String(status.to_uppercase()));
    }

    let issues: Vec<Value> = matches(&LISTED_ISSUES, text)
        .into_iter()
        .filter(|m| m.chars().count() > 5)
        .map(|description| {
            json!({
                "category": "Quality",
                "description": description,
                "action": "Review and address this issue",
            })
        })
        .collect();

    if data.is_empty() && issues.is_empty() {
        return None;
    }
    data.insert("issues_detected".into(), Value::Array(issues));
    let findings = Findings::normalize(&Value::Object(data));
    Some(output(&findings, compliance_report(&findings, date)))
}

/// Keyword-driven reading of a prose reply.
fn text_analysis(text: &str, date: NaiveDate) -> Option<Value> {
    let lower = text.to_lowercase();
    let count = |words: &[&str]| words.iter().filter(|w| lower.contains(**w)).count();
    let positive = count(POSITIVE_WORDS);
    let negative = count(NEGATIVE_WORDS);
    let review = count(REVIEW_WORDS);

    let issues: Vec<String> = matches(&PROSE_ISSUES, text)
        .into_iter()
        .filter(|m| m.chars().count() > 10)
        .collect();
    let missing: Vec<String> = matches(&PROSE_MISSING, text)
        .into_iter()
        .filter(|m| m.chars().count() > 10)
        .collect();
    let mut recommendations: Vec<String> = Vec::new();
    for rec in matches(&PROSE_RECOMMENDATIONS, text) {
        let rec = rec.trim_end_matches(['.', ',', ';']).to_string();
        if rec.chars().count() > 10 && !recommendations.contains(&rec) {
            recommendations.push(rec);
        }
    }

    if positive + negative + review == 0
        && issues.is_empty()
        && missing.is_empty()
        && recommendations.is_empty()
    {
        return None;
    }

    let status = if negative > positive {
        CheckStatus::Failed
    } else if positive > negative && review == 0 {
        CheckStatus::Passed
    } else {
        CheckStatus::Partial
    };

    if recommendations.is_empty() {
        let defaults: &[&str] = match status {
            CheckStatus::Failed => &[
                "Address the identified compliance issues",
                "Review image quality and technical specifications",
                "Ensure all required metadata is complete",
            ],
            CheckStatus::Passed => &[
                "Continue with current quality standards",
                "Maintain compliance with established guidelines",
            ],
            CheckStatus::Partial => &[
                "Review the analysis results carefully",
                "Consider additional quality checks if needed",
            ],
        };
        recommendations = defaults.iter().map(|s| s.to_string()).collect();
    }

    let component_id = PROSE_COMPONENT
        .iter()
        .filter_map(|pattern| first_capture(pattern, text))
        .map(|id| id.trim_matches(['.', ',', ';', ':', '"', '\'']).to_string())
        .find(|id| id.chars().count() > 2)
        .unwrap_or_else(|| "ANALYSIS_RESULT".to_string());

    let findings = Findings {
        component_id,
        component_name: "Digital Asset Analysis".into(),
        check_status: status,
        issues_detected: issues
            .into_iter()
            .take(MAX_ISSUES)
            .map(|description| Issue {
                category: "Quality Assessment".into(),
                description,
                action: Some("Review and address this finding".into()),
            })
            .collect(),
        missing_information: missing
            .into_iter()
            .take(MAX_MISSING)
            .map(|description| MissingInfo {
                field: "content_analysis".into(),
                description,
                action: Some("Provide the missing information".into()),
            })
            .collect(),
        recommendations: recommendations.into_iter().take(MAX_RECOMMENDATIONS).collect(),
    };
    Some(output(&findings, interpreted_report(text, &findings, date)))
}

fn emergency(text: &str, date: NaiveDate) -> Value {
    let findings = Findings {
        component_id: "ANALYSIS_RESULT".into(),
        component_name: "DAM Analysis".into(),
        check_status: CheckStatus::Partial,
        issues_detected: Vec::new(),
        missing_information: vec![MissingInfo {
            field: "response_format".into(),
            description: "Unable to parse AI response in expected format".into(),
            action: Some("Try running the analysis again or contact support".into()),
        }],
        recommendations: vec![
            "Retry the analysis with the same or different image".into(),
            "Check that the image is clear and metadata is complete".into(),
            "Contact technical support if the issue persists".into(),
        ],
    };
    let report = emergency_report(text, &findings.component_name, date);
    output(&findings, report)
}

fn first_capture<'t>(pattern: &Regex, text: &'t str) -> Option<&'t str> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Every match of every pattern, taking the first group when the pattern
/// has one and the whole match otherwise.
fn matches(patterns: &[Regex], text: &str) -> Vec<String> {
    patterns
        .iter()
        .flat_map(|pattern| pattern.captures_iter(text))
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::common::testing::CannedClient;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0];

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn parse(text: &str) -> Value {
        let client = CannedClient::ok(text);
        parse_findings(&client, &AiResponse::from_text(text), date())
    }

    #[tokio::test]
    async fn produces_findings_and_report() {
        let reply = json!({
            "component_id": "IMG-9",
            "component_name": "Spring banner",
            "check_status": "FAILED",
            "issues_detected": [{"category": "Resolution", "description": "Below 1080p"}],
            "recommendations": ["Supply a higher resolution master"]
        })
        .to_string();
        let client = Arc::new(CannedClient::ok(&reply));
        let previous = json!({"completed_job_aid": {"digital_component_analysis": {}}});

        let result = FindingsProcessor::new(client.clone())
            .process(JPEG, None, Some(&previous))
            .await
            .unwrap();

        let data = result.data().unwrap();
        assert_eq!(data["json_output"]["component_id"], "IMG-9");
        assert_eq!(data["json_output"]["check_status"], "FAILED");
        let report = data["human_readable_report"].as_str().unwrap();
        assert!(report.contains("**Component:** Spring banner"));
        assert!(report.contains("1. Supply a higher resolution master"));
        assert!(client.last_prompt().contains("STEP 2 RESULTS:"));
    }

    #[tokio::test]
    async fn requires_completed_job_aid() {
        let client = Arc::new(CannedClient::ok("{}"));
        let previous = json!({"assessment_summary": "x"});

        let result = FindingsProcessor::new(client.clone())
            .process(JPEG, None, Some(&previous))
            .await
            .unwrap();

        assert_eq!(
            result.error_message(),
            Some("Step 3 validation error: Previous step result missing required fields: completed_job_aid")
        );
        assert_eq!(client.call_count(), 0);
    }

    #[test]
    fn dual_format_reply_keeps_model_report() {
        let parsed = parse(&format!(
            "{}\n\n**DIGITAL ASSET COMPLIANCE ASSESSMENT REPORT**\nThe banner passes every brand and technical check we ran against it.",
            json!({"json_output": {"component_id": "B-1", "check_status": "PASSED"},
                   "human_readable_report": "All good, the banner passes every brand and technical check."})
        ));
        assert_eq!(parsed["json_output"]["check_status"], "PASSED");
        assert_eq!(
            parsed["human_readable_report"],
            "All good, the banner passes every brand and technical check."
        );
    }

    #[test]
    fn json_with_trailing_report_section() {
        let text = format!(
            "STRUCTURED JSON OUTPUT:\n```json\n{}\n```\n\nHUMAN-READABLE REPORT:\nThe logo placement violates the clear-space rule and must be corrected before release.",
            json!({"component_id": "L-2", "check_status": "FAILED"})
        );
        let client = CannedClient::ok(&text);
        let response = AiResponse::from_text(text.clone());
        let parsed = dual_format(&response.text, date()).unwrap();
        assert_eq!(parsed["json_output"]["component_id"], "L-2");
        assert!(parsed["human_readable_report"]
            .as_str()
            .unwrap()
            .starts_with("The logo placement violates"));

        let full = parse_findings(&client, &response, date());
        assert_eq!(full["json_output"]["check_status"], "FAILED");
    }

    #[test]
    fn structured_reply_without_findings_shape_falls_back() {
        let parsed = parse(r#"{"verdict": "fine"} Status: PASSED"#);
        assert_eq!(parsed["json_output"]["check_status"], "PASSED");
        assert_eq!(parsed["json_output"]["component_id"], "UNKNOWN");
    }

    #[test]
    fn partial_fields_are_extracted() {
        let parsed = parse("component_id: HERO-3\ncheck status: failed\nproblems: the watermark is visible");
        let findings = &parsed["json_output"];
        assert_eq!(findings["component_id"], "HERO-3");
        assert_eq!(findings["check_status"], "FAILED");
        assert_eq!(findings["issues_detected"][0]["category"], "Quality");
        assert_eq!(
            findings["issues_detected"][0]["description"],
            "the watermark is visible"
        );
    }

    #[test]
    fn prose_reply_is_interpreted() {
        let parsed = parse(
            "The asset looks compliant and meets brand standards. We recommend adding alt text for accessibility.",
        );
        let findings = &parsed["json_output"];
        assert_eq!(findings["check_status"], "PASSED");
        assert_eq!(findings["component_name"], "Digital Asset Analysis");
        assert_eq!(
            findings["recommendations"],
            json!(["adding alt text for accessibility"])
        );
        let report = parsed["human_readable_report"].as_str().unwrap();
        assert!(report.contains("the component status is PASSED"));
    }

    #[test]
    fn negative_prose_fails_with_default_recommendations() {
        let parsed = parse("Lighting is poor quality overall and colours look unacceptable.");
        let findings = &parsed["json_output"];
        assert_eq!(findings["check_status"], "FAILED");
        assert_eq!(
            findings["recommendations"][0],
            "Address the identified compliance issues"
        );
    }

    #[test]
    fn unreadable_reply_gets_emergency_response() {
        let raw = "x".repeat(320);
        let parsed = parse(&raw);
        let findings = &parsed["json_output"];
        assert_eq!(findings["component_id"], "ANALYSIS_RESULT");
        assert_eq!(findings["check_status"], "PARTIAL");
        assert_eq!(findings["missing_information"][0]["field"], "response_format");

        let report = parsed["human_readable_report"].as_str().unwrap();
        assert!(report.contains(&format!("{}...", "x".repeat(300))));
        assert!(report.contains("**Analysis Date:** 2024-05-01"));
    }

    #[test]
    fn report_section_after_json() {
        let text = "{\"component_id\": \"X\"}\n\n**Compliance summary** everything checked out fine for this asset today.";
        assert_eq!(
            report_section(text).as_deref(),
            Some("**Compliance summary** everything checked out fine for this asset today.")
        );
        assert_eq!(report_section("{} short"), None);
    }
}
