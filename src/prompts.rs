//! Prompt templates for the three analysis steps.

use serde_json::Value;

use crate::processors::Metadata;

const ANALYST_ROLE: &str = "\
You are a professional Digital Asset Management (DAM) analyst with expertise in compliance assessment and quality control.
Your role is to analyze digital assets against established guidelines, identify compliance issues, and provide structured feedback.
You have extensive experience in evaluating images for brand consistency, technical quality, legal compliance, and metadata completeness.
You are detail-oriented, objective, and able to communicate findings clearly in both technical and non-technical terms.";

const TASK_INSTRUCTIONS: &str = "\
TASK:
Analyze the provided image and metadata for compliance with Digital Asset Management standards. Follow these specific steps:

1. Examine the image for visual quality issues (blurriness, poor lighting, composition problems, etc.)
2. Assess technical specifications (resolution, file format, color profile)
3. Evaluate compliance with brand guidelines and legal requirements
4. Review metadata completeness and accuracy

OUTPUT INSTRUCTIONS:
Provide your analysis in the following structured format:

1. NOTES: Detailed observations about the image and metadata
2. JOB AID ASSESSMENT: Initial assessment of key compliance areas using the job aid structure
3. HUMAN-READABLE SECTION: A clear summary of findings written in professional language
4. NEXT STEPS: Recommended actions based on your analysis";

const OUTPUT_GUIDELINES: &str = r#"Your output must follow this exact structure:

```json
{
  "notes": "Detailed observations about visual quality, technical specifications, brand compliance, and metadata...",
  "job_aid_assessment": {
    "visual_quality": {
      "assessment": "PASS/FAIL/NEEDS_REVIEW",
      "issues": ["Issue 1", "Issue 2"]
    },
    "technical_specifications": {
      "assessment": "PASS/FAIL/NEEDS_REVIEW",
      "issues": ["Issue 1", "Issue 2"]
    },
    "brand_compliance": {
      "assessment": "PASS/FAIL/NEEDS_REVIEW",
      "issues": ["Issue 1", "Issue 2"]
    },
    "metadata_completeness": {
      "assessment": "PASS/FAIL/NEEDS_REVIEW",
      "issues": ["Issue 1", "Issue 2"]
    }
  },
  "human_readable_section": "Professional summary of findings...",
  "next_steps": [
    "Recommended action 1",
    "Recommended action 2"
  ]
}
```"#;

const JOB_AID_INSTRUCTIONS: &str = "\
Using the image and the initial assessment from Step 1, complete the full Digital Component Analysis Job Aid below.
For each field, provide a detailed assessment based on the image and metadata provided.
If information is missing or cannot be determined from the available data, leave the field blank.
Be thorough and specific in your assessments, noting any compliance issues or concerns.

DIGITAL COMPONENT ANALYSIS JOB AID:";

const JOB_AID_OUTPUT: &str = "\
OUTPUT INSTRUCTIONS:
Provide your completed job aid assessment as a valid JSON object following the exact schema provided.
For each field, include an \"assessment\" (PASS/FAIL/NEEDS_REVIEW) and \"notes\" with detailed observations.";

const FINDINGS_INSTRUCTIONS: &str = "\
Based on the completed job aid assessment from Step 2, generate a comprehensive findings report in two formats:

1. STRUCTURED JSON OUTPUT: A machine-readable summary of compliance status
2. HUMAN-READABLE REPORT: A professional communication suitable for stakeholders

The structured JSON output must follow this exact schema:";

const FINDINGS_OUTPUT: &str = "\
The human-readable report should be formatted as a professional communication with:
- A clear summary of overall compliance status
- Specific issues identified, organized by category
- Missing information that prevented complete assessment
- Actionable recommendations for addressing issues

Both outputs should be consistent with each other and accurately reflect the assessment from Step 2.";

/// Prompt for the initial DAM analysis.
pub fn format_step1_prompt(metadata: Option<&Metadata>) -> String {
    let mut parts = vec![ANALYST_ROLE.to_string()];
    parts.extend(metadata_block(metadata));
    parts.push(TASK_INSTRUCTIONS.to_string());
    parts.push(OUTPUT_GUIDELINES.to_string());
    parts.join("\n\n")
}

/// Prompt for completing the job aid from the step 1 analysis.
pub fn format_step2_prompt(
    job_aid_schema: &Value,
    step1_results: &Value,
    metadata: Option<&Metadata>,
) -> String {
    let mut parts = vec![ANALYST_ROLE.to_string()];
    parts.extend(metadata_block(metadata));
    parts.push(json_block("STEP 1 RESULTS", step1_results));
    parts.push(format!(
        "{JOB_AID_INSTRUCTIONS}\n{}",
        pretty(job_aid_schema)
    ));
    parts.push(JOB_AID_OUTPUT.to_string());
    parts.join("\n\n")
}

/// Prompt for turning the completed job aid into findings.
pub fn format_step3_prompt(
    findings_schema: &Value,
    step2_results: &Value,
    metadata: Option<&Metadata>,
) -> String {
    let mut parts = vec![ANALYST_ROLE.to_string()];
    parts.extend(metadata_block(metadata));
    parts.push(json_block("STEP 2 RESULTS", step2_results));
    parts.push(format!(
        "{FINDINGS_INSTRUCTIONS}\n{}",
        pretty(findings_schema)
    ));
    parts.push(FINDINGS_OUTPUT.to_string());
    parts.join("\n\n")
}

fn metadata_block(metadata: Option<&Metadata>) -> Option<String> {
    let metadata = metadata.filter(|m| !m.is_empty())?;
    Some(json_block("METADATA", &Value::Object(metadata.clone())))
}

fn json_block(title: &str, value: &Value) -> String {
    format!("{title}:\n```json\n{}\n```", pretty(value))
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
