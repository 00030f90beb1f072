//! Markdown compliance reports built from findings.

use chrono::{Local, NaiveDate};

use crate::schema::{CheckStatus, Findings};

/// Date stamped on reports generated now.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// The full stakeholder report for a findings record.
pub fn compliance_report(findings: &Findings, date: NaiveDate) -> String {
    let status = findings.check_status;
    let mut lines: Vec<String> = vec![
        "**DIGITAL ASSET COMPLIANCE ASSESSMENT REPORT**".into(),
        String::new(),
        format!("**Component:** {}", findings.component_name),
        format!("**Component ID:** {}", findings.component_id),
        format!("**Assessment Date:** {}", date.format("%Y-%m-%d")),
        format!("**Status:** {status}"),
        String::new(),
        "**Executive Summary:**".into(),
    ];

    lines.push(match status {
        CheckStatus::Passed => "The digital component has successfully passed all compliance checks and meets the required standards. No critical issues were identified during the comprehensive assessment.".into(),
        CheckStatus::Failed => format!(
            "The digital component has failed compliance assessment with {} issue(s) detected and {} piece(s) of missing information. Immediate attention is required to address the identified concerns.",
            findings.issues_detected.len(),
            findings.missing_information.len()
        ),
        CheckStatus::Partial => "The digital component assessment was completed with some limitations. Review the findings below for detailed information.".into(),
    });
    lines.push(String::new());

    lines.push(format!(
        "**Issues Detected:** {}",
        findings.issues_detected.len()
    ));
    if findings.issues_detected.is_empty() {
        lines.push("✅ No issues detected".into());
        lines.push(String::new());
    } else {
        lines.push(String::new());
        for (i, issue) in findings.issues_detected.iter().enumerate() {
            lines.push(format!("**{}. {}**", i + 1, issue.category));
            lines.push(format!("   - **Issue:** {}", issue.description));
            if let Some(action) = &issue.action {
                lines.push(format!("   - **Required Action:** {action}"));
            }
            lines.push(String::new());
        }
    }

    lines.push(format!(
        "**Missing Information:** {}",
        findings.missing_information.len()
    ));
    if findings.missing_information.is_empty() {
        lines.push("✅ No missing information".into());
        lines.push(String::new());
    } else {
        lines.push(String::new());
        for (i, missing) in findings.missing_information.iter().enumerate() {
            lines.push(format!("**{}. {}**", i + 1, missing.field));
            lines.push(format!("   - **Missing:** {}", missing.description));
            if let Some(action) = &missing.action {
                lines.push(format!("   - **Required Action:** {action}"));
            }
            lines.push(String::new());
        }
    }

    lines.push("**Recommendations:**".into());
    if findings.recommendations.is_empty() {
        let defaults: &[&str] = match status {
            CheckStatus::Passed => &[
                "Continue maintaining current quality standards",
                "Ensure consistent compliance with established guidelines",
            ],
            _ => &[
                "Review all identified issues and missing information",
                "Implement corrective actions as specified above",
                "Re-submit for assessment after addressing concerns",
            ],
        };
        lines.extend(numbered(defaults.iter().copied()));
    } else {
        lines.push(String::new());
        lines.extend(numbered(findings.recommendations.iter().map(String::as_str)));
    }
    lines.push(String::new());

    lines.push("**Conclusion:**".into());
    lines.push(match status {
        CheckStatus::Passed => "This digital asset is approved for use and meets all compliance requirements. No further action is required at this time.",
        CheckStatus::Failed => "This digital asset requires remediation before it can be approved for use. Please address all identified issues and resubmit for assessment.",
        CheckStatus::Partial => "This assessment was completed with some limitations. Please review the findings and consider rerunning the analysis if needed.",
    }.into());
    lines.push(String::new());
    lines.push("---".into());
    lines.push("*This report was generated by the DAM Compliance Analyzer.*".into());
    lines.push("*For questions or concerns, please contact your DAM administrator.*".into());

    lines.join("\n")
}

/// Report for findings that had to be inferred from free text, quoting the
/// start of the model reply.
pub fn interpreted_report(raw_text: &str, findings: &Findings, date: NaiveDate) -> String {
    let status = findings.check_status;
    let mut out = format!(
        "**DAM Compliance Analysis Report**\n\n\
         **Component:** {}\n\
         **Component ID:** {}\n\
         **Analysis Date:** {}\n\
         **Status:** {status}\n\n\
         **Analysis Summary:**\n\
         Based on the AI analysis, the component status is {status}.\n\n\
         **Original AI Response Summary:**\n\
         {}\n\n\
         **Issues Detected:** {}\n\
         **Missing Information:** {}\n\
         **Recommendations:** {}\n\n\
         **Recommendations:**",
        findings.component_name,
        findings.component_id,
        date.format("%Y-%m-%d"),
        excerpt(raw_text, 400),
        findings.issues_detected.len(),
        findings.missing_information.len(),
        findings.recommendations.len(),
    );
    let recommendations: Vec<String> = if findings.recommendations.is_empty() {
        numbered(
            [
                "Review the analysis results carefully",
                "Consider re-running the analysis if needed",
            ]
            .into_iter(),
        )
        .collect()
    } else {
        numbered(findings.recommendations.iter().map(String::as_str)).collect()
    };
    for line in recommendations {
        out.push('\n');
        out.push_str(&line);
    }
    out.push_str(
        "\n\n**Note:** This report was generated using enhanced parsing due to response format variations.\n\
         The analysis was completed successfully but required interpretation of the AI response.",
    );
    out
}

/// Last-resort report when nothing useful could be extracted.
pub fn emergency_report(raw_text: &str, component_name: &str, date: NaiveDate) -> String {
    format!(
        "**DAM Compliance Analysis Report**\n\n\
         **Status:** PARTIAL - Analysis completed with parsing limitations\n\
         **Component:** {component_name}\n\
         **Analysis Date:** {}\n\n\
         **Summary:**\n\
         The analysis was completed but encountered formatting issues in the response.\n\
         The system was able to process your request but could not extract detailed findings.\n\n\
         **Raw AI Response (first 300 characters):**\n\
         {}\n\n\
         **Recommendations:**\n\
         - Try running the analysis again\n\
         - Ensure your image is clear and well-lit\n\
         - Verify that metadata is complete and accurate\n\
         - Contact support if issues persist\n\n\
         **Note:** This is a partial result due to response parsing limitations.",
        date.format("%Y-%m-%d"),
        excerpt(raw_text, 300),
    )
}

/// The first `max_chars` characters, with an ellipsis when truncated.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn numbered<'a>(items: impl Iterator<Item = &'a str>) -> impl Iterator<Item = String> {
    items.enumerate().map(|(i, item)| format!("{}. {item}", i + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Issue, MissingInfo};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    fn failed_findings() -> Findings {
        Findings {
            component_id: "IMG-42".into(),
            component_name: "Product hero".into(),
            check_status: CheckStatus::Failed,
            issues_detected: vec![Issue {
                category: "Visual Quality".into(),
                description: "Image is blurry".into(),
                action: Some("Reshoot with tripod".into()),
            }],
            missing_information: vec![MissingInfo {
                field: "copyright".into(),
                description: "No copyright holder".into(),
                action: None,
            }],
            recommendations: vec![],
        }
    }

    #[test]
    fn failed_report_lists_everything() {
        let report = compliance_report(&failed_findings(), date());

        assert!(report.starts_with("**DIGITAL ASSET COMPLIANCE ASSESSMENT REPORT**"));
        assert!(report.contains("**Component ID:** IMG-42"));
        assert!(report.contains("**Assessment Date:** 2024-03-09"));
        assert!(report.contains("with 1 issue(s) detected and 1 piece(s) of missing information"));
        assert!(report.contains("**1. Visual Quality**\n   - **Issue:** Image is blurry\n   - **Required Action:** Reshoot with tripod"));
        assert!(report.contains("**1. copyright**\n   - **Missing:** No copyright holder\n\n"));
        assert!(report.contains("3. Re-submit for assessment after addressing concerns"));
        assert!(report.contains("requires remediation before it can be approved"));
    }

    #[test]
    fn passed_report_uses_clean_defaults() {
        let findings = Findings {
            check_status: CheckStatus::Passed,
            issues_detected: vec![],
            missing_information: vec![],
            ..failed_findings()
        };
        let report = compliance_report(&findings, date());

        assert!(report.contains("✅ No issues detected"));
        assert!(report.contains("✅ No missing information"));
        assert!(report.contains("1. Continue maintaining current quality standards"));
        assert!(report.contains("approved for use"));
    }

    #[test]
    fn emergency_report_truncates_raw_text() {
        let raw = "x".repeat(450);
        let report = emergency_report(&raw, "DAM Analysis", date());
        assert!(report.contains(&format!("{}...", "x".repeat(300))));
        assert!(!report.contains(&"x".repeat(301)));
        assert!(report.contains("**Status:** PARTIAL"));
    }

    #[test]
    fn interpreted_report_counts_sections() {
        let mut findings = failed_findings();
        findings.recommendations = vec!["Fix lighting".into()];
        let report = interpreted_report("the image has problems", &findings, date());
        assert!(report.contains("the component status is FAILED"));
        assert!(report.contains("**Issues Detected:** 1"));
        assert!(report.contains("**Recommendations:**\n1. Fix lighting"));
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("héllo", 2), "hé...");
        assert_eq!(excerpt("short", 10), "short");
    }
}
