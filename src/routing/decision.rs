//! Accept/reject routing.
//!
//! Decides what happens to a report once both stages have spoken.

use serde::{Deserialize, Serialize};

use crate::classification::ClassificationResult;
use crate::logging::structured::LogContext;
use crate::validation::ValidationReport;

pub const REASON_QUALITY_FAILED: &str = "Image quality validation failed";
pub const REASON_NOT_AN_ISSUE: &str = "AI confidence too low or not a civic issue";

/// Final verdict as stored and shown to the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentDecision {
    Accepted,
    Rejected,
}

impl AgentDecision {
    pub fn as_str(&self) -> &str {
        match self {
            AgentDecision::Accepted => "ACCEPTED",
            AgentDecision::Rejected => "REJECTED",
        }
    }
}

/// Terminal state of the report state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportRoute {
    /// Stage 0 found a hard error.
    RejectQuality,
    /// Stage 1 saw no civic issue, or not confidently enough.
    RejectNotAnIssue { detail: String },
    Accept { reason: String },
}

impl ReportRoute {
    pub fn as_str(&self) -> &str {
        match self {
            ReportRoute::RejectQuality => "reject_quality",
            ReportRoute::RejectNotAnIssue { .. } => "reject_not_an_issue",
            ReportRoute::Accept { .. } => "accept",
        }
    }

    pub fn agent_decision(&self) -> AgentDecision {
        match self {
            ReportRoute::Accept { .. } => AgentDecision::Accepted,
            _ => AgentDecision::Rejected,
        }
    }

    pub fn agent_reason(&self) -> &str {
        match self {
            ReportRoute::RejectQuality => REASON_QUALITY_FAILED,
            ReportRoute::RejectNotAnIssue { .. } => REASON_NOT_AN_ISSUE,
            ReportRoute::Accept { reason } => reason,
        }
    }
}

/// # Decision Tree
/// 1. Validation report has hard errors -> RejectQuality
/// 2. No classification, or not a valid issue -> RejectNotAnIssue
/// 3. Otherwise -> Accept, with the classifier's message as reason
pub fn determine_route(
    report: &ValidationReport,
    classification: Option<&ClassificationResult>,
    ctx: &LogContext,
) -> ReportRoute {
    if !report.is_valid {
        log::warn!(
            "{} ROUTING_DECISION route=reject_quality errors={:?}",
            ctx,
            report.errors
        );
        return ReportRoute::RejectQuality;
    }

    match classification {
        Some(c) if c.is_valid_issue => {
            log::info!(
                "{} ROUTING_DECISION route=accept class={} final_score={:.2}",
                ctx,
                c.predicted_class,
                c.final_score
            );
            ReportRoute::Accept {
                reason: c.message.clone(),
            }
        }
        Some(c) => {
            log::warn!(
                "{} ROUTING_DECISION route=reject_not_an_issue class={} confidence={:.1}",
                ctx,
                c.predicted_class,
                c.confidence
            );
            ReportRoute::RejectNotAnIssue {
                detail: format!(
                    "AI could not identify a valid civic issue. Detected: {} with {:.1}% confidence.",
                    c.predicted_class, c.confidence
                ),
            }
        }
        None => {
            log::warn!(
                "{} ROUTING_DECISION route=reject_not_an_issue reason=no_classification",
                ctx
            );
            ReportRoute::RejectNotAnIssue {
                detail: "AI could not identify a valid civic issue.".to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{CheckName, CheckResult};

    fn ctx() -> LogContext {
        LogContext::new("test-report")
    }

    fn report(hard_fail: bool) -> ValidationReport {
        let resolution = if hard_fail {
            CheckResult::fail(CheckName::Resolution, 16.67, "Resolution too low: 50x50")
        } else {
            CheckResult::pass(CheckName::Resolution, 100.0, "Resolution OK")
        };
        ValidationReport::from_checks(vec![resolution], "photo.jpg")
    }

    #[test]
    fn test_quality_failure_rejects() {
        let route = determine_route(&report(true), None, &ctx());
        assert_eq!(route, ReportRoute::RejectQuality);
        assert_eq!(route.agent_decision(), AgentDecision::Rejected);
        assert_eq!(route.agent_reason(), "Image quality validation failed");
    }

    #[test]
    fn test_missing_classification_rejects() {
        let route = determine_route(&report(false), None, &ctx());
        assert_eq!(route.as_str(), "reject_not_an_issue");
        assert_eq!(route.agent_decision(), AgentDecision::Rejected);
    }

    #[test]
    fn test_decision_serializes_uppercase() {
        assert_eq!(
            serde_json::to_value(AgentDecision::Accepted).unwrap(),
            "ACCEPTED"
        );
        assert_eq!(AgentDecision::Rejected.as_str(), "REJECTED");
    }
}
