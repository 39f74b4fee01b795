//! Aggregation of check results into one validation verdict.

use serde::Serialize;

use crate::geo::round_to;
use crate::validation::checks::CheckResult;

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// True iff no hard check failed.
    pub is_valid: bool,
    /// Weighted mean of check scores, 0-100.
    pub overall_quality: f64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub checks: Vec<CheckResult>,
    pub filename: String,
}

impl ValidationReport {
    /// Partition failures into errors (hard checks) and warnings (everything
    /// else plus passed checks flagged `soft_warning`), keeping battery order.
    pub fn from_checks(checks: Vec<CheckResult>, filename: impl Into<String>) -> Self {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for check in &checks {
            if !check.passed {
                if check.name.is_hard() {
                    errors.push(check.message.clone());
                } else {
                    warnings.push(check.message.clone());
                }
            } else if check.soft_warning {
                warnings.push(check.message.clone());
            }
        }

        Self {
            is_valid: errors.is_empty(),
            overall_quality: round_to(weighted_quality(&checks), 2),
            errors,
            warnings,
            checks,
            filename: filename.into(),
        }
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

/// Weighted mean of check scores; 0 when there is nothing to weigh.
pub fn weighted_quality(checks: &[CheckResult]) -> f64 {
    let (total, weight) = checks.iter().fold((0.0, 0.0), |(total, weight), check| {
        let w = check.name.weight();
        (total + check.score * w, weight + w)
    });
    if weight == 0.0 {
        0.0
    } else {
        total / weight
    }
}
