use chrono::{DateTime, Utc};

use crate::error::{ConfigurationError, DataError, GateError};
use crate::types::{CheckName, CheckStatus, Decision, EvaluationReport, GateCheck, GateConfig};

// ============================================================================
// Public API
// ============================================================================

/// Evaluate one report against the gate thresholds.
///
/// Every check runs (no short-circuit) so the decision explains all
/// failures at once. Malformed inputs return [`GateError`] instead of a
/// decision.
pub fn evaluate(report: &EvaluationReport, config: &GateConfig) -> Result<Decision, GateError> {
    evaluate_at(report, config, Utc::now())
}

/// [`evaluate`] with an explicit evaluation timestamp.
pub fn evaluate_at(
    report: &EvaluationReport,
    config: &GateConfig,
    evaluated_at: DateTime<Utc>,
) -> Result<Decision, GateError> {
    validate_config(config)?;
    check_upstream(report)?;
    validate_report(report)?;

    // Stable ordering: primary metric, fairness, explainability.
    let checks = vec![
        check_primary_metric(report, config),
        check_fairness(report, config),
        check_explainability(report, config),
    ];

    Ok(Decision::new(
        checks,
        report.primary_metric_name.clone(),
        evaluated_at,
    ))
}

/// Reject thresholds that cannot express a meaningful gate.
pub fn validate_config(config: &GateConfig) -> Result<(), ConfigurationError> {
    let min = config.min_primary_metric;
    if !min.is_finite() || !(0.0..=1.0).contains(&min) {
        return Err(ConfigurationError::MinPrimaryMetricOutOfRange(min));
    }
    if let Some(gap) = config.max_fairness_gap {
        if !gap.is_finite() || gap < 0.0 {
            return Err(ConfigurationError::InvalidMaxFairnessGap(gap));
        }
    }
    Ok(())
}

/// Fail closed on any value the checks could not compare meaningfully.
pub fn validate_report(report: &EvaluationReport) -> Result<(), DataError> {
    let name = &report.primary_metric_name;
    let value = report.primary_metric;
    if !value.is_finite() {
        return Err(DataError::NonFinitePrimaryMetric {
            name: name.clone(),
            value,
        });
    }
    if !(0.0..=1.0).contains(&value) {
        return Err(DataError::PrimaryMetricOutOfRange {
            name: name.clone(),
            value,
        });
    }

    if let Some((attribute, value)) = report
        .fairness_metrics
        .iter()
        .find(|(_, v)| !v.is_finite())
    {
        return Err(DataError::NonFiniteFairnessMetric {
            attribute: attribute.clone(),
            value: *value,
        });
    }

    if let Some((feature, value)) = report
        .explainability_summary
        .iter()
        .find(|(_, v)| !v.is_finite())
    {
        return Err(DataError::NonFiniteAttribution {
            feature: feature.clone(),
            value: *value,
        });
    }

    Ok(())
}

// ============================================================================
// Checks
// ============================================================================

fn check_upstream(report: &EvaluationReport) -> Result<(), GateError> {
    if report.failed_steps.is_empty() {
        return Ok(());
    }
    Err(GateError::Upstream {
        failures: report.failed_steps.clone(),
    })
}

fn check_primary_metric(report: &EvaluationReport, config: &GateConfig) -> GateCheck {
    let value = report.primary_metric;
    let min = config.min_primary_metric;

    let (status, reason) = if value >= min {
        (
            CheckStatus::Pass,
            format!(
                "primary metric {} >= threshold {}: pass",
                fmt_metric(value),
                fmt_metric(min)
            ),
        )
    } else {
        (
            CheckStatus::Fail,
            format!(
                "primary metric {} < threshold {}: fail",
                fmt_metric(value),
                fmt_metric(min)
            ),
        )
    };

    GateCheck {
        name: CheckName::PrimaryMetric,
        status,
        reasons: vec![reason],
    }
}

fn check_fairness(report: &EvaluationReport, config: &GateConfig) -> GateCheck {
    let Some(max_gap) = config.max_fairness_gap else {
        return not_configured(CheckName::Fairness, "fairness check not configured");
    };

    if report.fairness_metrics.is_empty() {
        return GateCheck {
            name: CheckName::Fairness,
            status: CheckStatus::Fail,
            reasons: vec!["fairness metrics required but absent".to_string()],
        };
    }

    // BTreeMap iteration keeps per-attribute reasons in a stable order.
    let failures: Vec<String> = report
        .fairness_metrics
        .iter()
        .filter(|(_, gap)| gap.abs() > max_gap)
        .map(|(attribute, gap)| {
            format!(
                "fairness gap for '{}' {} (abs {}) > max {}: fail",
                attribute,
                fmt_metric(*gap),
                fmt_metric(gap.abs()),
                fmt_metric(max_gap)
            )
        })
        .collect();

    if failures.is_empty() {
        let attributes: Vec<&str> = report.fairness_metrics.keys().map(String::as_str).collect();
        GateCheck {
            name: CheckName::Fairness,
            status: CheckStatus::Pass,
            reasons: vec![format!(
                "fairness gaps within max {} for [{}]: pass",
                fmt_metric(max_gap),
                attributes.join(", ")
            )],
        }
    } else {
        GateCheck {
            name: CheckName::Fairness,
            status: CheckStatus::Fail,
            reasons: failures,
        }
    }
}

fn check_explainability(report: &EvaluationReport, config: &GateConfig) -> GateCheck {
    if !config.require_explainability {
        return not_configured(CheckName::Explainability, "explainability check not configured");
    }

    if report.explainability_summary.is_empty() {
        GateCheck {
            name: CheckName::Explainability,
            status: CheckStatus::Fail,
            reasons: vec!["explainability summary required but absent".to_string()],
        }
    } else {
        GateCheck {
            name: CheckName::Explainability,
            status: CheckStatus::Pass,
            reasons: vec![format!(
                "explainability summary present for {} feature(s): pass",
                report.explainability_summary.len()
            )],
        }
    }
}

fn not_configured(name: CheckName, reason: &str) -> GateCheck {
    GateCheck {
        name,
        status: CheckStatus::NotConfigured,
        reasons: vec![reason.to_string()],
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Two decimals when that is exact (0.7 -> "0.70"), otherwise the shortest
/// round-trip form so that 0.705 never renders as "0.70".
fn fmt_metric(v: f64) -> String {
    let rounded = (v * 100.0).round() / 100.0;
    if rounded == v {
        format!("{v:.2}")
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_metric_pads_to_two_decimals() {
        assert_eq!(fmt_metric(0.7), "0.70");
        assert_eq!(fmt_metric(0.81), "0.81");
        assert_eq!(fmt_metric(1.0), "1.00");
        assert_eq!(fmt_metric(0.15), "0.15");
    }

    #[test]
    fn fmt_metric_keeps_extra_precision() {
        assert_eq!(fmt_metric(0.705), "0.705");
        assert_eq!(fmt_metric(0.6999), "0.6999");
    }

    #[test]
    fn upstream_failures_precede_data_validation() {
        let report = EvaluationReport::new("auc", f64::NAN).with_failed_step("bias", "job timed out");
        let err = evaluate(&report, &GateConfig::threshold_only(0.7)).unwrap_err();
        assert!(matches!(err, GateError::Upstream { .. }), "got {err:?}");
    }
}
