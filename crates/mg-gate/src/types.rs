use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Thresholds for one gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Deployment threshold for the primary metric (inclusive), e.g. 0.7.
    pub min_primary_metric: f64,
    /// Upper bound on `abs(gap)` per protected attribute. `None` = fairness not enforced.
    #[serde(default)]
    pub max_fairness_gap: Option<f64>,
    /// Block promotion when no feature attributions were produced.
    #[serde(default)]
    pub require_explainability: bool,
}

impl GateConfig {
    /// Primary-metric threshold only; fairness and explainability not enforced.
    pub fn threshold_only(min_primary_metric: f64) -> Self {
        Self {
            min_primary_metric,
            max_fairness_gap: None,
            require_explainability: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// An upstream producer that failed instead of returning a (possibly empty) result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedStep {
    pub step: String,
    pub message: String,
}

/// Output of the external training/evaluation step, already parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Model / training job identifier. Audit only.
    #[serde(default)]
    pub model_id: String,
    /// Which metric `primary_metric` holds (e.g. "auc"). Audit only, never interpreted.
    pub primary_metric_name: String,
    /// Held-out score in [0, 1].
    pub primary_metric: f64,
    /// Signed gap per protected attribute (e.g. difference in positive proportions).
    #[serde(default)]
    pub fairness_metrics: BTreeMap<String, f64>,
    /// Mean absolute attribution per feature.
    #[serde(default)]
    pub explainability_summary: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_steps: Vec<FailedStep>,
}

impl EvaluationReport {
    pub fn new(primary_metric_name: impl Into<String>, primary_metric: f64) -> Self {
        Self {
            model_id: String::new(),
            primary_metric_name: primary_metric_name.into(),
            primary_metric,
            fairness_metrics: BTreeMap::new(),
            explainability_summary: BTreeMap::new(),
            failed_steps: Vec::new(),
        }
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_fairness(mut self, attribute: impl Into<String>, gap: f64) -> Self {
        self.fairness_metrics.insert(attribute.into(), gap);
        self
    }

    pub fn with_attribution(mut self, feature: impl Into<String>, value: f64) -> Self {
        self.explainability_summary.insert(feature.into(), value);
        self
    }

    pub fn with_failed_step(mut self, step: impl Into<String>, message: impl Into<String>) -> Self {
        self.failed_steps.push(FailedStep {
            step: step.into(),
            message: message.into(),
        });
        self
    }

    /// Largest `abs(gap)` across attributes, `None` when no fairness metrics were reported.
    pub fn worst_fairness_gap(&self) -> Option<f64> {
        self.fairness_metrics
            .values()
            .map(|v| v.abs())
            .max_by(f64::total_cmp)
    }
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

/// Gate checks, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckName {
    PrimaryMetric,
    Fairness,
    Explainability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Pass,
    Fail,
    /// Excluded from the promotion AND.
    NotConfigured,
}

/// Outcome of one check. Fairness may carry one reason per failing attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateCheck {
    pub name: CheckName,
    pub status: CheckStatus,
    pub reasons: Vec<String>,
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// The gate's only output.
///
/// Built exclusively by [`crate::evaluate`]; fields are read-only so a
/// decision handed to the audit log and to the branching logic is the same
/// value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    promote: bool,
    reasons: Vec<String>,
    checks: Vec<GateCheck>,
    primary_metric_name: String,
    evaluated_at: DateTime<Utc>,
}

impl Decision {
    pub(crate) fn new(
        checks: Vec<GateCheck>,
        primary_metric_name: String,
        evaluated_at: DateTime<Utc>,
    ) -> Self {
        let promote = checks
            .iter()
            .filter(|c| c.status != CheckStatus::NotConfigured)
            .all(|c| c.status == CheckStatus::Pass);
        let reasons = checks
            .iter()
            .flat_map(|c| c.reasons.iter().cloned())
            .collect();
        Self {
            promote,
            reasons,
            checks,
            primary_metric_name,
            evaluated_at,
        }
    }

    pub fn promote(&self) -> bool {
        self.promote
    }

    /// Every check's reasons, in evaluation order.
    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    pub fn checks(&self) -> &[GateCheck] {
        &self.checks
    }

    pub fn check(&self, name: CheckName) -> Option<&GateCheck> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn primary_metric_name(&self) -> &str {
        &self.primary_metric_name
    }

    pub fn evaluated_at(&self) -> DateTime<Utc> {
        self.evaluated_at
    }

    /// Reasons belonging to failed checks only.
    pub fn fail_reasons(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Fail)
            .flat_map(|c| c.reasons.iter().map(String::as_str))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// One trained model competing for promotion.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub report: EvaluationReport,
}
