use thiserror::Error;

use crate::types::FailedStep;

/// The evaluation report cannot be trusted as input.
///
/// Never coerced (no clamping, no NaN-as-zero); always surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("invalid primary metric: '{name}' is missing from the evaluation report")]
    MissingPrimaryMetric { name: String },

    #[error("invalid primary metric: '{name}' = {value} is not finite")]
    NonFinitePrimaryMetric { name: String, value: f64 },

    #[error("invalid primary metric: '{name}' = {value} is outside [0, 1]")]
    PrimaryMetricOutOfRange { name: String, value: f64 },

    #[error("fairness metric for '{attribute}' is not finite ({value})")]
    NonFiniteFairnessMetric { attribute: String, value: f64 },

    #[error("explainability attribution for '{feature}' is not finite ({value})")]
    NonFiniteAttribution { feature: String, value: f64 },
}

/// The gate thresholds themselves are unusable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("min_primary_metric must be a finite value in [0, 1], got {0}")]
    MinPrimaryMetricOutOfRange(f64),

    #[error("max_fairness_gap must be finite and >= 0, got {0}")]
    InvalidMaxFairnessGap(f64),

    #[error("config missing {0}")]
    MissingField(&'static str),

    #[error("config field {field} is not a valid {expected}: {raw}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
        raw: String,
    },
}

/// Why the gate refused to produce a [`crate::Decision`].
///
/// Distinct from a decision with `promote == false`: a low score is an
/// expected outcome, these are not.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GateError {
    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// A producer of the report (bias analysis, explainability, evaluation)
    /// failed outright. An empty-but-successful result is not this.
    #[error("upstream step failed: {}", describe_failures(.failures))]
    Upstream { failures: Vec<FailedStep> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateErrorKind {
    Data,
    Configuration,
    Upstream,
}

impl GateErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateErrorKind::Data => "DATA_ERROR",
            GateErrorKind::Configuration => "CONFIGURATION_ERROR",
            GateErrorKind::Upstream => "UPSTREAM_ERROR",
        }
    }
}

impl GateError {
    pub fn kind(&self) -> GateErrorKind {
        match self {
            GateError::Data(_) => GateErrorKind::Data,
            GateError::Configuration(_) => GateErrorKind::Configuration,
            GateError::Upstream { .. } => GateErrorKind::Upstream,
        }
    }
}

fn describe_failures(failures: &[FailedStep]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.step, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}
