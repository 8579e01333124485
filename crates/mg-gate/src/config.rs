//! Build a [`GateConfig`] from canonical config JSON (produced by mg-config).

use serde_json::Value;

use crate::error::ConfigurationError;
use crate::evaluator::validate_config;
use crate::types::GateConfig;

const PTR_MIN_PRIMARY_METRIC: &str = "/gate/min_primary_metric";
const PTR_MAX_FAIRNESS_GAP: &str = "/gate/max_fairness_gap";
const PTR_REQUIRE_EXPLAINABILITY: &str = "/gate/require_explainability";

impl GateConfig {
    /// Required:
    /// - gate.min_primary_metric (number or numeric string)
    ///
    /// Optional:
    /// - gate.max_fairness_gap (number or numeric string; absent/null = not enforced)
    /// - gate.require_explainability (bool or "true"/"false"); default=false
    pub fn from_config_json(cfg: &Value) -> Result<Self, ConfigurationError> {
        let min_primary_metric = match cfg.pointer(PTR_MIN_PRIMARY_METRIC) {
            None | Some(Value::Null) => {
                return Err(ConfigurationError::MissingField("gate.min_primary_metric"))
            }
            Some(v) => read_f64(v, "gate.min_primary_metric")?,
        };

        let max_fairness_gap = match cfg.pointer(PTR_MAX_FAIRNESS_GAP) {
            None | Some(Value::Null) => None,
            Some(v) => Some(read_f64(v, "gate.max_fairness_gap")?),
        };

        let require_explainability = match cfg.pointer(PTR_REQUIRE_EXPLAINABILITY) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => true,
                "false" => false,
                _ => return Err(invalid("gate.require_explainability", "bool", s)),
            },
            Some(other) => {
                return Err(invalid(
                    "gate.require_explainability",
                    "bool",
                    &other.to_string(),
                ))
            }
        };

        let config = GateConfig {
            min_primary_metric,
            max_fairness_gap,
            require_explainability,
        };
        validate_config(&config)?;
        Ok(config)
    }
}

fn read_f64(v: &Value, field: &'static str) -> Result<f64, ConfigurationError> {
    match v {
        Value::Number(n) => n.as_f64().ok_or_else(|| invalid(field, "number", &n.to_string())),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(field, "number", s)),
        other => Err(invalid(field, "number", &other.to_string())),
    }
}

fn invalid(field: &'static str, expected: &'static str, raw: &str) -> ConfigurationError {
    ConfigurationError::InvalidField {
        field,
        expected,
        raw: raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_all_fields() {
        let cfg = json!({"gate": {
            "min_primary_metric": 0.7,
            "max_fairness_gap": "0.1",
            "require_explainability": true
        }});
        let c = GateConfig::from_config_json(&cfg).unwrap();
        assert_eq!(c.min_primary_metric, 0.7);
        assert_eq!(c.max_fairness_gap, Some(0.1));
        assert!(c.require_explainability);
    }

    #[test]
    fn optional_fields_default() {
        let cfg = json!({"gate": {"min_primary_metric": "0.65"}});
        let c = GateConfig::from_config_json(&cfg).unwrap();
        assert_eq!(c, GateConfig::threshold_only(0.65));
    }

    #[test]
    fn null_fairness_gap_means_absent() {
        let cfg = json!({"gate": {"min_primary_metric": 0.5, "max_fairness_gap": null}});
        let c = GateConfig::from_config_json(&cfg).unwrap();
        assert_eq!(c.max_fairness_gap, None);
    }

    #[test]
    fn missing_threshold_is_an_error() {
        let err = GateConfig::from_config_json(&json!({"gate": {}})).unwrap_err();
        assert_eq!(err, ConfigurationError::MissingField("gate.min_primary_metric"));
    }

    #[test]
    fn non_numeric_threshold_is_an_error() {
        let err =
            GateConfig::from_config_json(&json!({"gate": {"min_primary_metric": "high"}})).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidField { field: "gate.min_primary_metric", .. }));
    }

    #[test]
    fn out_of_range_values_are_validated() {
        let err =
            GateConfig::from_config_json(&json!({"gate": {"min_primary_metric": 1.5}})).unwrap_err();
        assert_eq!(err, ConfigurationError::MinPrimaryMetricOutOfRange(1.5));

        let err = GateConfig::from_config_json(
            &json!({"gate": {"min_primary_metric": 0.5, "max_fairness_gap": -0.1}}),
        )
        .unwrap_err();
        assert_eq!(err, ConfigurationError::InvalidMaxFairnessGap(-0.1));
    }
}
