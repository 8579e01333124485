//! Parse upstream evaluation outputs into an [`EvaluationReport`].
//!
//! Accepted evaluation shapes:
//! - native: a serialized `EvaluationReport`
//! - upstream: `{"metrics" | "binary_classification_metrics" | "classification_metrics":
//!   {"<name>": {"value": x} | x}}`
//!
//! Optional side inputs:
//! - bias report: `{"post_training_bias_metrics" | "pre_training_bias_metrics":
//!   {"facets": {"<facet>": [{"value_or_threshold": v, "metrics": [{"name", "value"}]}]}}}`
//!   or a flat `{"<attribute>": x}` map
//! - explainability: `{"explanations": {"<method>": {"<label>": {"global_shap_values": {...}}}}}`
//!   or a flat `{"<feature>": x}` map
//!
//! Any side input may instead be a failure marker `{"status": "Failed", "failure_reason": ...}`,
//! which becomes a [`FailedStep`] on the report.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mg_gate::{DataError, EvaluationReport, FailedStep};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Metric used when the caller does not name one.
pub const DEFAULT_PRIMARY_METRIC: &str = "auc";
/// Bias metric used when the caller does not name one (difference in positive
/// proportions in predicted labels).
pub const DEFAULT_BIAS_METRIC: &str = "DPPL";

const METRIC_SECTIONS: &[&str] = &[
    "metrics",
    "binary_classification_metrics",
    "classification_metrics",
    "regression_metrics",
];
const BIAS_SECTIONS: &[&str] = &["post_training_bias_metrics", "pre_training_bias_metrics"];

#[derive(Debug, Error)]
pub enum ReportLoadError {
    #[error("read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}: {message}", .path.display())]
    Shape { path: PathBuf, message: String },

    #[error(transparent)]
    Data(#[from] DataError),
}

/// Locations and selectors for one report.
#[derive(Debug, Clone, Copy)]
pub struct ReportInputs<'a> {
    pub evaluation: &'a Path,
    pub bias: Option<&'a Path>,
    pub explainability: Option<&'a Path>,
    /// Primary metric to select from an upstream metrics section.
    pub metric: Option<&'a str>,
    /// Bias metric to read per facet.
    pub bias_metric: Option<&'a str>,
    /// Overrides any model id found in the evaluation file.
    pub model_id: Option<&'a str>,
}

impl<'a> ReportInputs<'a> {
    pub fn new(evaluation: &'a Path) -> Self {
        Self {
            evaluation,
            bias: None,
            explainability: None,
            metric: None,
            bias_metric: None,
            model_id: None,
        }
    }
}

/// Read every input and assemble the report handed to the gate.
///
/// The report is not validated here beyond shape; range and finiteness are
/// the gate's job.
pub fn load_evaluation_report(inputs: &ReportInputs<'_>) -> Result<EvaluationReport, ReportLoadError> {
    let eval_json = read_json(inputs.evaluation)?;
    let mut report = parse_evaluation(inputs.evaluation, &eval_json, inputs.metric)?;

    if let Some(path) = inputs.bias {
        let v = read_json(path)?;
        match failure_marker(&v) {
            Some(message) => report.failed_steps.push(FailedStep {
                step: "bias".to_string(),
                message,
            }),
            None => {
                let metric = inputs.bias_metric.unwrap_or(DEFAULT_BIAS_METRIC);
                report.fairness_metrics = parse_bias(path, &v, metric)?;
            }
        }
    }

    if let Some(path) = inputs.explainability {
        let v = read_json(path)?;
        match failure_marker(&v) {
            Some(message) => report.failed_steps.push(FailedStep {
                step: "explainability".to_string(),
                message,
            }),
            None => report.explainability_summary = parse_explainability(path, &v)?,
        }
    }

    if let Some(id) = inputs.model_id {
        report.model_id = id.to_string();
    }

    debug!(
        model_id = %report.model_id,
        metric = %report.primary_metric_name,
        fairness_attributes = report.fairness_metrics.len(),
        explained_features = report.explainability_summary.len(),
        failed_steps = report.failed_steps.len(),
        "evaluation report loaded"
    );
    Ok(report)
}

fn read_json(path: &Path) -> Result<Value, ReportLoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ReportLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    // Tolerate a UTF-8 BOM from Windows-authored files.
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(&raw);
    serde_json::from_str(raw).map_err(|source| ReportLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn shape(path: &Path, message: impl Into<String>) -> ReportLoadError {
    ReportLoadError::Shape {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// `{"status": "Failed", ...}` -> failure message.
fn failure_marker(v: &Value) -> Option<String> {
    let status = v.get("status")?.as_str()?;
    if !status.eq_ignore_ascii_case("failed") {
        return None;
    }
    let reason = v
        .get("failure_reason")
        .and_then(Value::as_str)
        .unwrap_or("no failure reason reported");
    Some(reason.to_string())
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn parse_evaluation(
    path: &Path,
    v: &Value,
    metric: Option<&str>,
) -> Result<EvaluationReport, ReportLoadError> {
    let Some(obj) = v.as_object() else {
        return Err(shape(path, "evaluation report must be a JSON object"));
    };

    if obj.contains_key("primary_metric") || obj.contains_key("primary_metric_name") {
        return parse_native(path, v, obj);
    }

    let section = METRIC_SECTIONS
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_object))
        .ok_or_else(|| {
            shape(
                path,
                format!("no metrics section found (expected one of {METRIC_SECTIONS:?})"),
            )
        })?;

    let name = match metric {
        Some(m) => m.to_string(),
        None if section.len() == 1 => section.keys().next().cloned().unwrap_or_default(),
        None => DEFAULT_PRIMARY_METRIC.to_string(),
    };

    let value = lookup_metric(section, &name)
        .ok_or_else(|| DataError::MissingPrimaryMetric { name: name.clone() })?;
    let value = metric_value(value).ok_or_else(|| {
        shape(
            path,
            format!("metric '{name}' is not a number or {{\"value\": number}}"),
        )
    })?;
    let value = value.ok_or_else(|| DataError::MissingPrimaryMetric { name: name.clone() })?;

    let mut report = EvaluationReport::new(name, value);
    if let Some(id) = obj.get("model_id").and_then(Value::as_str) {
        report.model_id = id.to_string();
    }
    if let Some(steps) = obj.get("failed_steps") {
        report.failed_steps = serde_json::from_value(steps.clone()).map_err(|source| {
            ReportLoadError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
    }
    Ok(report)
}

fn parse_native(
    path: &Path,
    v: &Value,
    obj: &Map<String, Value>,
) -> Result<EvaluationReport, ReportLoadError> {
    // A null / absent value is a missing metric, not a parse error.
    match obj.get("primary_metric") {
        None | Some(Value::Null) => {
            let name = obj
                .get("primary_metric_name")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_PRIMARY_METRIC)
                .to_string();
            return Err(DataError::MissingPrimaryMetric { name }.into());
        }
        Some(_) => {}
    }
    serde_json::from_value(v.clone()).map_err(|source| ReportLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Exact key first, then case-insensitive; also accepts `<name>_score`.
fn lookup_metric<'v>(section: &'v Map<String, Value>, name: &str) -> Option<&'v Value> {
    if let Some(v) = section.get(name) {
        return Some(v);
    }
    let wanted = name.to_ascii_lowercase();
    let scored = format!("{wanted}_score");
    section
        .iter()
        .find(|(k, _)| {
            let k = k.to_ascii_lowercase();
            k == wanted || k == scored
        })
        .map(|(_, v)| v)
}

/// `x`, `"x"`, `{"value": x}` -> `Some(Some(x))`; `null` / `{"value": null}` -> `Some(None)`;
/// anything else -> `None`.
fn metric_value(v: &Value) -> Option<Option<f64>> {
    match v {
        Value::Null => Some(None),
        Value::Number(n) => n.as_f64().map(Some),
        Value::String(s) => s.trim().parse::<f64>().ok().map(Some),
        Value::Object(o) => o.get("value").map_or(Some(None), metric_value),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Bias
// ---------------------------------------------------------------------------

fn parse_bias(path: &Path, v: &Value, metric: &str) -> Result<BTreeMap<String, f64>, ReportLoadError> {
    let Some(obj) = v.as_object() else {
        return Err(shape(path, "bias report must be a JSON object"));
    };

    let sections: Vec<&Map<String, Value>> = BIAS_SECTIONS
        .iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_object))
        .collect();

    if sections.is_empty() {
        return flat_numeric_map(path, obj, "bias");
    }

    let mut out = BTreeMap::new();
    for section in sections {
        let Some(facets) = section.get("facets").and_then(Value::as_object) else {
            continue;
        };
        for (facet, groups) in facets {
            let groups = groups.as_array().map(Vec::as_slice).unwrap_or_default();
            for group in groups {
                let Some(value) = find_named_metric(group, metric) else {
                    continue;
                };
                let key = if groups.len() > 1 {
                    match group.get("value_or_threshold") {
                        Some(Value::String(s)) => format!("{facet}={s}"),
                        Some(other) => format!("{facet}={other}"),
                        None => facet.clone(),
                    }
                } else {
                    facet.clone()
                };
                // Post-training metrics are read first and win over pre-training ones.
                out.entry(key).or_insert(value);
            }
        }
    }
    Ok(out)
}

fn find_named_metric(group: &Value, metric: &str) -> Option<f64> {
    group
        .get("metrics")?
        .as_array()?
        .iter()
        .find(|m| {
            m.get("name")
                .and_then(Value::as_str)
                .is_some_and(|n| n.eq_ignore_ascii_case(metric))
        })
        .and_then(|m| metric_value(m.get("value")?).flatten())
}

// ---------------------------------------------------------------------------
// Explainability
// ---------------------------------------------------------------------------

fn parse_explainability(path: &Path, v: &Value) -> Result<BTreeMap<String, f64>, ReportLoadError> {
    let Some(obj) = v.as_object() else {
        return Err(shape(path, "explainability report must be a JSON object"));
    };

    let Some(explanations) = obj.get("explanations").and_then(Value::as_object) else {
        return flat_numeric_map(path, obj, "explainability");
    };

    // First method, first label: the gate only needs "were attributions produced".
    let global = explanations
        .values()
        .filter_map(Value::as_object)
        .flat_map(|labels| labels.values())
        .find_map(|label| label.get("global_shap_values").and_then(Value::as_object));

    match global {
        Some(values) => flat_numeric_map(path, values, "explainability"),
        None => Ok(BTreeMap::new()),
    }
}

fn flat_numeric_map(
    path: &Path,
    obj: &Map<String, Value>,
    what: &str,
) -> Result<BTreeMap<String, f64>, ReportLoadError> {
    let mut out = BTreeMap::new();
    for (k, v) in obj {
        match metric_value(v) {
            Some(Some(x)) => {
                out.insert(k.clone(), x);
            }
            _ => {
                return Err(shape(
                    path,
                    format!("{what} entry '{k}' is not a number"),
                ))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metric_value_shapes() {
        assert_eq!(metric_value(&json!(0.8)), Some(Some(0.8)));
        assert_eq!(metric_value(&json!("0.8")), Some(Some(0.8)));
        assert_eq!(metric_value(&json!({"value": 0.8, "standard_deviation": 0.01})), Some(Some(0.8)));
        assert_eq!(metric_value(&json!(null)), Some(None));
        assert_eq!(metric_value(&json!({"value": null})), Some(None));
        assert_eq!(metric_value(&json!([1])), None);
        assert!(metric_value(&json!("NaN")).unwrap().unwrap().is_nan());
    }

    #[test]
    fn lookup_metric_is_forgiving_about_case_and_suffix() {
        let section = json!({"AUC_Score": {"value": 0.9}});
        let section = section.as_object().unwrap();
        assert!(lookup_metric(section, "auc").is_some());
        assert!(lookup_metric(section, "f1").is_none());
    }

    #[test]
    fn failure_marker_requires_failed_status() {
        assert_eq!(
            failure_marker(&json!({"status": "Failed", "failure_reason": "OOM"})),
            Some("OOM".to_string())
        );
        assert_eq!(failure_marker(&json!({"status": "Completed"})), None);
        assert_eq!(failure_marker(&json!({"gender": 0.1})), None);
    }
}
