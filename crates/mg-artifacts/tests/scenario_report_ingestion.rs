//! Upstream evaluation outputs -> EvaluationReport.

use std::path::{Path, PathBuf};

use mg_artifacts::{load_evaluation_report, ReportInputs, ReportLoadError};
use mg_gate::{evaluate, DataError, GateConfig};
use serde_json::json;

fn write(dir: &Path, name: &str, v: serde_json::Value) -> PathBuf {
    let p = dir.join(name);
    std::fs::write(&p, serde_json::to_string_pretty(&v).unwrap()).unwrap();
    p
}

#[test]
fn native_report_round_trips_through_the_loader() {
    let dir = tempfile::tempdir().unwrap();
    let eval = write(
        dir.path(),
        "report.json",
        json!({
            "model_id": "xgb-001",
            "primary_metric_name": "auc",
            "primary_metric": 0.81,
            "fairness_metrics": {"gender": 0.04},
            "explainability_summary": {"amount": 0.3}
        }),
    );

    let report = load_evaluation_report(&ReportInputs::new(&eval)).unwrap();
    assert_eq!(report.model_id, "xgb-001");
    assert_eq!(report.primary_metric, 0.81);
    assert_eq!(report.fairness_metrics["gender"], 0.04);
    assert_eq!(report.explainability_summary.len(), 1);
}

#[test]
fn upstream_metrics_with_bias_and_shap_side_files() {
    let dir = tempfile::tempdir().unwrap();
    let eval = write(
        dir.path(),
        "evaluation.json",
        json!({
            "binary_classification_metrics": {
                "auc": {"value": 0.81, "standard_deviation": 0.004},
                "f1": {"value": 0.66}
            }
        }),
    );
    let bias = write(
        dir.path(),
        "bias.json",
        json!({
            "post_training_bias_metrics": {
                "label": "approved",
                "facets": {
                    "gender": [{
                        "value_or_threshold": "female",
                        "metrics": [
                            {"name": "DI", "value": 0.91},
                            {"name": "DPPL", "value": -0.04}
                        ]
                    }],
                    "age": [
                        {"value_or_threshold": "young", "metrics": [{"name": "DPPL", "value": 0.02}]},
                        {"value_or_threshold": "old", "metrics": [{"name": "DPPL", "value": 0.08}]}
                    ]
                }
            }
        }),
    );
    let shap = write(
        dir.path(),
        "analysis.json",
        json!({
            "explanations": {
                "kernel_shap": {
                    "label0": {
                        "global_shap_values": {"amount": 0.31, "tenure": 0.12},
                        "expected_value": 0.4
                    }
                }
            }
        }),
    );

    let inputs = ReportInputs {
        bias: Some(&bias),
        explainability: Some(&shap),
        model_id: Some("xgb-002"),
        ..ReportInputs::new(&eval)
    };
    let report = load_evaluation_report(&inputs).unwrap();

    assert_eq!(report.model_id, "xgb-002");
    assert_eq!(report.primary_metric_name, "auc");
    assert_eq!(report.primary_metric, 0.81);
    assert_eq!(report.fairness_metrics["gender"], -0.04);
    assert_eq!(report.fairness_metrics["age=young"], 0.02);
    assert_eq!(report.fairness_metrics["age=old"], 0.08);
    assert_eq!(report.explainability_summary["amount"], 0.31);

    let cfg = GateConfig {
        min_primary_metric: 0.7,
        max_fairness_gap: Some(0.1),
        require_explainability: true,
    };
    assert!(evaluate(&report, &cfg).unwrap().promote());
}

#[test]
fn single_metric_section_needs_no_metric_name() {
    let dir = tempfile::tempdir().unwrap();
    let eval = write(dir.path(), "e.json", json!({"metrics": {"accuracy": "0.9"}}));

    let report = load_evaluation_report(&ReportInputs::new(&eval)).unwrap();
    assert_eq!(report.primary_metric_name, "accuracy");
    assert_eq!(report.primary_metric, 0.9);
}

#[test]
fn named_metric_absent_is_a_missing_metric_data_error() {
    let dir = tempfile::tempdir().unwrap();
    let eval = write(
        dir.path(),
        "e.json",
        json!({"metrics": {"auc": 0.8, "f1": 0.6}}),
    );

    let inputs = ReportInputs {
        metric: Some("recall"),
        ..ReportInputs::new(&eval)
    };
    let err = load_evaluation_report(&inputs).unwrap_err();
    assert!(
        matches!(err, ReportLoadError::Data(DataError::MissingPrimaryMetric { ref name }) if name == "recall"),
        "{err:?}"
    );
}

#[test]
fn native_report_with_null_metric_is_missing_not_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let eval = write(
        dir.path(),
        "e.json",
        json!({"primary_metric_name": "auc", "primary_metric": null}),
    );
    let err = load_evaluation_report(&ReportInputs::new(&eval)).unwrap_err();
    assert!(
        matches!(err, ReportLoadError::Data(DataError::MissingPrimaryMetric { .. })),
        "{err:?}"
    );
}

#[test]
fn failed_side_step_becomes_upstream_failure() {
    let dir = tempfile::tempdir().unwrap();
    let eval = write(dir.path(), "e.json", json!({"metrics": {"auc": 0.8}}));
    let bias = write(
        dir.path(),
        "bias.json",
        json!({"status": "Failed", "failure_reason": "ClientError: facet column not found"}),
    );

    let inputs = ReportInputs {
        bias: Some(&bias),
        ..ReportInputs::new(&eval)
    };
    let report = load_evaluation_report(&inputs).unwrap();
    assert_eq!(report.failed_steps.len(), 1);
    assert_eq!(report.failed_steps[0].step, "bias");
    assert!(report.fairness_metrics.is_empty());

    let err = evaluate(&report, &GateConfig::threshold_only(0.7)).unwrap_err();
    assert_eq!(err.kind().as_str(), "UPSTREAM_ERROR");
}

#[test]
fn empty_explainability_output_is_absent_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let eval = write(dir.path(), "e.json", json!({"metrics": {"auc": 0.8}}));
    let shap = write(dir.path(), "a.json", json!({"explanations": {}}));

    let inputs = ReportInputs {
        explainability: Some(&shap),
        ..ReportInputs::new(&eval)
    };
    let report = load_evaluation_report(&inputs).unwrap();
    assert!(report.explainability_summary.is_empty());
}

#[test]
fn unreadable_and_unparseable_inputs_name_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.json");
    let err = load_evaluation_report(&ReportInputs::new(&missing)).unwrap_err();
    assert!(matches!(err, ReportLoadError::Read { .. }));
    assert!(err.to_string().contains("nope.json"));

    let garbage = dir.path().join("garbage.json");
    std::fs::write(&garbage, "{ not json").unwrap();
    let err = load_evaluation_report(&ReportInputs::new(&garbage)).unwrap_err();
    assert!(matches!(err, ReportLoadError::Parse { .. }));

    let wrong = write(dir.path(), "wrong.json", json!({"rows": 10}));
    let err = load_evaluation_report(&ReportInputs::new(&wrong)).unwrap_err();
    assert!(matches!(err, ReportLoadError::Shape { .. }));
}
