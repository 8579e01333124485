//! The pipeline adapter: record first, then promote or halt.

use anyhow::anyhow;
use mg_audit::{verify_hash_chain, AuditEventKind, AuditWriter, VerifyResult};
use mg_gate::{
    run_promotion_step, AuditSink, Decision, DecisionSink, EvaluationReport, GateConfig,
    PromotionError, PromotionReceipt, PromotionTarget, StepEvent, StepOutcome,
};
use uuid::Uuid;

#[derive(Default)]
struct RecordingSink {
    events: Vec<String>,
    fail: bool,
}

impl DecisionSink for RecordingSink {
    fn record(&mut self, event: StepEvent<'_>) -> anyhow::Result<()> {
        if self.fail {
            return Err(anyhow!("disk full"));
        }
        let label = match event {
            StepEvent::Decided { .. } => "decided",
            StepEvent::Refused { .. } => "refused",
            StepEvent::Promoted { .. } => "promoted",
            StepEvent::PromotionFailed { .. } => "promotion_failed",
            StepEvent::Halted { .. } => "halted",
        };
        self.events.push(label.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct FakeRegistry {
    calls: usize,
    fail: bool,
    dry_run: bool,
}

impl PromotionTarget for FakeRegistry {
    fn promote(
        &mut self,
        report: &EvaluationReport,
        _decision: &Decision,
    ) -> anyhow::Result<PromotionReceipt> {
        self.calls += 1;
        if self.fail {
            return Err(anyhow!("registry unavailable"));
        }
        Ok(PromotionReceipt {
            target: "fake-registry".to_string(),
            detail: format!("registered {}", report.model_id),
            dry_run: self.dry_run,
        })
    }
}

fn report(metric: f64) -> EvaluationReport {
    EvaluationReport::new("auc", metric).with_model_id("xgb-001")
}

#[test]
fn passing_model_is_recorded_then_promoted() {
    let mut sink = RecordingSink::default();
    let mut registry = FakeRegistry::default();

    let outcome = run_promotion_step(
        &report(0.81),
        &GateConfig::threshold_only(0.7),
        &mut sink,
        &mut registry,
    )
    .unwrap();

    match &outcome {
        StepOutcome::Promoted { receipt, .. } => {
            assert_eq!(receipt.detail, "registered xgb-001")
        }
        other => panic!("expected Promoted, got {other:?}"),
    }
    assert!(outcome.decision().promote());
    assert_eq!(registry.calls, 1);
    assert_eq!(sink.events, vec!["decided", "promoted"]);
}

#[test]
fn failing_model_halts_without_touching_the_registry() {
    let mut sink = RecordingSink::default();
    let mut registry = FakeRegistry::default();

    let outcome = run_promotion_step(
        &report(0.6),
        &GateConfig::threshold_only(0.7),
        &mut sink,
        &mut registry,
    )
    .unwrap();

    assert!(matches!(outcome, StepOutcome::Halted { .. }));
    assert!(!outcome.decision().fail_reasons().is_empty());
    assert_eq!(registry.calls, 0);
    assert_eq!(sink.events, vec!["decided", "halted"]);
}

#[test]
fn malformed_report_is_recorded_and_surfaced_as_gate_error() {
    let mut sink = RecordingSink::default();
    let mut registry = FakeRegistry::default();

    let err = run_promotion_step(
        &report(1.4),
        &GateConfig::threshold_only(0.7),
        &mut sink,
        &mut registry,
    )
    .unwrap_err();

    assert!(matches!(err, PromotionError::Gate(_)), "{err:?}");
    assert_eq!(registry.calls, 0);
    assert_eq!(sink.events, vec!["refused"]);
}

#[test]
fn sink_failure_blocks_promotion() {
    let mut sink = RecordingSink {
        fail: true,
        ..Default::default()
    };
    let mut registry = FakeRegistry::default();

    let err = run_promotion_step(
        &report(0.9),
        &GateConfig::threshold_only(0.7),
        &mut sink,
        &mut registry,
    )
    .unwrap_err();

    assert!(matches!(err, PromotionError::Sink(_)), "{err:?}");
    assert_eq!(registry.calls, 0, "unrecorded decision must not be acted on");
}

#[test]
fn target_failure_is_recorded_and_returned() {
    let mut sink = RecordingSink::default();
    let mut registry = FakeRegistry {
        fail: true,
        ..Default::default()
    };

    let err = run_promotion_step(
        &report(0.9),
        &GateConfig::threshold_only(0.7),
        &mut sink,
        &mut registry,
    )
    .unwrap_err();

    assert!(err.to_string().contains("registry unavailable"), "{err}");
    assert_eq!(sink.events, vec!["decided", "promotion_failed"]);
}

#[test]
fn audit_sink_writes_a_verifiable_chain() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("decisions.jsonl");
    let mut writer = AuditWriter::new(&path, true).unwrap();
    let run_id = Uuid::new_v4();

    {
        let mut sink = AuditSink::new(&mut writer, run_id);
        let mut registry = FakeRegistry::default();
        run_promotion_step(
            &report(0.81),
            &GateConfig::threshold_only(0.7),
            &mut sink,
            &mut registry,
        )
        .unwrap();
        run_promotion_step(
            &report(0.5),
            &GateConfig::threshold_only(0.7),
            &mut sink,
            &mut registry,
        )
        .unwrap();
    }

    assert_eq!(writer.seq(), 4);
    assert_eq!(
        verify_hash_chain(&path).unwrap(),
        VerifyResult::Valid { lines: 4 }
    );

    let content = std::fs::read_to_string(&path).unwrap();
    let events: Vec<mg_audit::AuditEvent> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let kinds: Vec<AuditEventKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            AuditEventKind::GateDecision,
            AuditEventKind::PromotionInvoked,
            AuditEventKind::GateDecision,
            AuditEventKind::PipelineHalted,
        ]
    );
    assert!(events.iter().all(|e| e.run_id == run_id));
    assert!(events.iter().all(|e| e.model_id == "xgb-001"));
    assert_eq!(events[0].payload["decision"]["promote"], true);
    assert_eq!(
        events[3].payload["reasons"][0],
        "primary metric 0.50 < threshold 0.70: fail"
    );
}

#[test]
fn dry_run_receipt_is_logged_as_dry_run_not_promotion() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("decisions.jsonl");
    let mut writer = AuditWriter::new(&path, true).unwrap();

    {
        let mut sink = AuditSink::new(&mut writer, Uuid::new_v4());
        let mut registry = FakeRegistry {
            dry_run: true,
            ..Default::default()
        };
        let outcome = run_promotion_step(
            &report(0.81),
            &GateConfig::threshold_only(0.7),
            &mut sink,
            &mut registry,
        )
        .unwrap();
        match &outcome {
            StepOutcome::Promoted { receipt, .. } => assert!(receipt.dry_run),
            other => panic!("expected Promoted, got {other:?}"),
        }
    }

    let content = std::fs::read_to_string(&path).unwrap();
    let kinds: Vec<AuditEventKind> = content
        .lines()
        .map(|l| serde_json::from_str::<mg_audit::AuditEvent>(l).unwrap().kind)
        .collect();
    assert_eq!(
        kinds,
        vec![AuditEventKind::GateDecision, AuditEventKind::PromotionDryRun]
    );
}
