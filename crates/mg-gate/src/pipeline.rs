//! Pipeline adapter: the caller-side half of the gate contract.
//!
//! [`run_promotion_step`] evaluates a report, persists the outcome through a
//! [`DecisionSink`], and only then either invokes the external
//! [`PromotionTarget`] (promote) or reports a halt (do not promote).

use mg_audit::{AuditEventKind, AuditWriter};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::GateError;
use crate::evaluator::evaluate;
use crate::types::{Decision, EvaluationReport, GateConfig};

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Something the step reports to before acting on it.
#[derive(Debug, Clone, Copy)]
pub enum StepEvent<'a> {
    Decided {
        report: &'a EvaluationReport,
        decision: &'a Decision,
    },
    Refused {
        report: &'a EvaluationReport,
        error: &'a GateError,
    },
    Promoted {
        report: &'a EvaluationReport,
        receipt: &'a PromotionReceipt,
    },
    PromotionFailed {
        report: &'a EvaluationReport,
        error: &'a str,
    },
    Halted {
        report: &'a EvaluationReport,
        decision: &'a Decision,
    },
}

/// Where gate outcomes are persisted (audit log, registry metadata, ...).
pub trait DecisionSink {
    fn record(&mut self, event: StepEvent<'_>) -> anyhow::Result<()>;
}

/// The external "register model / deploy endpoint" action.
pub trait PromotionTarget {
    fn promote(
        &mut self,
        report: &EvaluationReport,
        decision: &Decision,
    ) -> anyhow::Result<PromotionReceipt>;
}

/// What the promotion target reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionReceipt {
    pub target: String,
    pub detail: String,
    /// Nothing external was invoked (evaluate-only run).
    pub dry_run: bool,
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Promoted {
        decision: Decision,
        receipt: PromotionReceipt,
    },
    /// Reported stop: the decision was "do not promote".
    Halted { decision: Decision },
}

impl StepOutcome {
    pub fn decision(&self) -> &Decision {
        match self {
            StepOutcome::Promoted { decision, .. } | StepOutcome::Halted { decision } => decision,
        }
    }
}

#[derive(Debug, Error)]
pub enum PromotionError {
    #[error(transparent)]
    Gate(#[from] GateError),

    #[error("failed to record gate outcome: {0:#}")]
    Sink(anyhow::Error),

    #[error("promotion target failed: {0:#}")]
    Target(anyhow::Error),
}

/// Evaluate, record, then branch.
///
/// The target is never invoked unless the decision is `promote` and the
/// decision has been recorded successfully.
pub fn run_promotion_step(
    report: &EvaluationReport,
    config: &GateConfig,
    sink: &mut dyn DecisionSink,
    target: &mut dyn PromotionTarget,
) -> Result<StepOutcome, PromotionError> {
    let decision = match evaluate(report, config) {
        Ok(d) => d,
        Err(error) => {
            warn!(
                model_id = %report.model_id,
                kind = error.kind().as_str(),
                "gate refused to decide: {error}"
            );
            sink.record(StepEvent::Refused {
                report,
                error: &error,
            })
            .map_err(PromotionError::Sink)?;
            return Err(PromotionError::Gate(error));
        }
    };

    info!(
        model_id = %report.model_id,
        metric = %report.primary_metric_name,
        value = report.primary_metric,
        promote = decision.promote(),
        "gate decision"
    );
    sink.record(StepEvent::Decided {
        report,
        decision: &decision,
    })
    .map_err(PromotionError::Sink)?;

    if !decision.promote() {
        for reason in decision.fail_reasons() {
            warn!(model_id = %report.model_id, "promotion blocked: {reason}");
        }
        sink.record(StepEvent::Halted {
            report,
            decision: &decision,
        })
        .map_err(PromotionError::Sink)?;
        return Ok(StepOutcome::Halted { decision });
    }

    match target.promote(report, &decision) {
        Ok(receipt) => {
            if receipt.dry_run {
                info!(model_id = %report.model_id, target = %receipt.target, "promotion skipped (dry run)");
            } else {
                info!(model_id = %report.model_id, target = %receipt.target, "model promoted");
            }
            sink.record(StepEvent::Promoted {
                report,
                receipt: &receipt,
            })
            .map_err(PromotionError::Sink)?;
            Ok(StepOutcome::Promoted { decision, receipt })
        }
        Err(e) => {
            let message = format!("{e:#}");
            warn!(model_id = %report.model_id, "promotion target failed: {message}");
            sink.record(StepEvent::PromotionFailed {
                report,
                error: &message,
            })
            .map_err(PromotionError::Sink)?;
            Err(PromotionError::Target(e))
        }
    }
}

// ---------------------------------------------------------------------------
// Audit log sink
// ---------------------------------------------------------------------------

/// Records step events into an mg-audit JSONL log under one pipeline run id.
pub struct AuditSink<'w> {
    writer: &'w mut AuditWriter,
    run_id: Uuid,
}

impl<'w> AuditSink<'w> {
    pub fn new(writer: &'w mut AuditWriter, run_id: Uuid) -> Self {
        Self { writer, run_id }
    }
}

impl DecisionSink for AuditSink<'_> {
    fn record(&mut self, event: StepEvent<'_>) -> anyhow::Result<()> {
        let (report, kind, payload) = match event {
            StepEvent::Decided { report, decision } => (
                report,
                AuditEventKind::GateDecision,
                json!({
                    "primary_metric": report.primary_metric,
                    "fairness_metrics": report.fairness_metrics,
                    "explainability_features": report.explainability_summary.len(),
                    "decision": decision,
                }),
            ),
            StepEvent::Refused { report, error } => (
                report,
                AuditEventKind::GateError,
                json!({"kind": error.kind().as_str(), "error": error.to_string()}),
            ),
            StepEvent::Promoted { report, receipt } => (
                report,
                if receipt.dry_run {
                    AuditEventKind::PromotionDryRun
                } else {
                    AuditEventKind::PromotionInvoked
                },
                json!({"receipt": receipt}),
            ),
            StepEvent::PromotionFailed { report, error } => (
                report,
                AuditEventKind::PromotionFailed,
                json!({"error": error}),
            ),
            StepEvent::Halted { report, decision } => (
                report,
                AuditEventKind::PipelineHalted,
                json!({"reasons": decision.fail_reasons()}),
            ),
        };

        self.writer
            .append(self.run_id, &report.model_id, kind, payload)
            .map(|_| ())
    }
}
