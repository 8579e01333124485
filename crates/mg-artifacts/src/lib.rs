//! mg-artifacts
//!
//! File boundary of the gate: reading upstream evaluation outputs into an
//! `EvaluationReport`, and writing the per-run decision record.

mod decision;
mod ingest;

pub use decision::{
    write_decision_artifacts, ArtifactList, DecisionArtifact, RunManifest, WriteDecisionArgs,
    WriteDecisionResult, DECISION_SCHEMA_VERSION,
};
pub use ingest::{
    load_evaluation_report, ReportInputs, ReportLoadError, DEFAULT_BIAS_METRIC,
    DEFAULT_PRIMARY_METRIC,
};
