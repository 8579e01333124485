use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use mg_gate::{Decision, EvaluationReport, GateConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const DECISION_SCHEMA_VERSION: i32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: i32,
    pub run_id: Uuid,
    pub model_id: String,
    pub mode: String,
    pub config_hash: String,
    pub promote: bool,
    pub created_at_utc: DateTime<Utc>,
    pub artifacts: ArtifactList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactList {
    pub manifest_json: String,
    pub decision_json: String,
}

/// Everything needed to reproduce a gate decision after the fact.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionArtifact<'a> {
    pub schema_version: i32,
    pub run_id: Uuid,
    pub config_hash: &'a str,
    pub config: &'a GateConfig,
    pub report: &'a EvaluationReport,
    pub decision: &'a Decision,
}

pub struct WriteDecisionArgs<'a> {
    pub out_root: &'a Path, // e.g. ./gate-runs
    pub run_id: Uuid,
    pub mode: &'a str,
    pub config_hash: &'a str,
    pub config: &'a GateConfig,
    pub report: &'a EvaluationReport,
    pub decision: &'a Decision,
}

#[derive(Debug, Clone)]
pub struct WriteDecisionResult {
    pub run_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub decision_path: PathBuf,
}

/// Write `<out_root>/<run_id>/{decision.json,manifest.json}`.
///
/// Refuses to overwrite an existing decision for the same run id.
pub fn write_decision_artifacts(args: WriteDecisionArgs<'_>) -> Result<WriteDecisionResult> {
    let run_dir = args.out_root.join(args.run_id.to_string());
    fs::create_dir_all(&run_dir)
        .with_context(|| format!("create run dir failed: {}", run_dir.display()))?;

    let decision_path = run_dir.join("decision.json");
    if decision_path.exists() {
        anyhow::bail!(
            "ARTIFACT_EXISTS decision already written for run {}: {}",
            args.run_id,
            decision_path.display()
        );
    }

    let artifact = DecisionArtifact {
        schema_version: DECISION_SCHEMA_VERSION,
        run_id: args.run_id,
        config_hash: args.config_hash,
        config: args.config,
        report: args.report,
        decision: args.decision,
    };
    write_pretty(&decision_path, &artifact).context("write decision failed")?;

    let manifest = RunManifest {
        schema_version: DECISION_SCHEMA_VERSION,
        run_id: args.run_id,
        model_id: args.report.model_id.clone(),
        mode: args.mode.to_string(),
        config_hash: args.config_hash.to_string(),
        promote: args.decision.promote(),
        created_at_utc: Utc::now(),
        artifacts: ArtifactList {
            manifest_json: "manifest.json".to_string(),
            decision_json: "decision.json".to_string(),
        },
    };
    let manifest_path = run_dir.join("manifest.json");
    write_pretty(&manifest_path, &manifest).context("write manifest failed")?;

    tracing::debug!(run_dir = %run_dir.display(), "decision artifacts written");

    Ok(WriteDecisionResult {
        run_dir,
        manifest_path,
        decision_path,
    })
}

fn write_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize failed")?;
    fs::write(path, format!("{json}\n")).with_context(|| format!("write failed: {}", path.display()))
}
