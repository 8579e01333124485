//! `mg gate ...`: evaluate one report, or pick the best of several.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Args;
use mg_artifacts::{load_evaluation_report, ReportInputs, WriteDecisionArgs};
use mg_audit::AuditWriter;
use mg_config::promote_env::resolve_promote_env;
use mg_config::ConfigMode;
use mg_gate::{
    run_promotion_step, select_best, AuditSink, Candidate, Decision, DecisionSink, GateConfig,
    PromotionTarget, StepEvent, StepOutcome,
};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use super::promote::{promote_command_from_config, CommandPromotionTarget, DryRunTarget};
use super::{load_config, parse_config_mode, CliError, EXIT_PROMOTE, EXIT_REJECTED};

/// Env var naming the default decision log when `--audit` is not given.
pub const ENV_AUDIT_PATH: &str = "MG_AUDIT_PATH";

#[derive(Debug, Args)]
pub struct EvaluateArgs {
    /// Evaluation report JSON (native report or upstream metrics output)
    #[arg(long)]
    report: PathBuf,

    /// Bias report JSON (per-facet metrics or a flat attribute -> gap map)
    #[arg(long)]
    bias: Option<PathBuf>,

    /// Explainability JSON (SHAP analysis output or a flat feature -> value map)
    #[arg(long)]
    explainability: Option<PathBuf>,

    /// Primary metric to read from an upstream metrics section (default: auc)
    #[arg(long)]
    metric: Option<String>,

    /// Bias metric to read per facet (default: DPPL)
    #[arg(long = "bias-metric")]
    bias_metric: Option<String>,

    /// Model id recorded in the decision (overrides the report's)
    #[arg(long = "model-id")]
    model_id: Option<String>,

    /// Layered config paths in merge order
    #[arg(long = "config", required = true)]
    config_paths: Vec<String>,

    /// Mode (EVALUATE | PROMOTE)
    #[arg(long, default_value = "EVALUATE")]
    mode: String,

    /// Decision log (JSONL, hash-chained). Falls back to $MG_AUDIT_PATH, then audit.path.
    #[arg(long)]
    audit: Option<PathBuf>,

    /// Write <out>/<run_id>/decision.json + manifest.json
    #[arg(long)]
    out: Option<PathBuf>,

    /// Fail on config keys not consumed in this mode (default: warn)
    #[arg(long = "strict-config", default_value_t = false)]
    strict_config: bool,

    /// Promotion command (PROMOTE mode), e.g. `-- ./register.sh --stage prod`.
    /// Overrides promote.command.
    #[arg(last = true)]
    on_promote: Vec<String>,
}

#[derive(Debug, Args)]
pub struct SelectArgs {
    /// Candidate as ID=PATH (repeatable)
    #[arg(long = "candidate", required = true)]
    candidates: Vec<String>,

    /// Primary metric to read from upstream metrics sections (default: auc)
    #[arg(long)]
    metric: Option<String>,

    /// Layered config paths in merge order
    #[arg(long = "config", required = true)]
    config_paths: Vec<String>,

    /// Fail on config keys not consumed in EVALUATE mode (default: warn)
    #[arg(long = "strict-config", default_value_t = false)]
    strict_config: bool,
}

// ---------------------------------------------------------------------------
// evaluate
// ---------------------------------------------------------------------------

pub fn evaluate(args: EvaluateArgs) -> Result<ExitCode> {
    let mode = parse_config_mode(&args.mode)?;
    let loaded = load_config(&args.config_paths, mode, args.strict_config)?;
    let gate_config = GateConfig::from_config_json(&loaded.config_json)?;

    let run_id = Uuid::new_v4();
    let mut target = build_target(&args.on_promote, &loaded.config_json, mode, run_id)?;

    let report = load_evaluation_report(&ReportInputs {
        evaluation: &args.report,
        bias: args.bias.as_deref(),
        explainability: args.explainability.as_deref(),
        metric: args.metric.as_deref(),
        bias_metric: args.bias_metric.as_deref(),
        model_id: args.model_id.as_deref(),
    })?;

    println!("run_id={}", run_id);
    println!("mode={}", mode.as_str());
    println!("config_hash={}", loaded.config_hash);
    println!("model_id={}", report.model_id);

    let audit_path = resolve_audit_path(args.audit.as_deref(), &loaded.config_json);
    let outcome = match &audit_path {
        Some(path) => {
            let hash_chain = loaded
                .config_json
                .pointer("/audit/hash_chain")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            let mut writer = AuditWriter::resume(path, hash_chain)?;
            let mut sink = AuditSink::new(&mut writer, run_id);
            run_promotion_step(&report, &gate_config, &mut sink, target.as_mut())?
        }
        None => {
            let mut sink = TraceSink;
            run_promotion_step(&report, &gate_config, &mut sink, target.as_mut())?
        }
    };

    print_decision(outcome.decision());
    match &outcome {
        StepOutcome::Promoted { receipt, .. } if receipt.dry_run => {
            println!("action=dry_run target={}", receipt.target);
            println!("receipt={}", receipt.detail);
        }
        StepOutcome::Promoted { receipt, .. } => {
            println!("action=promoted target={}", receipt.target);
            println!("receipt={}", receipt.detail);
        }
        StepOutcome::Halted { .. } => println!("action=halted"),
    }
    if let Some(path) = &audit_path {
        println!("audit_path={}", path.display());
    }

    if let Some(out_root) = &args.out {
        let written = mg_artifacts::write_decision_artifacts(WriteDecisionArgs {
            out_root,
            run_id,
            mode: mode.as_str(),
            config_hash: &loaded.config_hash,
            config: &gate_config,
            report: &report,
            decision: outcome.decision(),
        })?;
        println!("decision_path={}", written.decision_path.display());
    }

    Ok(exit_for(outcome.decision()))
}

fn build_target(
    cli_command: &[String],
    config_json: &Value,
    mode: ConfigMode,
    run_id: Uuid,
) -> Result<Box<dyn PromotionTarget>> {
    if mode == ConfigMode::Evaluate {
        if !cli_command.is_empty() {
            bail!("a promotion command was given but --mode is EVALUATE; use --mode PROMOTE");
        }
        return Ok(Box::new(DryRunTarget));
    }

    let argv = if cli_command.is_empty() {
        promote_command_from_config(config_json).map_err(CliError::Config)?
    } else {
        Some(cli_command.to_vec())
    };
    let Some(argv) = argv else {
        return Err(CliError::Config(anyhow::anyhow!(
            "PROMOTE mode needs a promotion command (-- CMD... or promote.command)"
        ))
        .into());
    };

    // Resolve before evaluating so a missing credential never leaves a
    // recorded promote decision without its promotion.
    let env = resolve_promote_env(config_json, mode).map_err(CliError::Config)?;
    Ok(Box::new(CommandPromotionTarget::new(argv, env, run_id)?))
}

/// `--audit` > `$MG_AUDIT_PATH` > `audit.path`.
fn resolve_audit_path(flag: Option<&Path>, config_json: &Value) -> Option<PathBuf> {
    if let Some(p) = flag {
        return Some(p.to_path_buf());
    }
    if let Ok(p) = std::env::var(ENV_AUDIT_PATH) {
        if !p.trim().is_empty() {
            return Some(PathBuf::from(p));
        }
    }
    config_json
        .pointer("/audit/path")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

/// Sink used when no decision log is configured: tracing only.
struct TraceSink;

impl DecisionSink for TraceSink {
    fn record(&mut self, event: StepEvent<'_>) -> Result<()> {
        match event {
            StepEvent::Decided { report, decision } => {
                debug!(model_id = %report.model_id, promote = decision.promote(), "decision (no audit log)")
            }
            StepEvent::Refused { report, error } => {
                debug!(model_id = %report.model_id, kind = error.kind().as_str(), "refused (no audit log)")
            }
            StepEvent::Promoted { report, receipt } => {
                debug!(model_id = %report.model_id, target = %receipt.target, "promoted (no audit log)")
            }
            StepEvent::PromotionFailed { report, error } => {
                debug!(model_id = %report.model_id, "promotion failed (no audit log): {error}")
            }
            StepEvent::Halted { report, .. } => {
                debug!(model_id = %report.model_id, "halted (no audit log)")
            }
        }
        Ok(())
    }
}

fn print_decision(decision: &Decision) {
    println!(
        "evaluated_at_utc={}",
        decision
            .evaluated_at()
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    );
    println!("promote={}", decision.promote());
    for reason in decision.reasons() {
        println!("reason={}", reason);
    }
}

fn exit_for(decision: &Decision) -> ExitCode {
    if decision.promote() {
        ExitCode::from(EXIT_PROMOTE)
    } else {
        ExitCode::from(EXIT_REJECTED)
    }
}

// ---------------------------------------------------------------------------
// select
// ---------------------------------------------------------------------------

pub fn select(args: SelectArgs) -> Result<ExitCode> {
    let loaded = load_config(&args.config_paths, ConfigMode::Evaluate, args.strict_config)?;
    let gate_config = GateConfig::from_config_json(&loaded.config_json)?;

    let mut candidates: Vec<Candidate> = Vec::with_capacity(args.candidates.len());
    for arg in &args.candidates {
        let (id, path) = parse_candidate(arg)?;
        if candidates.iter().any(|c| c.id == id) {
            bail!("duplicate --candidate id '{id}'");
        }
        let report = load_evaluation_report(&ReportInputs {
            metric: args.metric.as_deref(),
            model_id: Some(id),
            ..ReportInputs::new(Path::new(path))
        })
        .with_context(|| format!("candidate '{id}'"))?;
        candidates.push(Candidate {
            id: id.to_string(),
            report,
        });
    }

    let selection = select_best(&gate_config, &candidates);

    println!("config_hash={}", loaded.config_hash);
    for outcome in &selection.outcomes {
        match &outcome.result {
            Ok(decision) => {
                println!("candidate={} promote={}", outcome.id, decision.promote());
                for reason in decision.fail_reasons() {
                    println!("candidate={} reason={}", outcome.id, reason);
                }
            }
            Err(e) => println!(
                "candidate={} error={} message={}",
                outcome.id,
                e.kind().as_str(),
                e
            ),
        }
    }

    match &selection.winner {
        Some(id) => {
            info!(winner = %id, candidates = candidates.len(), "candidate selected");
            println!("winner={}", id);
            Ok(ExitCode::from(EXIT_PROMOTE))
        }
        None => {
            println!("winner=none");
            Ok(ExitCode::from(EXIT_REJECTED))
        }
    }
}

fn parse_candidate(arg: &str) -> Result<(&str, &str)> {
    match arg.split_once('=') {
        Some((id, path)) if !id.trim().is_empty() && !path.trim().is_empty() => {
            Ok((id.trim(), path.trim()))
        }
        _ => bail!("invalid --candidate '{arg}'. expected ID=PATH"),
    }
}
