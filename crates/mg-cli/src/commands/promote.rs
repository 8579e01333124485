//! Promotion actions the CLI can hand to `run_promotion_step`.

use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use mg_config::promote_env::ResolvedPromoteEnv;
use mg_gate::{Decision, EvaluationReport, PromotionReceipt, PromotionTarget};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

/// Spawns a caller-provided command (register model / deploy endpoint).
///
/// The child inherits the process environment plus the resolved
/// `promote.env` variables and a few `MG_*` descriptors of the decision.
/// A non-zero exit is a promotion failure.
pub struct CommandPromotionTarget {
    argv: Vec<String>,
    env: ResolvedPromoteEnv,
    run_id: Uuid,
}

impl CommandPromotionTarget {
    pub fn new(argv: Vec<String>, env: ResolvedPromoteEnv, run_id: Uuid) -> Result<Self> {
        if argv.first().map_or(true, |p| p.trim().is_empty()) {
            bail!("promotion command is empty");
        }
        Ok(Self { argv, env, run_id })
    }

    fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }
}

impl PromotionTarget for CommandPromotionTarget {
    fn promote(
        &mut self,
        report: &EvaluationReport,
        decision: &Decision,
    ) -> Result<PromotionReceipt> {
        let mut cmd = Command::new(self.program());
        cmd.args(&self.argv[1..])
            .stdin(Stdio::null())
            .env("MG_RUN_ID", self.run_id.to_string())
            .env("MG_MODEL_ID", &report.model_id)
            .env("MG_PRIMARY_METRIC_NAME", decision.primary_metric_name())
            .env("MG_PRIMARY_METRIC", report.primary_metric.to_string());
        for (k, v) in self.env.iter() {
            cmd.env(k, v);
        }

        info!(program = %self.program(), env = ?self.env.names(), "invoking promotion command");
        let out = cmd
            .output()
            .with_context(|| format!("spawn promotion command failed: {}", self.program()))?;

        let stdout = String::from_utf8_lossy(&out.stdout);
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            bail!(
                "promotion command exited with {}: {}",
                out.status,
                last_line(&stderr).unwrap_or("<no stderr>")
            );
        }

        Ok(PromotionReceipt {
            target: format!("command:{}", self.program()),
            detail: last_line(&stdout).unwrap_or("ok").to_string(),
            dry_run: false,
        })
    }
}

/// Stand-in target for EVALUATE mode: reports what would have happened.
pub struct DryRunTarget;

impl PromotionTarget for DryRunTarget {
    fn promote(
        &mut self,
        report: &EvaluationReport,
        _decision: &Decision,
    ) -> Result<PromotionReceipt> {
        Ok(PromotionReceipt {
            target: "dry-run".to_string(),
            detail: format!("mode=EVALUATE; {} not promoted", report.model_id),
            dry_run: true,
        })
    }
}

/// Promotion command from `/promote/command`: a list of args, or a single
/// string split on whitespace.
pub fn promote_command_from_config(config_json: &Value) -> Result<Option<Vec<String>>> {
    let argv = match config_json.pointer("/promote/command") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
        Some(Value::Array(items)) => {
            let mut argv = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item.as_str() {
                    Some(s) => argv.push(s.to_string()),
                    None => bail!("CONFIG_INVALID promote.command[{i}] must be a string"),
                }
            }
            argv
        }
        Some(_) => bail!("CONFIG_INVALID promote.command must be a string or list of strings"),
    };
    Ok(if argv.is_empty() { None } else { Some(argv) })
}

fn last_line(s: &str) -> Option<&str> {
    s.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_from_config_accepts_string_or_list() {
        let cfg = json!({"promote": {"command": "./register.sh --stage prod"}});
        assert_eq!(
            promote_command_from_config(&cfg).unwrap(),
            Some(vec!["./register.sh".into(), "--stage".into(), "prod".into()])
        );

        let cfg = json!({"promote": {"command": ["register", "a b"]}});
        assert_eq!(
            promote_command_from_config(&cfg).unwrap(),
            Some(vec!["register".into(), "a b".into()])
        );

        assert_eq!(promote_command_from_config(&json!({})).unwrap(), None);
        assert_eq!(
            promote_command_from_config(&json!({"promote": {"command": "  "}})).unwrap(),
            None
        );
        assert!(promote_command_from_config(&json!({"promote": {"command": [1]}})).is_err());
    }

    #[test]
    fn empty_argv_is_rejected() {
        let r = CommandPromotionTarget::new(vec![], ResolvedPromoteEnv::default(), Uuid::nil());
        assert!(r.is_err());
    }

    #[test]
    fn last_line_skips_blank_tail() {
        assert_eq!(last_line("a\nb\n\n"), Some("b"));
        assert_eq!(last_line("  \n"), None);
    }
}
