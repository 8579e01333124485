//! mg-config
//!
//! Layered YAML configuration for the promotion step:
//! - merge order: earlier docs are base, later docs override (deep merge)
//! - canonical JSON (recursively sorted keys) + SHA-256 `config_hash`
//! - literal credentials are rejected (`CONFIG_SECRET_DETECTED`)
//! - unused-key guard per mode (`CONFIG_UNUSED_KEYS`)

pub mod promote_env;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;

/// Known secret-like prefixes. Config stores env var NAMES; a leaf string
/// starting with one of these is a pasted credential.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",        // OpenAI style
    "sk_live",    // Stripe live
    "sk_test",    // Stripe test
    "AKIA",       // AWS access key ID
    "ASIA",       // AWS temporary access key ID
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "gho_",       // GitHub OAuth
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
    "xoxp-",      // Slack user token
    "hf_",        // Hugging Face token
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigMode {
    /// Decide only; no external promotion action.
    Evaluate,
    /// Decide, record, and invoke the promotion hook on success.
    Promote,
}

impl ConfigMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigMode::Evaluate => "EVALUATE",
            ConfigMode::Promote => "PROMOTE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub mode: String,
    /// Consumed JSON-pointer prefixes used for this analysis (sorted, unique)
    pub consumed_prefixes: Vec<String>,
    /// Unused leaf pointers (sorted)
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Registry of consumed JSON-pointer prefixes per mode.
///
/// Only pointers actually read in that mode belong here:
/// - mg-gate::GateConfig::from_config_json
///     /gate/min_primary_metric, /gate/max_fairness_gap, /gate/require_explainability
/// - mg-cli (decision log)
///     /audit/path, /audit/hash_chain
/// - mg-cli + promote_env (PROMOTE only)
///     /promote/command, /promote/env
pub fn consumed_pointers_for_mode(mode: ConfigMode) -> &'static [&'static str] {
    match mode {
        ConfigMode::Evaluate => &[
            "/gate/min_primary_metric",
            "/gate/max_fairness_gap",
            "/gate/require_explainability",
            "/audit/path",
            "/audit/hash_chain",
        ],
        ConfigMode::Promote => &[
            "/gate/min_primary_metric",
            "/gate/max_fairness_gap",
            "/gate/require_explainability",
            "/audit/path",
            "/audit/hash_chain",
            "/promote/command",
            "/promote/env",
        ],
    }
}

/// Produce an unused-key report for a given mode.
/// `Fail` returns an error when unused keys exist; `Warn` always returns the report.
pub fn report_unused_keys(
    mode: ConfigMode,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport> {
    let consumed_prefixes: Vec<String> = consumed_pointers_for_mode(mode)
        .iter()
        .map(|p| normalize_pointer(p))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let unused_leaf_pointers: Vec<String> = leaves(config_json)
        .into_iter()
        .map(|(ptr, _)| ptr)
        .filter(|leaf| !consumed_prefixes.iter().any(|cp| is_prefix_pointer(cp, leaf)))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let report = UnusedKeyReport {
        mode: mode.as_str().to_string(),
        consumed_prefixes,
        unused_leaf_pointers,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        let preview: Vec<&String> = report.unused_leaf_pointers.iter().take(12).collect();
        bail!(
            "CONFIG_UNUSED_KEYS (mode={}): {} config key(s) not read by the gate: {:?}",
            report.mode,
            report.unused_leaf_pointers.len(),
            preview
        );
    }

    Ok(report)
}

/// Leading "/", no trailing "/" (except root).
fn normalize_pointer(p: &str) -> String {
    let body = p.trim().trim_matches('/');
    format!("/{body}")
}

/// "/a/b" consumes "/a/b" and "/a/b/c" but NOT "/a/bc"; "/" consumes everything.
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    prefix == "/"
        || leaf == prefix
        || leaf
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Every scalar in `v` with its JSON pointer. Empty containers have no leaves.
fn leaves(v: &Value) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    let mut stack: Vec<(String, &Value)> = vec![(String::new(), v)];
    while let Some((ptr, node)) = stack.pop() {
        match node {
            Value::Object(map) => {
                for (k, child) in map {
                    let token = k.replace('~', "~0").replace('/', "~1");
                    stack.push((format!("{ptr}/{token}"), child));
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    stack.push((format!("{ptr}/{i}"), child));
                }
            }
            _ if ptr.is_empty() => out.push(("/".to_string(), node)),
            _ => out.push((ptr, node)),
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}")))
        .collect::<Result<Vec<String>>>()?;
    let doc_refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());
    for (i, raw) in yaml_docs.iter().enumerate() {
        let layer: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("invalid yaml (layer {i})"))?;
        let layer = serde_json::to_value(layer)
            .with_context(|| format!("yaml layer {i} is not representable as json"))?;
        // An empty document is a no-op layer, not a reset.
        if !layer.is_null() {
            merge_into(&mut merged, layer);
        }
    }

    reject_secret_literals(&merged)?;

    let canonical_json =
        serde_json::to_string(&sorted(&merged)).context("canonical json serialize failed")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; any other overlay value replaces the base.
fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (k, v) in overlay_map {
                merge_into(base_map.entry(k).or_insert(Value::Null), v);
            }
        }
        (slot, v) => *slot = v,
    }
}

/// Copy of `v` with object keys in sorted order at every depth.
fn sorted(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let ordered: BTreeMap<&String, Value> =
                map.iter().map(|(k, child)| (k, sorted(child))).collect();
            Value::Object(ordered.into_iter().map(|(k, c)| (k.clone(), c)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

fn reject_secret_literals(v: &Value) -> Result<()> {
    let hit = leaves(v)
        .into_iter()
        .find(|(_, leaf)| leaf.as_str().is_some_and(looks_like_secret));
    if let Some((ptr, _)) = hit {
        bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    t.len() >= 8 && SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}
