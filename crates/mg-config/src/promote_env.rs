//! Environment forwarded to the promotion hook.
//!
//! # Contract
//! - Config YAML stores only env var **names** under `promote.env`
//!   (e.g. `["MG_REGISTRY_TOKEN", "AWS_PROFILE"]`).
//! - Callers resolve them once with [`resolve_promote_env`] and hand the
//!   result to the hook; `std::env::var` is not scattered elsewhere.
//! - `Debug` redacts values; errors name the variable, never the value.
//!
//! # Mode-aware enforcement
//! - `PROMOTE`:  every listed variable is **required**.
//! - `EVALUATE`: nothing is resolved; the hook never runs.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use serde_json::Value;

use crate::ConfigMode;

/// Resolved `name -> value` pairs for the promotion hook.
#[derive(Clone, Default)]
pub struct ResolvedPromoteEnv {
    vars: BTreeMap<String, String>,
}

impl ResolvedPromoteEnv {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.vars.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl std::fmt::Debug for ResolvedPromoteEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut m = f.debug_map();
        for name in self.vars.keys() {
            m.entry(name, &"<REDACTED>");
        }
        m.finish()
    }
}

/// Env var names listed at `/promote/env`. A single string is accepted as a
/// one-element list. Blank names are ignored.
pub fn promote_env_names(config_json: &Value) -> Result<Vec<String>> {
    let names = match config_json.pointer("/promote/env") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item.as_str() {
                    Some(s) => out.push(s.to_string()),
                    None => bail!("CONFIG_INVALID promote.env[{i}] must be an env var name"),
                }
            }
            out
        }
        Some(_) => bail!("CONFIG_INVALID promote.env must be a list of env var names"),
    };

    Ok(names
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect())
}

/// Resolve the promotion hook environment for `mode`.
///
/// # Errors
/// `PROMOTE_ENV_MISSING` naming the first required variable that is unset or blank.
pub fn resolve_promote_env(config_json: &Value, mode: ConfigMode) -> Result<ResolvedPromoteEnv> {
    if mode == ConfigMode::Evaluate {
        return Ok(ResolvedPromoteEnv::default());
    }

    let mut vars = BTreeMap::new();
    for name in promote_env_names(config_json)? {
        match std::env::var(&name) {
            Ok(v) if !v.trim().is_empty() => {
                vars.insert(name, v);
            }
            _ => bail!(
                "PROMOTE_ENV_MISSING mode={}: required env var '{}' is not set or empty",
                mode.as_str(),
                name
            ),
        }
    }
    Ok(ResolvedPromoteEnv { vars })
}
