//! Command handler modules for mg-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod audit;
pub mod gate;
pub mod promote;

use anyhow::Result;
use mg_artifacts::ReportLoadError;
use mg_config::{ConfigMode, LoadedConfig, UnusedKeyPolicy};
use mg_gate::{ConfigurationError, DataError, GateError, PromotionError};
use thiserror::Error;
use tracing::warn;

// ---------------------------------------------------------------------------
// Exit codes
// ---------------------------------------------------------------------------

/// Gate passed (and the promotion action, if any, succeeded).
pub const EXIT_PROMOTE: u8 = 0;
/// Anything not covered below: IO, audit, promotion hook failure.
pub const EXIT_FAILURE: u8 = 1;
/// The gate refused to decide: data, configuration or upstream error.
pub const EXIT_INPUT_ERROR: u8 = 2;
/// The gate decided "do not promote". A reported stop, not a crash.
pub const EXIT_REJECTED: u8 = 3;

/// CLI-level failures that need their own exit code but originate as
/// untyped `anyhow` errors in the config loader.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration: {0:#}")]
    Config(anyhow::Error),
}

pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<CliError>().is_some()
        || err.downcast_ref::<GateError>().is_some()
        || err.downcast_ref::<ConfigurationError>().is_some()
        || err.downcast_ref::<DataError>().is_some()
        || err.downcast_ref::<ReportLoadError>().is_some()
    {
        return EXIT_INPUT_ERROR;
    }
    match err.downcast_ref::<PromotionError>() {
        Some(PromotionError::Gate(_)) => EXIT_INPUT_ERROR,
        _ => EXIT_FAILURE,
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Parse a CLI `--mode` string into a [`ConfigMode`].
pub fn parse_config_mode(mode: &str) -> Result<ConfigMode> {
    match mode.trim().to_uppercase().as_str() {
        "EVALUATE" => Ok(ConfigMode::Evaluate),
        "PROMOTE" => Ok(ConfigMode::Promote),
        other => anyhow::bail!(
            "invalid --mode '{}'. expected one of: EVALUATE | PROMOTE",
            other
        ),
    }
}

/// Load layered config and run the unused-key guard for `mode`.
///
/// Every failure here is a configuration error for exit-code purposes.
pub fn load_config(paths: &[String], mode: ConfigMode, strict: bool) -> Result<LoadedConfig> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = mg_config::load_layered_yaml(&path_refs).map_err(CliError::Config)?;

    let policy = if strict {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let report = mg_config::report_unused_keys(mode, &loaded.config_json, policy)
        .map_err(CliError::Config)?;
    for leaf in &report.unused_leaf_pointers {
        warn!(mode = %report.mode, key = %leaf, "config key is not consumed in this mode");
    }

    Ok(loaded)
}
