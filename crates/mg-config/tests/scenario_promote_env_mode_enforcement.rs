//! Mode-aware resolution of the promotion hook environment.
//!
//! Failure cases use sentinel names (`MG_SENTINEL_*`) that are never set, so
//! no test mutates the process environment.

use mg_config::promote_env::{promote_env_names, resolve_promote_env};
use mg_config::{load_layered_yaml_from_strings, ConfigMode};

fn load(yaml: &str) -> serde_json::Value {
    load_layered_yaml_from_strings(&[yaml])
        .expect("test yaml must parse cleanly")
        .config_json
}

#[test]
fn promote_mode_fails_closed_on_missing_var() {
    let cfg = load("promote:\n  env: [\"MG_SENTINEL_REGISTRY_TOKEN_7f3a\"]\n");
    let err = resolve_promote_env(&cfg, ConfigMode::Promote).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("PROMOTE_ENV_MISSING"), "{msg}");
    assert!(msg.contains("MG_SENTINEL_REGISTRY_TOKEN_7f3a"), "{msg}");
}

#[test]
fn evaluate_mode_resolves_nothing() {
    let cfg = load("promote:\n  env: [\"MG_SENTINEL_REGISTRY_TOKEN_7f3a\"]\n");
    let env = resolve_promote_env(&cfg, ConfigMode::Evaluate).unwrap();
    assert!(env.is_empty());
}

#[test]
fn present_var_is_resolved_and_redacted_in_debug() {
    // PATH is set in every test environment.
    let cfg = load("promote:\n  env: [\"PATH\"]\n");
    let env = resolve_promote_env(&cfg, ConfigMode::Promote).unwrap();

    assert_eq!(env.names(), vec!["PATH"]);
    let debug = format!("{env:?}");
    assert!(debug.contains("<REDACTED>"), "{debug}");
    let path_value = std::env::var("PATH").unwrap();
    assert!(!debug.contains(&path_value), "value leaked into Debug");
}

#[test]
fn single_string_is_accepted_and_blanks_ignored() {
    assert_eq!(
        promote_env_names(&load("promote:\n  env: \"MG_TOKEN\"\n")).unwrap(),
        vec!["MG_TOKEN".to_string()]
    );
    assert_eq!(
        promote_env_names(&load("promote:\n  env: [\"  \", \"MG_TOKEN\"]\n")).unwrap(),
        vec!["MG_TOKEN".to_string()]
    );
    assert!(promote_env_names(&load("gate:\n  min_primary_metric: 0.7\n"))
        .unwrap()
        .is_empty());
}

#[test]
fn non_string_entries_are_rejected() {
    let err = promote_env_names(&load("promote:\n  env: [42]\n")).unwrap_err();
    assert!(err.to_string().contains("promote.env[0]"), "{err}");
}
