//! mg-audit
//!
//! Append-only decision log. One canonical JSON event per line, optionally
//! linked into a SHA-256 hash chain (`hash_prev` -> `hash_self`) so that an
//! edited or deleted gate decision is detectable after the fact.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Namespace for deterministic event ids. Changing it changes every id.
const EVENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6d67_2d61_7564_6974_2d65_7665_6e74_2d31);

/// What an audit line records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventKind {
    /// The gate produced a decision (promote or not).
    GateDecision,
    /// The gate refused to decide (data / configuration / upstream error).
    GateError,
    /// The external register/deploy action was invoked and succeeded.
    PromotionInvoked,
    /// The external register/deploy action was invoked and failed.
    PromotionFailed,
    /// The decision was "promote" but the run was evaluate-only; nothing was invoked.
    PromotionDryRun,
    /// The pipeline was stopped because the decision was "do not promote".
    PipelineHalted,
}

impl AuditEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventKind::GateDecision => "GATE_DECISION",
            AuditEventKind::GateError => "GATE_ERROR",
            AuditEventKind::PromotionInvoked => "PROMOTION_INVOKED",
            AuditEventKind::PromotionFailed => "PROMOTION_FAILED",
            AuditEventKind::PromotionDryRun => "PROMOTION_DRY_RUN",
            AuditEventKind::PipelineHalted => "PIPELINE_HALTED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub run_id: Uuid,
    pub model_id: String,
    pub kind: AuditEventKind,
    pub recorded_at_utc: DateTime<Utc>,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Append-only JSONL writer for gate decisions.
pub struct AuditWriter {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    /// Number of events already in the log; feeds `event_id` derivation.
    seq: u64,
}

impl AuditWriter {
    /// Creates the writer and ensures parent dirs exist. Does not read the file;
    /// use [`AuditWriter::resume`] to continue an existing chain.
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create_dir_all {:?}", parent))?;
            }
        }

        Ok(Self {
            path,
            hash_chain,
            last_hash: None,
            seq: 0,
        })
    }

    /// Open an existing log (or start a new one) and continue its chain.
    ///
    /// The existing content is verified first; appending onto a broken chain
    /// would make every later line unverifiable, so that is refused. If the
    /// log is already chained, `hash_chain = false` is ignored.
    pub fn resume(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let mut writer = Self::new(path, hash_chain)?;
        if !writer.path.exists() {
            return Ok(writer);
        }

        let content = fs::read_to_string(&writer.path)
            .with_context(|| format!("read audit log {:?}", writer.path))?;

        if let VerifyResult::Broken { line, reason } = verify_hash_chain_str(&content)? {
            bail!(
                "AUDIT_CHAIN_BROKEN path={} line={} reason={}",
                writer.path.display(),
                line,
                reason
            );
        }

        let mut last: Option<AuditEvent> = None;
        let mut count = 0u64;
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            last = Some(serde_json::from_str(line).context("parse audit event on resume")?);
            count += 1;
        }

        writer.seq = count;
        writer.last_hash = last.and_then(|ev| ev.hash_self);
        // A chained log stays chained: an unlinked line would break every later resume.
        if writer.last_hash.is_some() {
            writer.hash_chain = true;
        }
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether appended events are linked. Always true after resuming a chained log.
    pub fn hash_chain(&self) -> bool {
        self.hash_chain
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    /// Number of events appended to this log so far.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Append one event and return it as written.
    pub fn append(
        &mut self,
        run_id: Uuid,
        model_id: &str,
        kind: AuditEventKind,
        payload: Value,
    ) -> Result<AuditEvent> {
        let event_id = derive_event_id(self.last_hash.as_deref(), &payload, self.seq)?;

        let mut ev = AuditEvent {
            event_id,
            run_id,
            model_id: model_id.to_string(),
            kind,
            recorded_at_utc: Utc::now(),
            payload,
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            ev.hash_prev = self.last_hash.clone();
            ev.hash_self = Some(compute_event_hash(&ev)?);
        }

        let line = canonical_json_line(&ev)?;
        append_line(&self.path, &line)?;

        // Only advance chain state once the line is on disk.
        self.seq += 1;
        if self.hash_chain {
            self.last_hash = ev.hash_self.clone();
        }

        Ok(ev)
    }
}

/// Deterministic event id: UUID v5 over (previous hash, sequence, canonical payload).
///
/// Two writers replaying the same decisions produce the same ids.
pub fn derive_event_id(prev_hash: Option<&str>, payload: &Value, seq: u64) -> Result<Uuid> {
    let canonical = canonical_json_line(payload)?;
    let material = format!("{}|{}|{}", prev_hash.unwrap_or("GENESIS"), seq, canonical);
    Ok(Uuid::new_v5(&EVENT_ID_NAMESPACE, material.as_bytes()))
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit log {:?}", path))?;
    f.write_all(format!("{line}\n").as_bytes())
        .context("write audit line failed")?;
    Ok(())
}

/// Compact JSON with keys sorted recursively.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit event failed")?;
    serde_json::to_string(&sort_keys(&raw)).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), sort_keys(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Hash of the canonical event with `hash_self` cleared.
pub fn compute_event_hash(ev: &AuditEvent) -> Result<String> {
    let mut unsealed = ev.clone();
    unsealed.hash_self = None;

    let canonical = canonical_json_line(&unsealed)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

/// Verify the hash chain of an audit log file.
pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    verify_hash_chain_str(&content)
}

/// Verify the hash chain of in-memory JSONL content.
///
/// Lines are 1-based in the result. Blank lines are skipped but still counted
/// for line numbering so the reported line matches an editor. Unsealed lines
/// are accepted only before the first sealed one.
pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut chained = false;
    let mut events = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let ev: AuditEvent = match serde_json::from_str(trimmed) {
            Ok(ev) => ev,
            Err(e) => {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: format!("unparseable event: {e}"),
                })
            }
        };
        events += 1;

        if ev.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, ev.hash_prev
                ),
            });
        }

        match ev.hash_self.as_deref() {
            Some(claimed) => {
                let recomputed = compute_event_hash(&ev)?;
                if claimed != recomputed {
                    return Ok(VerifyResult::Broken {
                        line: i + 1,
                        reason: format!(
                            "hash_self mismatch: claimed {}, recomputed {}",
                            claimed, recomputed
                        ),
                    });
                }
                chained = true;
            }
            // Once the chain has started every line must be sealed; an unsealed
            // line would otherwise be an unverifiable edit.
            None if chained || ev.hash_prev.is_some() => {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: "missing hash_self".to_string(),
                });
            }
            None => {}
        }

        prev_hash = ev.hash_self;
    }

    Ok(VerifyResult::Valid { lines: events })
}

/// Result of hash chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sort_keys_is_recursive() {
        let v = json!({"b": {"z": 1, "a": 2}, "a": [{"y": 1, "x": 2}]});
        let s = serde_json::to_string(&sort_keys(&v)).unwrap();
        assert_eq!(s, r#"{"a":[{"x":2,"y":1}],"b":{"a":2,"z":1}}"#);
    }

    #[test]
    fn event_id_depends_on_chain_position() {
        let payload = json!({"promote": true});
        let a = derive_event_id(None, &payload, 0).unwrap();
        let b = derive_event_id(None, &payload, 1).unwrap();
        let c = derive_event_id(Some("abc"), &payload, 0).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, derive_event_id(None, &payload, 0).unwrap());
    }
}
