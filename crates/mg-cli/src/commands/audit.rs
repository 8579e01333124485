use anyhow::{bail, Result};
use mg_audit::VerifyResult;

/// Verify a decision log and print `key=value` lines.
pub fn verify(path: &str) -> Result<()> {
    match mg_audit::verify_hash_chain(path)? {
        VerifyResult::Valid { lines } => {
            println!("audit_valid=true path={} lines={}", path, lines);
            Ok(())
        }
        VerifyResult::Broken { line, reason } => {
            println!("audit_valid=false path={} line={}", path, line);
            bail!("AUDIT_CHAIN_BROKEN line={line}: {reason}")
        }
    }
}
