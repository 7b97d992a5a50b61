//! Offline verification of evidence files

use crate::digest::{hex_eq, hmac_hex, Sha256Digest};
use crate::error::EvidenceError;
use crate::log::{canonical_json, HASH_FIELD, HMAC_FIELD, PREV_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Result of re-hashing every line of one evidence file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Non-blank lines seen
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    /// Lines without a `sha256` field (written before signing existed)
    pub skipped_legacy: usize,
    /// 1-based line number of the first invalid line
    pub first_invalid_line: Option<usize>,
    /// Lines whose `prev_sha256` does not match the preceding line's hash
    pub chain_breaks: usize,
    /// Hashed lines with no `hmac` while a key was supplied; also counted invalid
    #[serde(default)]
    pub missing_hmac: usize,
}

impl VerifyReport {
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.invalid == 0
    }

    fn fail(&mut self, line_no: usize) {
        self.invalid += 1;
        self.first_invalid_line.get_or_insert(line_no);
    }
}

/// Re-hash every line of `path`.
///
/// A missing file yields an empty report. When `hmac_key` is given, every
/// hashed line must also carry a matching `hmac`; a stripped one is invalid.
///
/// # Errors
/// Returns error on I/O failure other than a missing file
pub fn verify(path: &Path, hmac_key: Option<&[u8]>) -> Result<VerifyReport, EvidenceError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(VerifyReport::default()),
        Err(e) => return Err(EvidenceError::Io(e)),
    };

    let mut report = VerifyReport::default();
    let mut previous_hash: Option<String> = None;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        report.total += 1;

        let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(line) else {
            report.fail(line_no);
            previous_hash = None;
            continue;
        };

        let Some(stored) = map.remove(HASH_FIELD) else {
            report.skipped_legacy += 1;
            previous_hash = None;
            continue;
        };
        let stored = stored.as_str().unwrap_or_default().to_string();
        let stored_hmac = map.remove(HMAC_FIELD);

        let canonical = canonical_json(&Value::Object(map.clone()));
        let mut ok = Sha256Digest::compute(canonical.as_bytes()).to_string() == stored;
        if let Some(key) = hmac_key {
            match &stored_hmac {
                Some(Value::String(mac)) => ok &= hex_eq(mac, &hmac_hex(key, canonical.as_bytes())),
                _ => {
                    report.missing_hmac += 1;
                    ok = false;
                }
            }
        }

        if ok {
            report.valid += 1;
        } else {
            report.fail(line_no);
        }

        if let (Some(prev), Some(Value::String(claimed))) = (&previous_hash, map.get(PREV_FIELD)) {
            if prev != claimed {
                report.chain_breaks += 1;
            }
        }
        previous_hash = Some(stored);
    }

    Ok(report)
}
