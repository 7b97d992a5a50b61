//! Append-only evidence log
//!
//! Every line is a JSON object carrying `timestamp`, `prev_sha256` and a
//! `sha256` over the canonical form of the rest of the line. When an HMAC key
//! is configured the line also carries `hmac` over the same canonical bytes.
//!
//! The log is event-sourced: several lines may share an `id` as an event moves
//! from `pending` to its terminal state. Readers take the last line per id
//! (see [`EvidenceLog::project_latest`]).

use crate::digest::{hmac_hex, Sha256Digest};
use crate::error::EvidenceError;
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use warden_core::{EventId, EvidenceConfig};

/// Field holding the line hash
pub const HASH_FIELD: &str = "sha256";
/// Field holding the optional keyed signature
pub const HMAC_FIELD: &str = "hmac";
/// Field chaining a line to its predecessor
pub const PREV_FIELD: &str = "prev_sha256";
/// Timestamp field injected when absent
pub const TIMESTAMP_FIELD: &str = "timestamp";

#[derive(Debug, Default)]
struct ChainState {
    loaded: bool,
    last: Option<String>,
}

/// Hash-chained JSONL sink with size-based rotation
#[derive(Debug)]
pub struct EvidenceLog {
    path: PathBuf,
    max_bytes: u64,
    hmac_key: Option<Vec<u8>>,
    degraded: AtomicBool,
    chain: Mutex<ChainState>,
}

impl EvidenceLog {
    /// Log at `path`, rotating once the file reaches `max_bytes`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            path: path.into(),
            max_bytes,
            hmac_key: None,
            degraded: AtomicBool::new(false),
            chain: Mutex::new(ChainState::default()),
        }
    }

    /// Log at `path` with rotation ceiling and HMAC key from config
    #[must_use]
    pub fn from_config(path: impl Into<PathBuf>, config: &EvidenceConfig) -> Self {
        let log = Self::new(path, config.max_log_bytes);
        match &config.hmac_key {
            Some(key) => log.with_hmac_key(key.as_bytes()),
            None => log,
        }
    }

    #[must_use]
    pub fn with_hmac_key(mut self, key: &[u8]) -> Self {
        self.hmac_key = Some(key.to_vec());
        self
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the single retained rotation (`<file>.1`)
    #[must_use]
    pub fn rotated_path(&self) -> PathBuf {
        rotated_path_of(&self.path)
    }

    /// True once any write has failed
    #[inline]
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Append one entry and return it as written.
    ///
    /// Never fails: write errors mark the log degraded and are swallowed.
    pub fn append(&self, entry: Value) -> Value {
        let mut map = match entry {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("payload".to_string(), other);
                map
            }
        };
        map.remove(HASH_FIELD);
        map.remove(HMAC_FIELD);
        map.remove(PREV_FIELD);
        if !map.contains_key(TIMESTAMP_FIELD) {
            map.insert(TIMESTAMP_FIELD.to_string(), Value::String(now_rfc3339()));
        }

        let mut chain = self.chain.lock();
        if !chain.loaded {
            chain.last = last_hash_in(&self.path);
            chain.loaded = true;
        }

        match self.rotate_if_needed() {
            Ok(Some(previous_bytes)) => {
                let marker = self.rotation_marker(previous_bytes);
                let marker = self.seal(marker, chain.last.clone());
                if self.write_line(&marker) {
                    chain.last = sealed_hash(&marker);
                }
            }
            Ok(None) => {}
            Err(e) => self.mark_degraded(&e),
        }

        let sealed = self.seal(map, chain.last.clone());
        if self.write_line(&sealed) {
            chain.last = sealed_hash(&sealed);
        }
        Value::Object(sealed)
    }

    /// Last `n` parseable entries, spanning the rotated file when needed
    ///
    /// # Errors
    /// Returns error on I/O failure other than a missing file
    pub fn tail(&self, n: usize) -> Result<Vec<Value>, EvidenceError> {
        let entries = self.read_all()?;
        let skip = entries.len().saturating_sub(n);
        Ok(entries.into_iter().skip(skip).collect())
    }

    /// Fold rotated + current file into id -> last entry for that id
    ///
    /// Entries are keyed by `id`, falling back to `event_id`; entries with
    /// neither are ignored.
    ///
    /// # Errors
    /// Returns error on I/O failure other than a missing file
    pub fn project_latest(&self) -> Result<BTreeMap<String, Value>, EvidenceError> {
        let mut latest = BTreeMap::new();
        for entry in self.read_all()? {
            let id = entry
                .get("id")
                .or_else(|| entry.get("event_id"))
                .and_then(Value::as_str)
                .map(str::to_string);
            if let Some(id) = id {
                latest.insert(id, entry);
            }
        }
        Ok(latest)
    }

    /// Every parseable entry, rotated file first
    ///
    /// # Errors
    /// Returns error on I/O failure other than a missing file
    pub fn read_all(&self) -> Result<Vec<Value>, EvidenceError> {
        let mut entries = read_entries(&self.rotated_path())?;
        entries.extend(read_entries(&self.path)?);
        Ok(entries)
    }

    fn seal(&self, mut map: Map<String, Value>, prev: Option<String>) -> Map<String, Value> {
        map.insert(
            PREV_FIELD.to_string(),
            prev.map_or(Value::Null, Value::String),
        );
        let canonical = canonical_json(&Value::Object(map.clone()));
        let digest = Sha256Digest::compute(canonical.as_bytes());
        map.insert(HASH_FIELD.to_string(), Value::String(digest.to_string()));
        if let Some(key) = &self.hmac_key {
            map.insert(
                HMAC_FIELD.to_string(),
                Value::String(hmac_hex(key, canonical.as_bytes())),
            );
        }
        map
    }

    fn write_line(&self, map: &Map<String, Value>) -> bool {
        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let mut line = serde_json::to_string(map).map_err(std::io::Error::other)?;
            line.push('\n');
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            file.write_all(line.as_bytes())
        })();
        match result {
            Ok(()) => true,
            Err(e) => {
                self.mark_degraded(&e);
                false
            }
        }
    }

    fn rotate_if_needed(&self) -> std::io::Result<Option<u64>> {
        let size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        if size < self.max_bytes {
            return Ok(None);
        }
        let rotated = self.rotated_path();
        match fs::remove_file(&rotated) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        fs::rename(&self.path, &rotated)?;
        tracing::info!(path = %self.path.display(), bytes = size, "evidence log rotated");
        Ok(Some(size))
    }

    fn rotation_marker(&self, previous_bytes: u64) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(
            "id".to_string(),
            Value::String(EventId::with_prefix("rot").to_string()),
        );
        map.insert(TIMESTAMP_FIELD.to_string(), Value::String(now_rfc3339()));
        map.insert("actor".to_string(), Value::String("system".to_string()));
        map.insert("event".to_string(), Value::String("log_rotated".to_string()));
        map.insert("result".to_string(), Value::String("rotated".to_string()));
        map.insert(
            "rotated_to".to_string(),
            Value::String(self.rotated_path().display().to_string()),
        );
        map.insert("previous_bytes".to_string(), Value::from(previous_bytes));
        map
    }

    fn mark_degraded(&self, error: &std::io::Error) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            tracing::error!(path = %self.path.display(), %error, "evidence logging degraded");
        } else {
            tracing::warn!(path = %self.path.display(), %error, "evidence write failed");
        }
    }
}

/// Canonical serialization: compact JSON with object keys sorted at every depth
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            let mut out = Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), canonicalize(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

pub(crate) fn rotated_path_of(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".1");
    PathBuf::from(name)
}

fn read_entries(path: &Path) -> Result<Vec<Value>, EvidenceError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(EvidenceError::Io(e)),
    };
    Ok(text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .collect())
}

fn last_hash_in(path: &Path) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    text.lines()
        .rev()
        .filter(|line| !line.trim().is_empty())
        .find_map(|line| {
            serde_json::from_str::<Value>(line)
                .ok()?
                .get(HASH_FIELD)?
                .as_str()
                .map(str::to_string)
        })
}

fn sealed_hash(map: &Map<String, Value>) -> Option<String> {
    map.get(HASH_FIELD).and_then(Value::as_str).map(str::to_string)
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
