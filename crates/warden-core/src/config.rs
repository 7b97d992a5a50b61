//! Warden configuration
//!
//! One [`WardenConfig`] is built at process start (TOML file, then
//! environment overlay) and threaded by reference into every component.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for time windows held in seconds (one year)
pub const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub governance: GovernanceConfig,
    pub rate_limit: RateLimitConfig,
    pub audit: AuditConfig,
    pub patch: PatchConfig,
    pub evidence: EvidenceConfig,
    pub tests: TestConfig,
    pub context: ContextConfig,
}

impl WardenConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from an optional TOML file, overlay the process environment, validate.
    ///
    /// # Errors
    /// Returns error if the file is unreadable or malformed, an env value is
    /// unparseable, or a limit is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(std::env::vars())?;
        config.validate()?;
        tracing::debug!(kill_switch = config.governance.kill_switch, "configuration loaded");
        Ok(config)
    }

    /// Parse from TOML text (missing sections fall back to defaults)
    ///
    /// # Errors
    /// Returns error on malformed TOML
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Overlay recognised environment variables.
    ///
    /// `IDLE_MODE` is accepted as a legacy spelling of `WARDEN_KILL_SWITCH`.
    ///
    /// # Errors
    /// Returns error if a recognised variable has an unparseable value
    pub fn apply_env<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "WARDEN_KILL_SWITCH" | "IDLE_MODE" => {
                    self.governance.kill_switch = parse_flag(value);
                }
                "WARDEN_ALLOW_AUTOMATED_WHEN_ACTIVE" | "MUD_BOT_ALLOW_WHEN_ACTIVE" => {
                    self.governance.allow_automated_when_active = parse_flag(value);
                }
                "WARDEN_ARM_TIMEOUT_SECS" => {
                    self.governance.arm_timeout_secs =
                        value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                            key: key.to_string(),
                            value: value.to_string(),
                        })?;
                }
                "WARDEN_EVIDENCE_HMAC_KEY" | "EVIDENCE_HMAC_KEY" => {
                    self.evidence.hmac_key = (!value.is_empty()).then(|| value.to_string());
                }
                "WARDEN_EVIDENCE_DIR" => {
                    self.evidence.dir = PathBuf::from(value);
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Reject unusable limits
    ///
    /// # Errors
    /// Returns the first invalid setting found
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn nonzero(field: &'static str, value: u64) -> Result<(), ConfigError> {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
            Ok(())
        }
        fn window(field: &'static str, value: u64) -> Result<(), ConfigError> {
            nonzero(field, value)?;
            if value > MAX_WINDOW_SECS {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be at most {MAX_WINDOW_SECS} seconds"),
                });
            }
            Ok(())
        }
        window("governance.arm_timeout_secs", self.governance.arm_timeout_secs)?;
        nonzero("rate_limit.max_commands", self.rate_limit.max_commands as u64)?;
        window("rate_limit.window_secs", self.rate_limit.window_secs)?;
        nonzero("audit.max_message_bytes", self.audit.max_message_bytes as u64)?;
        nonzero("audit.max_command_chars", self.audit.max_command_chars as u64)?;
        nonzero("patch.max_diff_bytes", self.patch.max_diff_bytes as u64)?;
        nonzero("evidence.max_log_bytes", self.evidence.max_log_bytes)?;
        window("tests.timeout_secs", self.tests.timeout_secs)?;
        if self.tests.default_command.split_whitespace().next().is_none() {
            return Err(ConfigError::Invalid {
                field: "tests.default_command",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn with_kill_switch(mut self, on: bool) -> Self {
        self.governance.kill_switch = on;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_arm_timeout_secs(mut self, secs: u64) -> Self {
        self.governance.arm_timeout_secs = secs;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_evidence_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.evidence.dir = dir.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_hmac_key(mut self, key: impl Into<String>) -> Self {
        self.evidence.hmac_key = Some(key.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_rate_limit(mut self, max_commands: usize, window_secs: u64) -> Self {
        self.rate_limit = RateLimitConfig {
            max_commands,
            window_secs,
        };
        self
    }

    #[inline]
    #[must_use]
    pub fn with_tests(mut self, tests: TestConfig) -> Self {
        self.tests = tests;
        self
    }
}

/// Consent-window and interlock settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Global kill switch: no build may start, no arm/consent accepted
    pub kill_switch: bool,
    /// Validity window of an arm, in seconds
    pub arm_timeout_secs: u64,
    /// Let automated actors connect while a mutation window may be live
    pub allow_automated_when_active: bool,
}

impl GovernanceConfig {
    #[inline]
    #[must_use]
    pub fn arm_timeout(&self) -> chrono::TimeDelta {
        seconds_delta(self.arm_timeout_secs)
    }
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            kill_switch: false,
            arm_timeout_secs: 300,
            allow_automated_when_active: false,
        }
    }
}

/// Sliding-window throttle for automated actors
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_commands: usize,
    pub window_secs: u64,
}

impl RateLimitConfig {
    #[inline]
    #[must_use]
    pub fn window(&self) -> chrono::TimeDelta {
        seconds_delta(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_commands: 5,
            window_secs: 10,
        }
    }
}

/// Hard caps applied before a command reaches the gate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Raw message ceiling in bytes; larger messages are rejected outright
    pub max_message_bytes: usize,
    /// Command ceiling in characters; longer commands are truncated
    pub max_command_chars: usize,
    /// Source tag stamped on audit records
    pub source: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 2048,
            max_command_chars: 500,
            source: "ai_player".to_string(),
        }
    }
}

/// Patch application limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    pub max_diff_bytes: usize,
    /// Try the external VCS tool (`git apply --check`, then `git apply`) first
    pub use_vcs: bool,
    pub vcs_binary: String,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            max_diff_bytes: 200 * 1024,
            use_vcs: false,
            vcs_binary: "git".to_string(),
        }
    }
}

/// Evidence log placement, rotation, and signing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    pub dir: PathBuf,
    /// Rotation ceiling per log file
    pub max_log_bytes: u64,
    /// Out-of-band HMAC secret; entries also carry `hmac` when set
    #[serde(skip_serializing)]
    pub hmac_key: Option<String>,
}

impl EvidenceConfig {
    #[must_use]
    pub fn build_log_path(&self) -> PathBuf {
        self.dir.join("event_log.jsonl")
    }

    #[must_use]
    pub fn audit_log_path(&self) -> PathBuf {
        self.dir.join("bot_audit.jsonl")
    }

    #[must_use]
    pub fn patches_dir(&self) -> PathBuf {
        self.dir.join("patches")
    }
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("evidence"),
            max_log_bytes: 5 * 1024 * 1024,
            hmac_key: None,
        }
    }
}

/// Test-command allowlist and runner limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// Exact commands; `allowed + " " + extra args` also passes
    pub allowlist: Vec<String>,
    /// Substituted for any command outside the allowlist
    pub default_command: String,
    pub timeout_secs: u64,
    /// Bytes of combined stdout+stderr kept from the end
    pub output_tail_bytes: usize,
}

impl TestConfig {
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            allowlist: vec![
                "cargo test".to_string(),
                "cargo test -q".to_string(),
                "cargo test --workspace".to_string(),
                "cargo test --all".to_string(),
                "cargo nextest run".to_string(),
            ],
            default_command: "cargo test".to_string(),
            timeout_secs: 60,
            output_tail_bytes: 500,
        }
    }
}

/// Bounds on repository context handed to the patch provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub max_tree_entries: usize,
    pub max_excerpt_lines: usize,
    /// Repository-relative files excerpted for the provider
    pub excerpt_files: Vec<String>,
    /// Lines containing any of these markers (case-insensitive) are redacted
    pub secret_markers: Vec<String>,
    /// Directory names skipped while listing the tree
    pub skip_dirs: Vec<String>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tree_entries: 100,
            max_excerpt_lines: 80,
            excerpt_files: vec![
                "Cargo.toml".to_string(),
                "README.md".to_string(),
                "src/lib.rs".to_string(),
                "src/main.rs".to_string(),
            ],
            secret_markers: vec![
                "token".to_string(),
                "secret".to_string(),
                "password".to_string(),
                "api_key".to_string(),
                "api-key".to_string(),
                "apikey".to_string(),
            ],
            skip_dirs: vec![
                "target".to_string(),
                "node_modules".to_string(),
                "evidence".to_string(),
                "__pycache__".to_string(),
                "venv".to_string(),
            ],
        }
    }
}

/// Seconds as a `TimeDelta`, saturating where chrono cannot represent it
fn seconds_delta(secs: u64) -> chrono::TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::TimeDelta::try_seconds)
        .unwrap_or(chrono::TimeDelta::MAX)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let config = WardenConfig::default();
        assert_eq!(config.governance.arm_timeout_secs, 300);
        assert_eq!(config.rate_limit.max_commands, 5);
        assert_eq!(config.rate_limit.window_secs, 10);
        assert_eq!(config.audit.max_message_bytes, 2048);
        assert_eq!(config.audit.max_command_chars, 500);
        assert_eq!(config.patch.max_diff_bytes, 200 * 1024);
        assert_eq!(config.context.max_tree_entries, 100);
        assert_eq!(config.context.max_excerpt_lines, 80);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = WardenConfig::from_toml_str(
            r#"
            [governance]
            arm_timeout_secs = 60

            [rate_limit]
            max_commands = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.governance.arm_timeout_secs, 60);
        assert!(!config.governance.kill_switch);
        assert_eq!(config.rate_limit.max_commands, 2);
        assert_eq!(config.rate_limit.window_secs, 10);
    }

    #[test]
    fn env_overlay_recognises_legacy_names() {
        let mut config = WardenConfig::default();
        config
            .apply_env([
                ("IDLE_MODE", "1"),
                ("MUD_BOT_ALLOW_WHEN_ACTIVE", "true"),
                ("WARDEN_ARM_TIMEOUT_SECS", "42"),
                ("WARDEN_EVIDENCE_HMAC_KEY", "k"),
                ("UNRELATED", "x"),
            ])
            .unwrap();
        assert!(config.governance.kill_switch);
        assert!(config.governance.allow_automated_when_active);
        assert_eq!(config.governance.arm_timeout_secs, 42);
        assert_eq!(config.evidence.hmac_key.as_deref(), Some("k"));
    }

    #[test]
    fn env_overlay_rejects_bad_number() {
        let mut config = WardenConfig::default();
        let err = config
            .apply_env([("WARDEN_ARM_TIMEOUT_SECS", "soon")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn validate_rejects_zero_window() {
        let config = WardenConfig::default().with_rate_limit(5, 0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "rate_limit.window_secs", .. })
        ));
    }

    #[test]
    fn validate_bounds_time_windows() {
        let huge = WardenConfig::default().with_arm_timeout_secs(u64::MAX);
        assert!(matches!(
            huge.validate(),
            Err(ConfigError::Invalid { field: "governance.arm_timeout_secs", .. })
        ));
        let wide = WardenConfig::default().with_rate_limit(5, MAX_WINDOW_SECS + 1);
        assert!(matches!(
            wide.validate(),
            Err(ConfigError::Invalid { field: "rate_limit.window_secs", .. })
        ));
        assert!(WardenConfig::default()
            .with_arm_timeout_secs(MAX_WINDOW_SECS)
            .validate()
            .is_ok());
    }

    #[test]
    fn oversized_windows_saturate_instead_of_panicking() {
        let governance = GovernanceConfig {
            arm_timeout_secs: u64::MAX,
            ..GovernanceConfig::default()
        };
        assert_eq!(governance.arm_timeout(), chrono::TimeDelta::MAX);
        let rate = RateLimitConfig {
            max_commands: 1,
            window_secs: i64::MAX as u64,
        };
        assert_eq!(rate.window(), chrono::TimeDelta::MAX);
        assert_eq!(
            RateLimitConfig::default().window(),
            chrono::TimeDelta::seconds(10)
        );
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.toml");
        std::fs::write(&path, "[patch]\nmax_diff_bytes = 1024\n").unwrap();
        let config = WardenConfig::load(Some(&path)).unwrap();
        assert_eq!(config.patch.max_diff_bytes, 1024);
    }

    #[test]
    fn load_missing_file_is_error() {
        let err = WardenConfig::load(Some(Path::new("/nonexistent/warden.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
