//! Configuration errors

use std::path::PathBuf;

/// Configuration loading / validation failure
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Environment override has an unusable value
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },

    /// A limit is zero or otherwise unusable
    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
