//! Configuration error types.

use thiserror::Error;

/// Errors raised while loading or compiling collector configuration.
/// All of these are fatal at startup; no fetch begins after one.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(String),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid rule pattern `{pattern}`: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("rule `{pattern}` names unrecognized statistic `{stat}`")]
    UnknownStat { pattern: String, stat: String },

    #[error("rule `{pattern}` requests no statistics")]
    EmptyStats { pattern: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
