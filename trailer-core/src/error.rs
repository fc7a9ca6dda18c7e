use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Malformed style table. Fatal, surfaced immediately, never retried.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("failed to read style table {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("failed to parse style table {path}: {source}")]
    Parse {
        source: toml::de::Error,
        path: PathBuf,
    },
    #[error("unknown style: {name}")]
    UnknownStyle { name: String },
    #[error("style {style} defines no phases")]
    EmptyPhases { style: String },
    #[error("style {style}: phase duration ratios sum to {sum:.3}, expected ~1.0")]
    RatioSum { style: String, sum: f64 },
    #[error("style {style}: phase {phase} has non-positive max_candidates")]
    InvalidMaxCandidates { style: String, phase: String },
}

pub type Result<T> = std::result::Result<T, ConfigurationError>;
