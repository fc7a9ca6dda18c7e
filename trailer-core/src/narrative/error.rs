use thiserror::Error;

use crate::error::ConfigurationError;

/// Structural problems in an input record. Fatal for that record's
/// ingestion; the caller decides whether to drop it or abort the run.
#[derive(Debug, Error)]
pub enum InvalidCandidateError {
    #[error("candidate {id}: missing start or end time")]
    MissingTimeRange { id: String },
    #[error("candidate {id}: end time {end} must be greater than start time {start}")]
    EmptyTimeRange { id: String, start: f64, end: f64 },
    #[error("candidate {id}: non-finite time value")]
    NonFiniteTime { id: String },
}

#[derive(Debug, Error)]
pub enum NarrativeError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("invalid candidate: {0}")]
    InvalidCandidate(#[from] InvalidCandidateError),
}

pub type NarrativeResult<T> = std::result::Result<T, NarrativeError>;
