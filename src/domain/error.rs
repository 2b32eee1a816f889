//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for fundrank.
#[derive(Debug, thiserror::Error)]
pub enum FundrankError {
    #[error("insufficient history for {instrument}: have {have}, need {need}")]
    InsufficientHistory {
        instrument: String,
        have: usize,
        need: usize,
    },

    #[error("stale data for {instrument}: last price {last} over {window_days} days before {as_of}")]
    StaleData {
        instrument: String,
        last: NaiveDate,
        as_of: NaiveDate,
        window_days: i64,
    },

    #[error("scope {scope} has {members} members, minimum is {minimum}")]
    InvalidUniverse {
        scope: String,
        members: usize,
        minimum: usize,
    },

    #[error("temporal violation: {reason}")]
    TemporalViolation { reason: String },

    #[error("price source unavailable after {attempts} attempt(s): {reason}")]
    SourceUnavailable { reason: String, attempts: u32 },

    #[error("unknown instrument {instrument}")]
    NotFound { instrument: String },

    #[error("scores span more than one date: {first} and {other}")]
    MixedScoreDates { first: NaiveDate, other: NaiveDate },

    #[error("invalid score for {instrument}: {reason}")]
    InvalidScore { instrument: String, reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FundrankError {
    pub fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        FundrankError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors that only affect a single instrument and must not abort a batch.
    pub fn is_per_instrument(&self) -> bool {
        matches!(
            self,
            FundrankError::InsufficientHistory { .. }
                | FundrankError::StaleData { .. }
                | FundrankError::NotFound { .. }
                | FundrankError::SourceUnavailable { .. }
        )
    }
}

impl From<&FundrankError> for std::process::ExitCode {
    fn from(err: &FundrankError) -> Self {
        let code: u8 = match err {
            FundrankError::Io(_) | FundrankError::Serialization(_) => 1,
            FundrankError::ConfigParse { .. }
            | FundrankError::ConfigMissing { .. }
            | FundrankError::ConfigInvalid { .. } => 2,
            FundrankError::Database { .. } | FundrankError::DatabaseQuery { .. } => 3,
            FundrankError::SourceUnavailable { .. } => 4,
            FundrankError::InsufficientHistory { .. }
            | FundrankError::StaleData { .. }
            | FundrankError::NotFound { .. }
            | FundrankError::InvalidUniverse { .. } => 5,
            FundrankError::TemporalViolation { .. }
            | FundrankError::MixedScoreDates { .. }
            | FundrankError::InvalidScore { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
