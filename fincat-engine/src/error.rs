//! Engine error types

use thiserror::Error;

/// Errors from the classifier transport
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// HTTP status outside 2xx
    #[error("classifier endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection, DNS, or timeout failure before a status arrived
    #[error("classifier request failed: {0}")]
    Network(String),

    /// Response body did not carry extractable output text
    #[error("classifier response missing output text: {0}")]
    MissingOutput(String),
}

impl ClassifierError {
    /// Transient failures are retried; everything else fails the page
    ///
    /// Transient means HTTP 429, any 5xx, or a network-level failure.
    /// 4xx other than 429 indicates a request we built wrong, which a
    /// retry cannot fix.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Network(_) => true,
            Self::MissingOutput(_) => false,
        }
    }
}

/// Errors raised while validating a model response against its page
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("response is not valid JSON: {0}")]
    Malformed(String),

    #[error("expected {expected} decisions, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("idx {idx} appears more than once")]
    DuplicateIdx { idx: i64 },

    #[error("idx {idx} outside 1..={expected}")]
    IdxOutOfRange { idx: i64, expected: usize },

    #[error("decision {index}: score {score} outside [0, 1]")]
    ScoreOutOfRange { index: usize, score: f64 },

    #[error("decision {index}: category {category:?} not in taxonomy and no fallback code present")]
    UnknownCategory { index: usize, category: String },

    #[error("decision {index}: missing required field {field}")]
    MissingField { index: usize, field: &'static str },
}

/// Top-level engine error
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input rejected before any model work started
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Stop-on-error run aborted by a page failure
    #[error("page {page_index} failed: {reason}")]
    PageFailed { page_index: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
