// 🚨 Error Types - Everything that can abort a fixer run
// Every error here is fatal: they are deterministic properties of the input,
// so nothing is retried. "No CSV match" is NOT an error (see correlator).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FixerError {
    /// Malformed markup: tag mismatch, unparsable line, unexpected shape
    #[error("format error on line {line}: {message}")]
    Format { line: usize, message: String },

    /// A transaction field the correlator depends on could not be decoded
    #[error("invalid {field} value {value:?} in transaction #{record}")]
    InvalidField {
        record: usize,
        field: &'static str,
        value: String,
    },

    /// CSV export is missing a required column (or has an unusable row)
    #[error("schema error: {0}")]
    Schema(String),

    /// The heuristic model no longer matches the input (e.g. NAME > 32 chars)
    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl FixerError {
    pub fn format(line: usize, message: impl Into<String>) -> Self {
        FixerError::Format {
            line,
            message: message.into(),
        }
    }

    pub fn is_format(&self) -> bool {
        matches!(
            self,
            FixerError::Format { .. } | FixerError::InvalidField { .. }
        )
    }

    pub fn is_invariant(&self) -> bool {
        matches!(self, FixerError::Invariant(_))
    }

    pub fn is_schema(&self) -> bool {
        matches!(self, FixerError::Schema(_))
    }
}

pub type Result<T> = std::result::Result<T, FixerError>;
