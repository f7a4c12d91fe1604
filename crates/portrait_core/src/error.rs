use thiserror::Error;

/// Load- and configuration-time failures of a study.
///
/// These are the only failures surfaced to the caller; numeric trouble during
/// integration is absorbed by the tracer (best-effort steps, early stop).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StudyError {
    /// The table stream violates its grammar (arity, keyword, number or count).
    #[error("malformed table data at line {line}: {message}")]
    MalformedTable { line: usize, message: String },

    /// A region sign vector does not have one entry per separating curve.
    #[error("region sign vector has {found} entries but {expected} separating curves are registered")]
    RegionConfigMismatch { expected: usize, found: usize },

    /// A sign entry outside {-1, 0, 1}.
    #[error("invalid sign entry {0}; expected -1, 0 or 1")]
    InvalidSign(i64),

    /// A polynomial term with a negative exponent.
    #[error("negative exponent {0} in polynomial term")]
    NegativeExponent(i64),

    /// A polynomial term whose exponent does not fit the evaluator.
    #[error("exponent {0} is too large")]
    ExponentTooLarge(i64),

    #[error("vector field index {index} out of range ({count} fields loaded)")]
    UnknownVectorField { index: usize, count: usize },

    #[error("curve index {index} out of range ({count} curves loaded)")]
    UnknownCurve { index: usize, count: usize },
}

impl StudyError {
    pub(crate) fn malformed(line: usize, message: impl Into<String>) -> Self {
        StudyError::MalformedTable {
            line,
            message: message.into(),
        }
    }
}
