use std::{fmt, io};
use thiserror::Error;

/// Unified error type for all pcat operations.
///
/// Every failure is raised synchronously on the calling rank only. Errors are never
/// forwarded to the other ranks of a run, so a caller that is about to enter a
/// collective operation after a local failure must treat that failure as fatal for
/// the whole run instead of catching it and continuing.
///
/// # Error Categories
///
/// - **Column lookup** ([`Error::UnknownColumn`], [`Error::ColumnNotFound`])
/// - **Size and shape** ([`Error::SizeRequired`], [`Error::LengthMismatch`])
/// - **Typing and indexing** ([`Error::TypeMismatch`], [`Error::InvalidSelector`])
/// - **Mesh handoff** ([`Error::InvalidWindow`], [`Error::MissingParameter`])
/// - **Read-only properties** ([`Error::ImmutableAttribute`])
/// - **Collaborators** ([`Error::Io`], [`Error::Arrow`], [`Error::Json`], [`Error::Communication`])
#[derive(Error, Debug)]
pub enum Error {
    /// One or more column names are not part of a catalog's column set
    /// (hard columns and overrides).
    ///
    /// Every invalid name of a request is listed, not only the first one.
    #[error("column(s) {names:?} not defined in this catalog; add them with `set`")]
    UnknownColumn { names: Vec<String> },

    /// The hard-column resolution walk over a catalog type (and every ancestor
    /// table merged into it) found no provider for `name`.
    #[error("unable to find column '{name}' for '{type_name}'")]
    ColumnNotFound { name: String, type_name: String },

    /// The operation needs a known local (or collective) size, but the catalog's
    /// size is still unknown.
    #[error("size is unknown; {0}")]
    SizeRequired(String),

    /// An array's leading dimension differs from the length the operation expects.
    #[error("{context}: expected length {expected}, got {actual}")]
    LengthMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// An array or value has the wrong element type, e.g. a non-boolean mask.
    #[error("{context}: expected {expected}, got {actual}")]
    TypeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    /// Indexing was attempted with an unsupported selector shape or type.
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    /// The requested interpolation window is not recognized by the gridding layer.
    #[error("invalid window '{window}'; valid window methods: {valid:?}")]
    InvalidWindow { window: String, valid: Vec<String> },

    /// A required parameter was neither passed explicitly nor found in the
    /// catalog attributes.
    #[error("missing parameter '{0}': not supplied and not defined in attrs")]
    MissingParameter(String),

    /// Attempted write to a read-only property such as `size`.
    #[error("property '{0}' is read-only")]
    ImmutableAttribute(String),

    /// I/O error reported by a persistence collaborator. Surfaced unchanged.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Arrow error raised while composing or evaluating columnar data.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// JSON encoding error, e.g. while producing fallback attribute strings.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure reported by the communication runtime during a collective call.
    ///
    /// Treated as fatal: the ranks of the run can no longer be assumed to be in
    /// lockstep.
    #[error("communication failure: {0}")]
    Communication(String),

    /// Invalid user input or API parameter.
    #[error("Invalid argument: {0}")]
    InvalidArgumentError(String),

    /// Internal error indicating a bug or unexpected state.
    #[error("An internal operation failed: {0}")]
    Internal(String),
}

impl Error {
    /// Build an [`Error::UnknownColumn`] from any collection of names.
    ///
    /// # Examples
    ///
    /// ```
    /// use pcat_result::Error;
    ///
    /// let err = Error::unknown_columns(["Mass", "Radius"]);
    /// assert!(matches!(err, Error::UnknownColumn { ref names } if names.len() == 2));
    /// ```
    pub fn unknown_columns<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        Error::UnknownColumn { names }
    }

    #[inline]
    pub fn length_mismatch(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Error::LengthMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }

    #[inline]
    pub fn type_mismatch(
        context: impl Into<String>,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        Error::TypeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Wrap any displayable collaborator failure as a fatal communication error.
    #[inline]
    pub fn communication<E: fmt::Display>(err: E) -> Self {
        Error::Communication(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_columns_are_sorted_and_listed_once() {
        let err = Error::unknown_columns(vec!["b", "a", "b"]);
        assert_eq!(
            err.to_string(),
            "column(s) [\"a\", \"b\"] not defined in this catalog; add them with `set`"
        );
    }

    #[test]
    fn length_mismatch_reports_both_lengths() {
        let err = Error::length_mismatch("setting column 'X'", 5, 2);
        assert_eq!(err.to_string(), "setting column 'X': expected length 5, got 2");
    }
}
