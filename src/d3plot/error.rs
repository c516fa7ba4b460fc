//! Custom error types for the d3plot-reader crate.

use thiserror::Error;

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum D3plotError {
    /// An error originating from I/O operations.
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    /// The file uses a format feature this reader does not handle
    /// (double precision, SPH, ALE, thick shells, temperatures, ...).
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// The file is structurally invalid: a section sentinel is missing,
    /// the numbering-block pointer arithmetic is inconsistent, or a
    /// section type marker has an unexpected value.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// A declared count of items does not match the actual number found.
    #[error("Count mismatch for {what}: expected {expected}, but found {found}")]
    CountMismatch {
        what: &'static str,
        expected: i64,
        found: i64,
    },

    /// A state variable was requested that the file does not contain.
    #[error("Unable to read {0}, since there are none in the file")]
    VariableUnavailable(String),

    /// A request string did not match any known variable keyword, or a
    /// history request was malformed.
    #[error("Unknown variable request: {0}")]
    UnknownVariable(String),

    /// `read_states` was re-entered with an empty variable list.
    #[error("The list of state variables to load is empty")]
    EmptyRequest,

    /// A word read went past the end of the current segment.
    #[error("Word read at {word} is past the end of the current segment")]
    Truncated { word: usize },
}

/// A convenience `Result` type alias using the crate's `D3plotError` type.
pub type Result<T> = std::result::Result<T, D3plotError>;
