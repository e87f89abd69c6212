//! Crate-level error type.
//!
//! Every public operation returns [`Result<T>`](Result) with a single
//! [`Error`] kind. Lower layers keep their own error enums (for example
//! [`EncodingError`](crate::encoding::EncodingError) and the store's
//! [`StoreError`](crate::store::StoreError)) and are mapped into these
//! kinds at the API boundary, so callers never need to match on more than
//! one error type.

use std::io;

use thiserror::Error;

use crate::db::Mode;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by table, index and codec operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed input: bad column specification, out-of-range column
    /// position, malformed key prefix, unparseable text value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A scalar lies outside the declared range of its column.
    #[error("value {value} out of range [{min}, {max}] for column '{column}'")]
    ValueOutOfRange {
        /// Column that rejected the value.
        column: String,
        /// Offending value, formatted.
        value: String,
        /// Inclusive lower bound, formatted.
        min: String,
        /// Inclusive upper bound, formatted.
        max: String,
    },

    /// A column received the wrong number of elements.
    #[error("column '{column}' expects {expected} element(s), got {actual}")]
    CountMismatch {
        /// Column that rejected the value.
        column: String,
        /// Expected element count (`"0..=N"` for variable columns).
        expected: String,
        /// Number of elements supplied.
        actual: usize,
    },

    /// The encoded row would exceed [`MAX_ROW_SIZE`](crate::schema::MAX_ROW_SIZE).
    #[error("encoded row size {size} exceeds the maximum of {max} bytes")]
    RowTooLarge {
        /// Size the row would have occupied.
        size: usize,
        /// The engine limit.
        max: usize,
    },

    /// A row id at or beyond `num_rows`.
    #[error("row id {row_id} out of range (table has {num_rows} rows)")]
    OutOfRange {
        /// Requested row id.
        row_id: u64,
        /// Number of rows in the table.
        num_rows: u64,
    },

    /// A table or index is absent on read-open, or a prefix probe matched
    /// no key.
    #[error("not found: {0}")]
    NotFound(String),

    /// `open` called on an already open database.
    #[error("database is already open")]
    AlreadyOpen,

    /// An operation that requires an open database was called on a closed
    /// one.
    #[error("database is not open")]
    NotOpen,

    /// An operation valid only in the other open mode.
    #[error("operation requires the database to be open in {required} mode")]
    WrongMode {
        /// Mode the operation needs.
        required: Mode,
    },

    /// An iterator was advanced after its database (or a parent table)
    /// was closed.
    #[error("operation on closed database")]
    OperationOnClosed,

    /// Underlying file-system or store failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A metadata sidecar failed to parse or carries an unsupported
    /// version.
    #[error("corrupt metadata: {0}")]
    CorruptMetadata(String),
}

impl Error {
    /// Shorthand for [`Error::InvalidArgument`].
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}
