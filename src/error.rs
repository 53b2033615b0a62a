//! # LOB Error Taxonomy
//!
//! Every public LOB operation either succeeds or fails with exactly one
//! [`LobError`] kind. Lower-level I/O failures from the store stream or the
//! spill file are caught at the handle boundary and wrapped; a raw
//! `std::io::Error` never crosses the public API on its own.
//!
//! ## Kinds
//!
//! | Kind                         | Raised when                                      |
//! |------------------------------|--------------------------------------------------|
//! | `BadPosition`                | a 1-based position argument is < 1               |
//! | `NonPositiveLength`          | a length/count argument is negative              |
//! | `PositionTooLarge`           | a position lies beyond the available data        |
//! | `PosAndLengthGreaterThanLob` | a bounded stream extends past the end            |
//! | `LengthTooLarge`             | truncate/copy length exceeds the data            |
//! | `InvalidOffset`              | a source array offset is out of bounds           |
//! | `AccessedAfterCommit`        | the long-column container was closed by a commit |
//! | `ObjectInvalid`              | the handle was freed                             |
//! | `StreamSetupFailure`         | I/O failed while building or promoting a LOB     |
//! | `Io`                         | I/O failed during a regular operation            |
//!
//! ## Severity
//!
//! The LOB layer never rolls a transaction back by itself. [`LobError::severity`]
//! tells the surrounding engine whether an error leaves the transaction in a
//! state that warrants firing the transaction-boundary callback.

use std::io;

use thiserror::Error;

use crate::storage::is_container_closed;

pub type Result<T> = std::result::Result<T, LobError>;

#[derive(Error, Debug)]
pub enum LobError {
    #[error("invalid position {position}: LOB positions start at 1")]
    BadPosition { position: i64 },

    #[error("invalid length {length}: length must not be negative")]
    NonPositiveLength { length: i64 },

    #[error("position {position} is beyond the end of the LOB")]
    PositionTooLarge { position: i64 },

    #[error("position {position} plus length {length} exceeds LOB length {lob_length}")]
    PosAndLengthGreaterThanLob {
        position: i64,
        length: i64,
        lob_length: u64,
    },

    #[error("length {requested} exceeds available length {available}")]
    LengthTooLarge { requested: i64, available: u64 },

    #[error("offset {offset} is outside the source of length {buffer_len}")]
    InvalidOffset { offset: usize, buffer_len: usize },

    #[error("LOB accessed after its transaction was committed")]
    AccessedAfterCommit,

    #[error("LOB has been freed and is no longer valid")]
    ObjectInvalid,

    #[error("failed to set up LOB stream: {0}")]
    StreamSetupFailure(#[source] io::Error),

    #[error("LOB I/O error: {0}")]
    Io(#[source] io::Error),

    #[error("search pattern is null")]
    NullPatternOrSearchString,

    #[error("unable to read search pattern")]
    UnableToReadPattern,

    #[error("CLOB content is not valid UTF-8 at byte {byte_offset}")]
    InvalidCharacterData { byte_offset: u64 },

    #[error("no free LOB locator available")]
    LocatorsExhausted,

    #[error("connection is closed")]
    ConnectionClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// The failed call had no effect beyond itself.
    Statement,
    /// The transaction's view of stored data can no longer be trusted.
    Transaction,
}

impl LobError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            LobError::AccessedAfterCommit
            | LobError::StreamSetupFailure(_)
            | LobError::Io(_) => ErrorSeverity::Transaction,
            _ => ErrorSeverity::Statement,
        }
    }

    /// Translates a failure from the spill file or store stream, recognizing
    /// closed long-column containers.
    pub(crate) fn from_io(err: io::Error) -> Self {
        if is_container_closed(&err) {
            return LobError::AccessedAfterCommit;
        }
        match unwrap_lob_error(err) {
            Ok(lob) => lob,
            Err(err) => LobError::Io(err),
        }
    }

    /// Like [`LobError::from_io`] but for failures while constructing or
    /// promoting a LOB.
    pub(crate) fn setup(err: io::Error) -> Self {
        if is_container_closed(&err) {
            return LobError::AccessedAfterCommit;
        }
        match unwrap_lob_error(err) {
            Ok(lob) => lob,
            Err(err) => LobError::StreamSetupFailure(err),
        }
    }

    pub(crate) fn into_io(self) -> io::Error {
        match self {
            LobError::Io(err) => err,
            other => io::Error::other(other),
        }
    }
}

impl From<io::Error> for LobError {
    fn from(err: io::Error) -> Self {
        LobError::from_io(err)
    }
}

fn unwrap_lob_error(err: io::Error) -> std::result::Result<LobError, io::Error> {
    if err.get_ref().is_some_and(|inner| inner.is::<LobError>()) {
        if let Some(inner) = err.into_inner() {
            if let Ok(lob) = inner.downcast::<LobError>() {
                return Ok(*lob);
            }
        }
        return Err(io::Error::other("LOB error lost while unwrapping"));
    }
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::container_closed_error;

    #[test]
    fn test_container_closed_maps_to_accessed_after_commit() {
        let err = LobError::from_io(container_closed_error());
        assert!(matches!(err, LobError::AccessedAfterCommit));

        let err = LobError::setup(container_closed_error());
        assert!(matches!(err, LobError::AccessedAfterCommit));
    }

    #[test]
    fn test_wrapped_lob_error_roundtrips_through_io() {
        let io_err = LobError::ObjectInvalid.into_io();
        assert!(matches!(LobError::from(io_err), LobError::ObjectInvalid));
    }

    #[test]
    fn test_plain_io_error_is_wrapped() {
        let err = LobError::from_io(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert!(matches!(err, LobError::Io(_)));
        assert_eq!(err.severity(), ErrorSeverity::Transaction);

        let err = LobError::setup(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert!(matches!(err, LobError::StreamSetupFailure(_)));
    }

    #[test]
    fn test_argument_errors_are_statement_severity() {
        assert_eq!(
            LobError::BadPosition { position: 0 }.severity(),
            ErrorSeverity::Statement
        );
        assert_eq!(LobError::ObjectInvalid.severity(), ErrorSeverity::Statement);
    }
}
