//! Error types for the `tson` crate.
//!
//! Follows a root `Error` struct holding an `ErrorKind` and an optional source for chaining.
//! `Error` is `Clone` because a single failure is fanned out to every pending placeholder and
//! stored inside shared promise results.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::value::Value;

pub type Result<T> = core::result::Result<T, Error>;

/// Top-level error type for the `tson` crate.
#[derive(Debug, Clone)]
pub struct Error {
    pub source: Option<Arc<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Categories of errors that can occur while serializing, streaming or reconstructing values.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// A value was reached again while it was still being walked.
    CircularReference,
    /// The transport or a source ended or failed before the stream was closed.
    StreamInterrupted,
    /// A tuple named a handler key that is not registered.
    UnknownType(String),
    /// A tuple carried a nonce that does not belong to this stream.
    NonceMismatch,
    /// The handler list is inconsistent (duplicate primitive tag or key).
    Registration,
    /// A value has no JSON form and no handler claims it.
    UnhandledType,
    /// Malformed frames, JSON or handler payloads.
    Protocol,
    /// A promise rejected or an async iterable failed; the reason is the error source.
    Rejected,
}

/// The reason a promise rejected or an async iterable failed.
#[derive(Debug)]
pub struct Rejection(pub Value);

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "rejected with {:?}", self.0)
    }
}

impl StdError for Rejection {}

impl Error {
    /// Returns the rejection reason when this error is a rejected promise or iterable.
    pub fn rejection(&self) -> Option<&Value> {
        self.source
            .as_deref()
            .and_then(|source| source.downcast_ref::<Rejection>())
            .map(|rejection| &rejection.0)
    }

    pub fn is_interrupted(&self) -> bool {
        self.error_kind == ErrorKind::StreamInterrupted
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::CircularReference => write!(f, "Circular reference detected")?,
            ErrorKind::StreamInterrupted => write!(f, "Stream interrupted")?,
            ErrorKind::UnknownType(key) => write!(f, "No handler registered for key {key:?}")?,
            ErrorKind::NonceMismatch => write!(f, "Nonce mismatch")?,
            ErrorKind::Registration => write!(f, "Invalid handler registration")?,
            ErrorKind::UnhandledType => write!(f, "Value cannot be serialized")?,
            ErrorKind::Protocol => write!(f, "Protocol error")?,
            ErrorKind::Rejected => write!(f, "Rejected")?,
        }
        match &self.source {
            Some(source) => write!(f, ": {source}"),
            None => Ok(()),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Arc::new(err)),
            error_kind: ErrorKind::Protocol,
        }
    }
}

fn with_message(error_kind: ErrorKind, message: &str) -> Error {
    let source: Box<dyn StdError + Send + Sync> = message.to_string().into();
    Error {
        source: Some(Arc::from(source)),
        error_kind,
    }
}

/// Helper function to create circular reference errors.
pub fn circular_reference(path: &str) -> Error {
    with_message(ErrorKind::CircularReference, path)
}

/// Helper function to create stream interrupted errors.
pub fn stream_interrupted(message: &str) -> Error {
    with_message(ErrorKind::StreamInterrupted, message)
}

/// Wraps a transport failure as a stream interruption.
pub fn stream_interrupted_by(source: Box<dyn StdError + Send + Sync>) -> Error {
    Error {
        source: Some(Arc::from(source)),
        error_kind: ErrorKind::StreamInterrupted,
    }
}

pub fn unknown_type(key: &str) -> Error {
    Error {
        source: None,
        error_kind: ErrorKind::UnknownType(key.to_string()),
    }
}

pub fn nonce_mismatch(expected: &str, found: &str) -> Error {
    with_message(
        ErrorKind::NonceMismatch,
        &format!("expected {expected:?}, found {found:?}"),
    )
}

pub fn registration(message: &str) -> Error {
    with_message(ErrorKind::Registration, message)
}

pub fn unhandled_type(message: &str) -> Error {
    with_message(ErrorKind::UnhandledType, message)
}

pub fn protocol(message: &str) -> Error {
    with_message(ErrorKind::Protocol, message)
}

/// Helper function to create a rejection carrying `reason`.
pub fn rejected(reason: Value) -> Error {
    Error {
        source: Some(Arc::new(Rejection(reason))),
        error_kind: ErrorKind::Rejected,
    }
}
