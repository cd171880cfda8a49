use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::*;

use tson::{Error as TsonError, ErrorKind};

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error(TsonError);

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{}", self.0)
    }
}

impl Error {
    fn status_code(&self) -> StatusCode {
        match self.0.error_kind {
            ErrorKind::Protocol | ErrorKind::UnknownType(_) | ErrorKind::NonceMismatch => {
                StatusCode::BAD_REQUEST
            }
            ErrorKind::StreamInterrupted => StatusCode::BAD_GATEWAY,
            ErrorKind::CircularReference
            | ErrorKind::UnhandledType
            | ErrorKind::Registration
            | ErrorKind::Rejected => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Serialization failures are only reported this way before the first byte of a body was sent.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        error!("Request failed with {status}: {}", self.0);
        let reason = status.canonical_reason().unwrap_or("ERROR").to_uppercase();
        (status, reason).into_response()
    }
}

impl<E> From<E> for Error
where
    E: Into<TsonError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
