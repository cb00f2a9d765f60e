//! Error handling for the CGI host

use std::fmt;
use std::io;

/// A Result for internal operations.
pub type Result<T> = ::std::result::Result<T, Error>;

/// All errors which might arise before a handler gets to run
///
/// Faults inside a handler are not errors in this sense; they end up in a
/// `supervisor::InvocationResult`.
#[derive(Debug)]
pub enum Error {
    Parse(httparse::Error),
    Io(io::Error),
    RequestIncomplete,
    HeadTooLarge,
    PathNotInOriginForm,
    IllegalPercentEncoding,
    PermissionDenied,
    NotFound,
    /// The client sent fewer body bytes than it declared
    TruncatedBody { declared: usize, received: usize },
    /// The declared body length was negative
    InvalidLength(String),
    BodyTooLarge { declared: usize, limit: usize }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Parse(ref e) => write!(f, "malformed request: {}", e),
            Error::Io(ref e) => write!(f, "I/O error: {}", e),
            Error::RequestIncomplete =>
                write!(f, "connection closed before the request head ended"),
            Error::HeadTooLarge => write!(f, "request head is too large"),
            Error::PathNotInOriginForm =>
                write!(f, "request target is not in origin form"),
            Error::IllegalPercentEncoding =>
                write!(f, "illegal percent-encoding in request path"),
            Error::PermissionDenied => write!(f, "permission denied"),
            Error::NotFound => write!(f, "no such script"),
            Error::TruncatedBody { declared, received } =>
                write!(f, "request body truncated: declared {} bytes, got {}",
                       declared, received),
            Error::InvalidLength(ref raw) =>
                write!(f, "invalid Content-Length {:?}", raw),
            Error::BodyTooLarge { declared, limit } =>
                write!(f, "request body of {} bytes exceeds the limit of {}",
                       declared, limit)
        }
    }
}

impl ::std::error::Error for Error {}

impl From<httparse::Error> for Error {
    fn from(e: httparse::Error) -> Error {
        Error::Parse(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}
