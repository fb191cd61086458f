//! Unified error type.

use thiserror::Error;

use crate::request::BodyError;

/// A boxed, thread-safe error, the currency of handler and middleware failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by fcodex's fallible operations.
///
/// Application-level outcomes (404, 401, 400, etc.) are expressed as HTTP
/// responses, not as `Error`s. This type surfaces infrastructure failures
/// (binding a port, accepting a connection) and the faults the dispatcher
/// catches at a tier boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address: {0}")]
    Addr(#[from] std::net::AddrParseError),

    #[error("unsupported method `{0}`")]
    UnsupportedMethod(String),

    #[error(transparent)]
    Body(#[from] BodyError),

    #[error("handler failed: {0}")]
    Handler(BoxError),

    #[error("handler panicked: {0}")]
    Panic(String),
}
