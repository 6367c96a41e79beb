use thiserror::Error;

use jsonfetch_core::TransportError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP {method} {url} failed: {reason}")]
    Http {
        method: String,
        url: String,
        reason: String,
    },
    #[error("HTTP request returned error status {status}")]
    Status { status: u16, body: Vec<u8> },
    #[error("failed to read response body: {0}")]
    ResponseBody(String),
    #[error("no async runtime available: {0}")]
    Runtime(String),
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for TransportError {
    fn from(e: Error) -> Self {
        match e {
            Error::Http {
                method,
                url,
                reason,
            } => TransportError::Request {
                method,
                url,
                reason,
            },
            Error::Status { status, body } => TransportError::Status { status, body },
            Error::ResponseBody(reason) => TransportError::ResponseBody(reason),
            Error::Runtime(reason) => TransportError::Unavailable(reason),
            e @ Error::ClientBuild(_) => TransportError::Backend(Box::new(e)),
        }
    }
}
