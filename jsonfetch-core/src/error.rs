use thiserror::Error;

/// Errors reported synchronously to the caller, before or instead of a
/// request lifecycle.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported URL scheme '{scheme}' in '{url}', expected http or https")]
    UnsupportedScheme { url: String, scheme: String },
    #[error("fetch already started, an adapter runs a single request")]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, Error>;

/// The HTTP exchange itself failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP {method} {url} failed: {reason}")]
    Request {
        method: String,
        url: String,
        reason: String,
    },
    #[error("HTTP request returned error status {status}")]
    Status { status: u16, body: Vec<u8> },
    #[error("failed to read response body: {0}")]
    ResponseBody(String),
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    // Pass-through for transport implementations living in other crates
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    /// Status code of a non-success response, if that is what failed.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The parser could not turn the response body into a JSON value.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("parser rejected document: {0}")]
    Rejected(String),
    #[error(transparent)]
    Parser(Box<dyn std::error::Error + Send + Sync>),
}

/// Terminal failure of a fetch, delivered once through the failure callback.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("no JSON parser configured for this fetch and no default parser set")]
    UnconfiguredParser,
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl FetchError {
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport(_))
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, FetchError::Parse(_))
    }
}
