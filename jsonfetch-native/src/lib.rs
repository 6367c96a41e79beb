mod error;
#[cfg(all(feature = "ureq-client", not(feature = "rayon")))]
mod thread_pool;
mod transport;

pub use error::{Error, Result};

#[cfg(feature = "reqwest-client")]
pub use transport::ReqwestTransport;
#[cfg(feature = "ureq-client")]
pub use transport::UreqTransport;

// Re-export the adapter surface so most users need only this crate
pub use jsonfetch_core::{
    fetch_json, set_default_parser, FetchAdapter, FetchError, FetchState, HttpTransport,
    JsonFetch, JsonParser, Method, ParseError, ParserRegistry, Request, Response, ResponseHead,
    SerdeJsonParser, TransportError, Value,
};
