mod adapter;
pub mod error;
mod future;
mod parser;
mod request;
mod transport;

pub use serde_json::{self, Value};
pub use url::{self, Url};

pub use adapter::{FetchAdapter, FetchState, OnFailure, OnSuccess};
pub use error::{Error, FetchError, ParseError, Result, TransportError};
pub use future::{fetch_json, JsonFetch};
pub use parser::{set_default_parser, JsonParser, ParserRegistry, SerdeJsonParser};
pub use request::{Method, Request, Response, ResponseHead};
pub use transport::{Completion, HttpTransport, InFlight};
