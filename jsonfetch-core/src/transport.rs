use crate::error::TransportError;
use crate::request::{Request, Response};

/// Callback through which a transport reports the outcome of one request.
pub type Completion = Box<dyn FnOnce(Result<Response, TransportError>) + Send + 'static>;

/// Minimal HTTP transport trait that can be implemented with any HTTP library.
///
/// This allows consumers to bring their own HTTP stack: ureq, reqwest, hyper,
/// platform-specific APIs (NSURLSession, fetch, etc.), or a scripted fake in
/// tests. Connection handling, TLS, redirects and timeouts all live behind
/// this trait.
///
/// # Contract
///
/// * `start` must return without waiting for the network; the exchange runs
///   on whatever execution context the transport owns.
/// * `on_complete` is called at most once, and exactly once unless the
///   returned [`InFlight`] handle was cancelled first.
/// * A response is only delivered as `Ok` when the transport considers it a
///   success; error statuses are reported as [`TransportError::Status`].
///
/// # Implementing the trait
///
/// ```ignore
/// use jsonfetch_core::{Completion, HttpTransport, InFlight, Request};
///
/// struct MyTransport { /* your HTTP client here */ }
///
/// impl HttpTransport for MyTransport {
///     fn start(&self, request: &Request, on_complete: Completion) -> Box<dyn InFlight> {
///         // Hand the request to your executor, call `on_complete` when done,
///         // and return a handle able to abort it.
///         todo!()
///     }
/// }
/// ```
pub trait HttpTransport: Send + Sync {
    /// Begin executing `request` and report its outcome through `on_complete`.
    fn start(&self, request: &Request, on_complete: Completion) -> Box<dyn InFlight>;
}

/// Handle on a request a transport is currently executing.
pub trait InFlight: Send + Sync {
    /// Ask the transport to abandon the request. A completion that races with
    /// this call may still be delivered; the adapter discards it.
    fn cancel(&self);
}
