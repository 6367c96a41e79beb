use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;

use serde_json::Value;

use crate::error::{Error, FetchError, ParseError, Result, TransportError};
use crate::parser::{JsonParser, ParserRegistry};
use crate::request::{Method, Request, Response, ResponseHead};
use crate::transport::{HttpTransport, InFlight};

type Outcome = std::result::Result<Response, TransportError>;

pub type OnSuccess = Box<dyn FnOnce(Arc<Value>) + Send + 'static>;
pub type OnFailure = Box<dyn FnOnce(Arc<FetchError>) + Send + 'static>;

/// Where an adapter is in its single request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchState {
    Idle,
    InFlight,
    Succeeded,
    Failed,
    Cancelled,
}

impl FetchState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FetchState::Succeeded | FetchState::Failed | FetchState::Cancelled
        )
    }
}

struct Callbacks {
    on_success: OnSuccess,
    on_failure: OnFailure,
}

struct Lifecycle {
    state: FetchState,
    // set while `FetchAdapter::start` is calling into the transport
    starting: bool,
    deferred: Option<Outcome>,
    callbacks: Option<Callbacks>,
    parser: Option<Arc<dyn JsonParser>>,
    in_flight: Option<Box<dyn InFlight>>,
    head: Option<ResponseHead>,
    data: Option<Arc<Value>>,
    error: Option<Arc<FetchError>>,
}

/// State reachable from the transport's completion. The transport only ever
/// holds a `Weak` to it; the adapter is the sole owner.
struct Shared {
    registry: Arc<ParserRegistry>,
    lifecycle: Mutex<Lifecycle>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|poisoned| {
            log::warn!("fetch lifecycle lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Entry point for the transport's outcome. An outcome produced while
    /// `start` is still running is parked and handed over once it returns.
    fn arrive(&self, outcome: Outcome) {
        {
            let mut lifecycle = self.lock();
            if lifecycle.starting {
                log::debug!("transport completed inside start, deferring delivery");
                lifecycle.deferred = Some(outcome);
                return;
            }
        }
        self.complete(outcome);
    }

    fn complete(&self, outcome: Outcome) {
        let step = {
            let mut lifecycle = self.lock();
            if lifecycle.state != FetchState::InFlight {
                log::debug!(
                    "discarding transport completion for {:?} fetch",
                    lifecycle.state
                );
                return;
            }
            lifecycle.in_flight = None;

            match outcome {
                Err(err) => Err(FetchError::Transport(err)),
                Ok(response) => {
                    let (head, body) = response.into_parts();
                    log::debug!("response status {} ({} bytes)", head.status, body.len());
                    lifecycle.head = Some(head);

                    // The parser is fixed here, once, for this fetch.
                    let parser = match &lifecycle.parser {
                        Some(parser) => {
                            log::trace!("using instance parser");
                            Some(parser.clone())
                        }
                        None => {
                            log::trace!("using default parser");
                            self.registry.default_parser()
                        }
                    };
                    parser
                        .map(|parser| (parser, body))
                        .ok_or(FetchError::UnconfiguredParser)
                }
            }
        };

        let result = step.and_then(|(parser, body)| run_parser(parser.as_ref(), &body));
        self.finish(result);
    }

    fn finish(&self, result: std::result::Result<Value, FetchError>) {
        let mut lifecycle = self.lock();
        if lifecycle.state != FetchState::InFlight {
            log::debug!("fetch cancelled while parsing, discarding outcome");
            return;
        }
        let Some(callbacks) = lifecycle.callbacks.take() else {
            return;
        };

        match result {
            Ok(value) => {
                let value = Arc::new(value);
                lifecycle.state = FetchState::Succeeded;
                lifecycle.data = Some(value.clone());
                drop(lifecycle);
                (callbacks.on_success)(value);
            }
            Err(error) => {
                log::warn!("fetch failed: {}", error);
                let error = Arc::new(error);
                lifecycle.state = FetchState::Failed;
                lifecycle.error = Some(error.clone());
                drop(lifecycle);
                (callbacks.on_failure)(error);
            }
        }
    }
}

fn run_parser(parser: &dyn JsonParser, body: &[u8]) -> std::result::Result<Value, FetchError> {
    match panic::catch_unwind(AssertUnwindSafe(|| parser.parse(body))) {
        Ok(parsed) => parsed.map_err(FetchError::Parse),
        Err(_) => Err(FetchError::Parse(ParseError::Rejected(
            "parser panicked".to_string(),
        ))),
    }
}

/// Delivers the transport's outcome to the adapter exactly once. If the
/// transport drops it without calling, the fetch fails instead of hanging.
struct CompletionGuard {
    shared: Option<Weak<Shared>>,
}

impl CompletionGuard {
    fn deliver(mut self, outcome: Outcome) {
        match self.shared.take().and_then(|weak| weak.upgrade()) {
            Some(shared) => shared.arrive(outcome),
            None => log::debug!("fetch adapter released before completion, discarding outcome"),
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take().and_then(|weak| weak.upgrade()) {
            shared.arrive(Err(TransportError::Unavailable(
                "transport dropped the request without completing it".to_string(),
            )));
        }
    }
}

/// Hand an outcome the transport produced synchronously to a fresh thread, so
/// the callback still runs after `start` has returned to its caller.
fn deliver_later(shared: Weak<Shared>, outcome: Outcome) {
    let slot = Arc::new(Mutex::new(Some(outcome)));
    let pending = slot.clone();
    let complete = move |slot: &Mutex<Option<Outcome>>| {
        let outcome = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let (Some(outcome), Some(shared)) = (outcome, shared.upgrade()) {
            shared.complete(outcome);
        }
    };
    let fallback = complete.clone();

    let spawned = thread::Builder::new()
        .name("jsonfetch-deliver".to_string())
        .spawn(move || complete(&*pending));
    if let Err(e) = spawned {
        log::warn!("could not spawn delivery thread, completing inline: {}", e);
        fallback(&*slot);
    }
}

/// Runs one HTTP request, parses the body as JSON and reports the outcome to
/// exactly one of two callbacks.
///
/// The adapter does not start on construction; call [`FetchAdapter::start`].
/// Callbacks run on the transport's completion context, after `start` has
/// returned. A transport that completes before its own `start` returns has
/// its outcome delivered from a short-lived thread instead. Keep the adapter alive until then: releasing it cancels the
/// request and no callback fires.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use jsonfetch_core::{FetchAdapter, SerdeJsonParser};
///
/// jsonfetch_core::set_default_parser(SerdeJsonParser);
///
/// let fetch = FetchAdapter::from_url(
///     "https://api.example.com/items",
///     transport,
///     |items| println!("got {}", items),
///     |err| eprintln!("fetch failed: {}", err),
/// )?;
/// fetch.start()?;
/// ```
pub struct FetchAdapter {
    request: Request,
    transport: Arc<dyn HttpTransport>,
    shared: Arc<Shared>,
}

impl FetchAdapter {
    /// Create an adapter resolving its default parser from the global
    /// [`ParserRegistry`].
    pub fn new<S, F>(
        request: Request,
        transport: Arc<dyn HttpTransport>,
        on_success: S,
        on_failure: F,
    ) -> Self
    where
        S: FnOnce(Arc<Value>) + Send + 'static,
        F: FnOnce(Arc<FetchError>) + Send + 'static,
    {
        Self::with_registry(
            request,
            transport,
            ParserRegistry::global(),
            on_success,
            on_failure,
        )
    }

    /// Create an adapter resolving its default parser from `registry`.
    pub fn with_registry<S, F>(
        request: Request,
        transport: Arc<dyn HttpTransport>,
        registry: Arc<ParserRegistry>,
        on_success: S,
        on_failure: F,
    ) -> Self
    where
        S: FnOnce(Arc<Value>) + Send + 'static,
        F: FnOnce(Arc<FetchError>) + Send + 'static,
    {
        FetchAdapter {
            request,
            transport,
            shared: Arc::new(Shared {
                registry,
                lifecycle: Mutex::new(Lifecycle {
                    state: FetchState::Idle,
                    starting: false,
                    deferred: None,
                    callbacks: Some(Callbacks {
                        on_success: Box::new(on_success),
                        on_failure: Box::new(on_failure),
                    }),
                    parser: None,
                    in_flight: None,
                    head: None,
                    data: None,
                    error: None,
                }),
            }),
        }
    }

    /// Create an adapter issuing a GET to `url`.
    ///
    /// # Errors
    /// [`Error::InvalidUrl`] if `url` does not parse, [`Error::UnsupportedScheme`]
    /// if it is not http(s); no adapter is built in either case.
    pub fn from_url<S, F>(
        url: &str,
        transport: Arc<dyn HttpTransport>,
        on_success: S,
        on_failure: F,
    ) -> Result<Self>
    where
        S: FnOnce(Arc<Value>) + Send + 'static,
        F: FnOnce(Arc<FetchError>) + Send + 'static,
    {
        let request = Request::parse(Method::Get, url)?;
        Ok(Self::new(request, transport, on_success, on_failure))
    }

    /// Bind a parser to this adapter only. It takes precedence over the
    /// registry default for any parse that has not begun yet.
    pub fn set_parser(&self, parser: Arc<dyn JsonParser>) {
        self.shared.lock().parser = Some(parser);
    }

    pub fn with_parser(self, parser: Arc<dyn JsonParser>) -> Self {
        self.set_parser(parser);
        self
    }

    /// Issue the request.
    ///
    /// # Errors
    /// [`Error::AlreadyStarted`] on any call after the first; no second
    /// request is sent.
    pub fn start(&self) -> Result<()> {
        {
            let mut lifecycle = self.shared.lock();
            if lifecycle.state != FetchState::Idle {
                return Err(Error::AlreadyStarted);
            }
            lifecycle.state = FetchState::InFlight;
            lifecycle.starting = true;
        }

        log::debug!(
            "starting {} {}",
            self.request.method(),
            self.request.url()
        );
        let guard = CompletionGuard {
            shared: Some(Arc::downgrade(&self.shared)),
        };
        let in_flight = self
            .transport
            .start(&self.request, Box::new(move |outcome| guard.deliver(outcome)));

        let (in_flight, deferred) = {
            let mut lifecycle = self.shared.lock();
            lifecycle.starting = false;
            let deferred = lifecycle.deferred.take();
            match lifecycle.state {
                FetchState::InFlight if deferred.is_none() => {
                    lifecycle.in_flight = Some(in_flight);
                    (None, None)
                }
                FetchState::InFlight => (None, deferred),
                // cancelled before the transport handed back its handle
                _ => (Some(in_flight), None),
            }
        };

        if let Some(in_flight) = in_flight {
            in_flight.cancel();
        }
        if let Some(outcome) = deferred {
            deliver_later(Arc::downgrade(&self.shared), outcome);
        }
        Ok(())
    }

    /// Cancel the in-flight request. Returns `true` if this call cancelled
    /// it, in which case neither callback will ever run. A no-op on an idle
    /// or finished adapter.
    pub fn cancel(&self) -> bool {
        let (in_flight, callbacks) = {
            let mut lifecycle = self.shared.lock();
            if lifecycle.state != FetchState::InFlight {
                return false;
            }
            lifecycle.state = FetchState::Cancelled;
            (lifecycle.in_flight.take(), lifecycle.callbacks.take())
        };
        drop(callbacks);

        log::debug!("cancelled {} {}", self.request.method(), self.request.url());
        if let Some(in_flight) = in_flight {
            in_flight.cancel();
        }
        true
    }

    pub fn state(&self) -> FetchState {
        self.shared.lock().state
    }

    /// Parsed document, set once the fetch succeeded.
    pub fn data(&self) -> Option<Arc<Value>> {
        self.shared.lock().data.clone()
    }

    /// Failure cause, set once the fetch failed.
    pub fn error(&self) -> Option<Arc<FetchError>> {
        self.shared.lock().error.clone()
    }

    /// Status and headers of the response, once the transport delivered one.
    pub fn response(&self) -> Option<ResponseHead> {
        self.shared.lock().head.clone()
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    /// Parser bound to this adapter, if any. Does not consult the registry.
    pub fn parser(&self) -> Option<Arc<dyn JsonParser>> {
        self.shared.lock().parser.clone()
    }

    pub fn registry(&self) -> &Arc<ParserRegistry> {
        &self.shared.registry
    }
}

impl Drop for FetchAdapter {
    fn drop(&mut self) {
        if self.cancel() {
            log::debug!("fetch adapter released while in flight");
        }
    }
}

impl fmt::Debug for FetchAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchAdapter")
            .field("request", &self.request)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
