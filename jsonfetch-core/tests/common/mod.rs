#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use jsonfetch_core::{
    Completion, FetchError, HttpTransport, InFlight, ParseError, Request, Response,
    TransportError, Value,
};

pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum Event {
    Success(Arc<Value>),
    Failure(Arc<FetchError>),
}

/// Callback pair reporting into a channel, so tests can count invocations.
pub fn callbacks() -> (
    impl FnOnce(Arc<Value>) + Send + 'static,
    impl FnOnce(Arc<FetchError>) + Send + 'static,
    mpsc::Receiver<Event>,
) {
    let _ = env_logger::builder().is_test(true).try_init();

    let (tx, rx) = mpsc::channel();
    let failure_tx = tx.clone();
    (
        move |value| {
            let _ = tx.send(Event::Success(value));
        },
        move |error| {
            let _ = failure_tx.send(Event::Failure(error));
        },
        rx,
    )
}

/// Transport replaying one canned outcome from a background thread.
///
/// Non-2xx responses are turned into `TransportError::Status`, like the real
/// transports do. Cancellation is recorded but does not stop delivery, which
/// exercises the adapter's own suppression of late completions.
pub struct ScriptedTransport {
    outcome: Mutex<Option<Result<Response, TransportError>>>,
    release: Mutex<Option<mpsc::Receiver<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pub started: AtomicUsize,
    pub cancelled: Arc<AtomicBool>,
    pub last_request: Mutex<Option<Request>>,
}

impl ScriptedTransport {
    fn with_outcome(outcome: Result<Response, TransportError>) -> Self {
        ScriptedTransport {
            outcome: Mutex::new(Some(outcome)),
            release: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
            cancelled: Arc::new(AtomicBool::new(false)),
            last_request: Mutex::new(None),
        }
    }

    pub fn responding(status: u16, body: &[u8]) -> Arc<Self> {
        Arc::new(Self::with_outcome(Self::apply_status_policy(status, body)))
    }

    pub fn failing(error: TransportError) -> Arc<Self> {
        Arc::new(Self::with_outcome(Err(error)))
    }

    /// Like `responding`, but the completion waits until the returned sender
    /// fires (or is dropped).
    pub fn gated(status: u16, body: &[u8]) -> (Arc<Self>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let transport = Self::with_outcome(Self::apply_status_policy(status, body));
        *transport.release.lock().unwrap() = Some(rx);
        (Arc::new(transport), tx)
    }

    fn apply_status_policy(status: u16, body: &[u8]) -> Result<Response, TransportError> {
        if (200..300).contains(&status) {
            Ok(Response::new(
                status,
                vec![("Content-Type".to_string(), "application/json".to_string())],
                body.to_vec(),
            ))
        } else {
            Err(TransportError::Status {
                status,
                body: body.to_vec(),
            })
        }
    }

    /// Wait for every completion this transport has scheduled.
    pub fn join(&self) {
        let workers: Vec<_> = self.workers.lock().unwrap().drain(..).collect();
        for worker in workers {
            worker.join().unwrap();
        }
    }
}

struct ScriptedHandle(Arc<AtomicBool>);

impl InFlight for ScriptedHandle {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl HttpTransport for ScriptedTransport {
    fn start(&self, request: &Request, on_complete: Completion) -> Box<dyn InFlight> {
        self.started.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());

        let outcome = self
            .outcome
            .lock()
            .unwrap()
            .take()
            .expect("scripted transport started twice");
        let release = self.release.lock().unwrap().take();

        let worker = thread::spawn(move || {
            if let Some(release) = release {
                let _ = release.recv();
            }
            on_complete(outcome);
        });
        self.workers.lock().unwrap().push(worker);

        Box::new(ScriptedHandle(self.cancelled.clone()))
    }
}

/// Parser returning a fixed value and counting how often it ran.
pub struct FixedParser {
    pub value: Value,
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<Vec<u8>>>,
}

impl FixedParser {
    pub fn new(value: Value) -> Arc<Self> {
        Arc::new(FixedParser {
            value,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }
}

impl jsonfetch_core::JsonParser for FixedParser {
    fn parse(&self, raw: &[u8]) -> Result<Value, ParseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(raw.to_vec());
        Ok(self.value.clone())
    }
}
