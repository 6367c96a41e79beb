use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use serde_json::Value;

use crate::adapter::{FetchAdapter, FetchState};
use crate::error::{FetchError, TransportError};
use crate::parser::ParserRegistry;
use crate::request::Request;
use crate::transport::HttpTransport;

type Outcome = Result<Arc<Value>, Arc<FetchError>>;

/// Future resolving to the outcome of a [`FetchAdapter`].
///
/// The request is issued on first poll. Dropping the future before it
/// resolves is the only way to cancel it, so the future never resolves to a
/// cancellation.
#[must_use = "futures do nothing unless polled"]
pub struct JsonFetch {
    adapter: FetchAdapter,
    receiver: oneshot::Receiver<Outcome>,
    started: bool,
}

impl JsonFetch {
    pub fn state(&self) -> FetchState {
        self.adapter.state()
    }

    pub fn request(&self) -> &Request {
        self.adapter.request()
    }
}

impl Future for JsonFetch {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if !self.started {
            self.started = true;
            if let Err(err) = self.adapter.start() {
                log::warn!("json fetch could not start: {}", err);
            }
        }

        Pin::new(&mut self.receiver).poll(cx).map(|received| {
            // the adapter is private to this future and never cancelled while
            // it is polled, so a dropped sender means the callbacks were lost
            received.unwrap_or_else(|_| {
                Err(Arc::new(FetchError::Transport(TransportError::Unavailable(
                    "fetch finished without reporting an outcome".to_string(),
                ))))
            })
        })
    }
}

/// Fetch and parse a JSON document, as a future.
///
/// Both callbacks of the underlying adapter feed the same oneshot channel,
/// so the future resolves exactly once.
pub fn fetch_json(
    request: Request,
    transport: Arc<dyn HttpTransport>,
    registry: Arc<ParserRegistry>,
) -> JsonFetch {
    let (sender, receiver) = oneshot::channel::<Outcome>();
    let sender = Arc::new(std::sync::Mutex::new(Some(sender)));
    let failure_sender = sender.clone();

    let adapter = FetchAdapter::with_registry(
        request,
        transport,
        registry,
        move |value| send_once(&sender, Ok(value)),
        move |error| send_once(&failure_sender, Err(error)),
    );

    JsonFetch {
        adapter,
        receiver,
        started: false,
    }
}

fn send_once(slot: &std::sync::Mutex<Option<oneshot::Sender<Outcome>>>, outcome: Outcome) {
    let sender = slot
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .take();
    if let Some(sender) = sender {
        // receiver gone means the future was dropped
        let _ = sender.send(outcome);
    }
}
