use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use jsonfetch_core::{
    Completion, HttpTransport, InFlight, Method, Request, Response, TransportError,
};

use crate::error::{Error, Result};
#[cfg(not(feature = "rayon"))]
use crate::thread_pool::ThreadPool;

use super::{DEFAULT_BODY_LIMIT, DEFAULT_TIMEOUT_SECS};
#[cfg(not(feature = "rayon"))]
use super::DEFAULT_WORKERS;

/// Blocking HTTP transport using ureq.
///
/// ureq only offers blocking calls, so every request runs on a worker thread
/// and `start` returns immediately. Workers come from a small pool owned by
/// the transport, or from the rayon global pool with the `rayon` feature.
///
/// Response bodies are read up to 64 MiB by default (see
/// [`UreqTransport::with_body_limit`]); a longer body fails the exchange with
/// [`Error::ResponseBody`].
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use jsonfetch_native::{FetchAdapter, UreqTransport};
///
/// let transport = Arc::new(UreqTransport::new());
/// let fetch = FetchAdapter::from_url("https://api.example.com/items", transport, on_ok, on_err)?;
/// fetch.start()?;
/// ```
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    body_limit: u64,
    #[cfg(not(feature = "rayon"))]
    pool: Arc<ThreadPool>,
}

impl UreqTransport {
    /// Create a transport with a 30 second timeout and the default worker count.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Create a transport with a custom global request timeout.
    pub fn with_timeout(timeout_secs: u64) -> Self {
        Self::with_agent(
            ureq::Agent::config_builder()
                .timeout_global(Some(Duration::from_secs(timeout_secs)))
                // status handling happens in `execute` so the body is kept
                .http_status_as_error(false)
                .build()
                .into(),
        )
    }

    /// Create a transport around a preconfigured agent.
    pub fn with_agent(agent: ureq::Agent) -> Self {
        Self {
            agent,
            body_limit: DEFAULT_BODY_LIMIT,
            #[cfg(not(feature = "rayon"))]
            pool: Arc::new(ThreadPool::new(DEFAULT_WORKERS)),
        }
    }

    /// Replace the worker pool with one of `workers` threads.
    #[cfg(not(feature = "rayon"))]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.pool = Arc::new(ThreadPool::new(workers));
        self
    }

    /// Maximum number of response body bytes read per exchange.
    pub fn with_body_limit(mut self, bytes: u64) -> Self {
        self.body_limit = bytes;
        self
    }

    /// Perform `request` on the calling thread.
    ///
    /// Non-2xx statuses are returned as [`Error::Status`] with the body.
    pub fn execute(&self, request: &Request) -> Result<Response> {
        let url = request.url().as_str();
        let headers = request.headers();
        let body = request.body_bytes().unwrap_or_default();

        let sent = match request.method() {
            Method::Get => with_headers(self.agent.get(url), headers).call(),
            Method::Head => with_headers(self.agent.head(url), headers).call(),
            Method::Delete => with_headers(self.agent.delete(url), headers).call(),
            Method::Options => with_headers(self.agent.options(url), headers).call(),
            Method::Post => with_headers(self.agent.post(url), headers).send(body),
            Method::Put => with_headers(self.agent.put(url), headers).send(body),
            Method::Patch => with_headers(self.agent.patch(url), headers).send(body),
        };

        let mut response = sent.map_err(|e| match e {
            // agents passed to `with_agent` may still treat statuses as errors
            ureq::Error::StatusCode(status) => Error::Status {
                status,
                body: Vec::new(),
            },
            e => Error::Http {
                method: request.method().to_string(),
                url: url.to_string(),
                reason: e.to_string(),
            },
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .body_mut()
            .with_config()
            .limit(self.body_limit)
            .read_to_vec()
            .map_err(|e| Error::ResponseBody(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(Error::Status { status, body });
        }
        Ok(Response::new(status, headers, body))
    }

    fn spawn<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // rayon aborts the process on a panicking job without a panic handler
        #[cfg(feature = "rayon")]
        rayon::spawn(move || {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)).is_err() {
                log::warn!("fetch task panicked on the rayon pool");
            }
        });

        #[cfg(not(feature = "rayon"))]
        self.pool.execute(task);
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

struct UreqCall {
    cancelled: Arc<AtomicBool>,
}

impl InFlight for UreqCall {
    fn cancel(&self) {
        // a blocking call cannot be interrupted; its result is dropped instead
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl HttpTransport for UreqTransport {
    fn start(&self, request: &Request, on_complete: Completion) -> Box<dyn InFlight> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let transport = self.clone();
        let request = request.clone();
        let flag = cancelled.clone();

        self.spawn(move || {
            if flag.load(Ordering::SeqCst) {
                log::debug!("skipping cancelled request to {}", request.url());
                return;
            }
            let outcome = transport.execute(&request).map_err(TransportError::from);
            if flag.load(Ordering::SeqCst) {
                log::debug!("dropping response to cancelled request {}", request.url());
                return;
            }
            on_complete(outcome);
        });

        Box::new(UreqCall { cancelled })
    }
}
