use std::time::Duration;

use jsonfetch_core::{
    Completion, HttpTransport, InFlight, Method, Request, Response, TransportError,
};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::error::{Error, Result};

use super::DEFAULT_TIMEOUT_SECS;

/// Async HTTP transport using reqwest.
///
/// Each request is spawned as a task on a tokio runtime; `start` returns as
/// soon as the task is queued and cancelling aborts it.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use jsonfetch_native::{fetch_json, ParserRegistry, ReqwestTransport, Request};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let transport = Arc::new(ReqwestTransport::new()?);
///     let request = Request::get("https://api.example.com/items".parse()?);
///     let items = fetch_json(request, transport, ParserRegistry::global()).await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    runtime: Handle,
}

impl ReqwestTransport {
    /// Create a transport on the current tokio runtime with a 30 second timeout.
    ///
    /// # Errors
    /// [`Error::Runtime`] when called outside a tokio runtime.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Create a transport on the current tokio runtime with a custom timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| Error::Runtime(e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::ClientBuild(e.to_string()))?;
        Ok(Self { client, runtime })
    }

    /// Create a transport from a configured client and an explicit runtime.
    pub fn with_client(client: reqwest::Client, runtime: Handle) -> Self {
        Self { client, runtime }
    }

    /// Perform `request` and collect the whole response.
    ///
    /// Non-2xx statuses are returned as [`Error::Status`] with the body.
    pub async fn execute(&self, request: &Request) -> Result<Response> {
        let http_error = |e: reqwest::Error| Error::Http {
            method: request.method().to_string(),
            url: request.url().to_string(),
            reason: e.to_string(),
        };

        let mut builder = self
            .client
            .request(reqwest_method(request.method()), request.url().clone());
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body_bytes() {
            builder = builder.body(body.to_vec());
        }

        let response = builder.send().await.map_err(http_error)?;

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
            .bytes()
            .await
            .map_err(|e| Error::ResponseBody(e.to_string()))?
            .to_vec();

        if !(200..300).contains(&status) {
            return Err(Error::Status { status, body });
        }
        Ok(Response::new(status, headers, body))
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

struct ReqwestCall {
    task: AbortHandle,
}

impl InFlight for ReqwestCall {
    fn cancel(&self) {
        self.task.abort();
    }
}

impl HttpTransport for ReqwestTransport {
    fn start(&self, request: &Request, on_complete: Completion) -> Box<dyn InFlight> {
        let transport = self.clone();
        let request = request.clone();

        let task = self.runtime.spawn(async move {
            let outcome = transport
                .execute(&request)
                .await
                .map_err(TransportError::from);
            on_complete(outcome);
        });

        Box::new(ReqwestCall {
            task: task.abort_handle(),
        })
    }
}
