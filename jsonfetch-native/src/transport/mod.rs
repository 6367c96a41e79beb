#[cfg(feature = "reqwest-client")]
mod reqwest_impl;
#[cfg(feature = "ureq-client")]
mod ureq_impl;

#[cfg(feature = "reqwest-client")]
pub use reqwest_impl::ReqwestTransport;
#[cfg(feature = "ureq-client")]
pub use ureq_impl::UreqTransport;

#[cfg(any(feature = "ureq-client", feature = "reqwest-client"))]
const DEFAULT_TIMEOUT_SECS: u64 = 30;
#[cfg(feature = "ureq-client")]
const DEFAULT_BODY_LIMIT: u64 = 64 * 1024 * 1024;
#[cfg(all(feature = "ureq-client", not(feature = "rayon")))]
const DEFAULT_WORKERS: usize = 4;
