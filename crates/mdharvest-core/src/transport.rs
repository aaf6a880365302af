//! Blocking HTTP transport over a shared async client.
//!
//! Uses async reqwest internally behind a shared tokio runtime, but
//! presents a sync interface: the harvest loop is single-threaded and
//! pull-based, suspending only at the page-fetch boundary.
//!
//! The [`Transport`] trait is the seam that lets fetcher state machines
//! be tested against canned page responses without network or sleeps.

use std::sync::LazyLock;
use std::time::Duration;

use crate::error::FetchError;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Additional attempts after the first failed one. Transient decode
/// failures on a page request are replayed verbatim this many times
/// before the error is propagated as fatal.
pub const MAX_DECODE_RETRIES: u32 = 5;

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(4)
        .build()
        .expect("failed to build HTTP client")
});

/// Get shared HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// One blocking page request: send GET with headers, return the body.
pub trait Transport {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<String, FetchError>;
}

/// Production transport over the shared reqwest client.
pub struct HttpTransport;

impl Transport for HttpTransport {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<String, FetchError> {
        SHARED_RUNTIME.handle().block_on(async {
            let mut req = SHARED_CLIENT.get(url);
            for (name, value) in headers {
                req = req.header(name, value);
            }
            let resp = req
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| FetchError::from_reqwest(&e))?;
            resp.text().await.map_err(|e| FetchError::from_reqwest(&e))
        })
    }
}

/// GET with bounded retry on transient failures.
///
/// The identical request is replayed up to [`MAX_DECODE_RETRIES`] more
/// times (no backoff delay) before the last error propagates. Anything
/// non-retryable propagates immediately.
pub fn get_with_retry(
    transport: &dyn Transport,
    url: &str,
    headers: &[(String, String)],
) -> Result<String, FetchError> {
    let mut attempt = 0u32;
    loop {
        match transport.get(url, headers) {
            Ok(body) => return Ok(body),
            Err(e) if attempt < MAX_DECODE_RETRIES && e.is_retryable() => {
                attempt += 1;
                log::warn!("page request failed ({e}), retry {attempt}/{MAX_DECODE_RETRIES}");
            }
            Err(e) => return Err(e),
        }
    }
}
