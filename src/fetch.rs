use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures_util::StreamExt;
use reqwest::{header, redirect, Client, StatusCode};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const WIKI_PREFIX: &str = "https://en.wikipedia.org/wiki/";

/// Global in-flight fetch gate (§4.2, §5): capacity chosen empirically to
/// saturate upstream without inducing excessive context-switching overhead.
const GLOBAL_FETCH_PERMITS: usize = 750;

const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub user_agent: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_body_bytes: usize,
    /// Overrides `WIKI_PREFIX`. Exists so tests can point the fetcher at a
    /// local mock server instead of the real Wikipedia.
    pub base_url: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            user_agent: format!("wikiracer/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(10),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            base_url: WIKI_PREFIX.to_string(),
        }
    }
}

/// Retrieves raw HTML for a title, honoring a process-wide concurrency gate.
pub struct Fetcher {
    client: Client,
    permits: Arc<Semaphore>,
    opts: FetchOptions,
}

impl Fetcher {
    pub fn new(opts: FetchOptions) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(opts.user_agent.clone())
            .timeout(opts.timeout)
            .connect_timeout(opts.connect_timeout)
            .redirect(redirect::Policy::limited(10))
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;
        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(GLOBAL_FETCH_PERMITS)),
            opts,
        })
    }

    fn url_for(&self, title: &str) -> String {
        format!("{}{title}", self.opts.base_url)
    }

    /// Fetch the HTML body for `title`. Returns `None` on non-200 status,
    /// network error, or cancellation (§4.2).
    pub async fn fetch(&self, title: &str, cancel: &CancellationToken) -> Option<String> {
        if cancel.is_cancelled() {
            return None;
        }

        let _permit = tokio::select! {
            permit = self.permits.acquire() => permit.ok()?,
            _ = cancel.cancelled() => return None,
        };

        if cancel.is_cancelled() {
            return None;
        }

        let url = self.url_for(title);
        let resp = match self
            .client
            .get(&url)
            .header(header::ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.1")
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err) => {
                if is_remote_disconnect(&err) {
                    warn!(%url, %err, "upstream refused connection; cancelling search");
                    cancel.cancel();
                } else {
                    debug!(%url, %err, "fetch failed; treating as no links");
                }
                return None;
            }
        };

        if resp.status() != StatusCode::OK {
            debug!(%url, status = %resp.status(), "non-200 response; treating as no links");
            return None;
        }

        read_body_capped(resp, self.opts.max_body_bytes).await
    }

    /// Single-shot existence check used only to validate S/D before a search starts.
    pub async fn exists(&self, title: &str) -> bool {
        let url = self.url_for(title);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(err) => {
                debug!(%url, %err, "existence check failed");
                false
            }
        }
    }
}

async fn read_body_capped(resp: reqwest::Response, max_bytes: usize) -> Option<String> {
    let mut stream = resp.bytes_stream();
    let mut buf = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(err) => {
                debug!(%err, "error while streaming response body");
                return None;
            }
        };
        if buf.len() + chunk.len() > max_bytes {
            warn!(max_bytes, "response body exceeded cap; truncating fetch");
            return None;
        }
        buf.extend_from_slice(&chunk);
    }

    String::from_utf8(buf.to_vec()).ok()
}

/// Heuristic for "the server is refusing connections" (§4.2), as opposed to
/// an ordinary non-200/transient failure: a connect-phase error, or the
/// connection being reset/closed once the request was already in flight.
fn is_remote_disconnect(err: &reqwest::Error) -> bool {
    if err.is_connect() {
        return true;
    }
    let mut source = StdError::source(err);
    while let Some(s) = source {
        let msg = s.to_string().to_ascii_lowercase();
        if msg.contains("connection reset")
            || msg.contains("connection closed")
            || msg.contains("connection refused")
        {
            return true;
        }
        source = s.source();
    }
    false
}
