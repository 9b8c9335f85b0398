//! Request/response model and the network seam.
//!
//! The worker never talks to the network directly; everything goes through
//! the [`Fetch`] trait so the install/fetch/sync paths can be exercised in
//! tests with a fake. [`HttpFetcher`] is the production implementation,
//! backed by a shared `reqwest` client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// HTTP request timeout in seconds.
/// 30s allows for slow responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Request method. Only GET traffic is ever cached; everything else passes
/// through the worker untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Other(s) => s.as_str(),
        }
    }
}

/// What kind of resource a request is for. Navigation requests get the
/// cached shell page as their offline fallback; everything else gets a
/// plain-text placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// A top-level navigation (HTML document)
    Document,
    Style,
    Script,
    Image,
    Font,
    Other,
}

/// A request as seen by the worker's fetch interception.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub destination: Destination,
    /// JSON body for POST submissions (signup replay); None for GETs
    pub body: Option<serde_json::Value>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            destination: Destination::Other,
            body: None,
        }
    }

    pub fn navigation(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            destination: Destination::Document,
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            destination: Destination::Other,
            body: Some(body),
        }
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Request identity used as the cache key
    pub fn identity(&self) -> String {
        format!("{} {}", self.method.as_str(), self.url)
    }
}

/// A response, either live from the network or reconstructed from a cached
/// snapshot. Bodies are owned bytes, so cloning one before caching is the
/// "clone before the body is consumed" step of the strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Synthesize a plain-text response, used for offline placeholders
    pub fn plain_text(status: u16, message: &str) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            body: message.as_bytes().to_vec(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body as UTF-8 text (lossy), for tests and placeholder assertions
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("network unreachable: {0}")]
    Unreachable(String),

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}

/// Network seam for the worker. Implementations perform one round-trip and
/// report transport failures as `Err`; HTTP error statuses are `Ok`
/// responses like any other.
pub trait Fetch: Send + Sync {
    fn fetch(
        &self,
        request: &Request,
    ) -> impl std::future::Future<Output = Result<Response, FetchError>> + Send;
}

/// Production fetcher.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let url: reqwest::Url = request
            .url
            .parse()
            .map_err(|_| FetchError::InvalidUrl(request.url.clone()))?;

        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Other(ref m) => {
                let method = reqwest::Method::from_bytes(m.as_bytes())
                    .map_err(|_| FetchError::InvalidUrl(format!("bad method {m}")))?;
                self.client.request(method, url)
            }
        };
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!(url = %request.url, status, "network fetch complete");
        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
